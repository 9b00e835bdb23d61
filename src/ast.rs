//! Abstract syntax tree produced by [`crate::parser::Parser`] and annotated
//! in place by [`crate::analyzer`] and [`crate::bytecode::compiler`].
//!
//! Node shapes follow spec.md §3's AST model directly: every node carries a
//! [`Position`] and a [`Flags`] bitset, and the analyzer/codegen-assigned
//! fields are modeled as `Option<T>` rather than a sentinel integer (per the
//! REDESIGN FLAGS note in spec.md §9: "model these as optional fields to
//! make the phase-ordering invariants type-enforced"). A field that is
//! still `None` when a later phase reads it is a bug in that phase, and
//! every read site uses `.expect(...)` with a message naming the invariant,
//! so such bugs panic close to their source instead of silently coercing to
//! zero.

use crate::lexer::Position;

bitflags::bitflags! {
    /// Per-node attribute bits set by the analyzer and consumed by codegen.
    ///
    /// Kept as a packed bit set rather than individual `bool` fields:
    /// spec.md §9 calls decoding this word out as a hot-loop contributor in
    /// codegen, and `bitflags` gives us named, composable bits without
    /// paying for a struct-of-bools layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        const ERROR     = 1 << 0;
        const LVALUE    = 1 << 1;
        const STORE     = 1 << 2;
        const LOAD      = 1 << 3;
        const NOLOAD    = 1 << 4;
        const TABLE     = 1 << 5;
        const GLOBAL    = 1 << 6;
        const UPVALUE   = 1 << 7;
        const INTVALUE  = 1 << 8;
        const ARRAY     = 1 << 9;
        const TEMP      = 1 << 10;
        const TEMPTABLE = 1 << 11;
    }
}

/// Classification of a resolved identifier, attached to `TerminalExpr` once
/// the analyzer has looked it up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKind {
    Local { register_offset: u32 },
    Upvalue { function_level: u32, offset: u32 },
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnKind {
    Return,
    Yield,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    PrefixInc,
    PrefixDec,
    PostfixInc,
    PostfixDec,
    BitNot,
    LogicNot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignMod,
    AssignShl,
    AssignShr,
    AssignAnd,
    AssignOr,
    AssignXor,
    Eq,
    NotEq,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Index,
    LogicAnd,
    LogicOr,
}

impl BinaryOp {
    #[must_use]
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            Self::Assign
                | Self::AssignAdd
                | Self::AssignSub
                | Self::AssignMul
                | Self::AssignDiv
                | Self::AssignMod
                | Self::AssignShl
                | Self::AssignShr
                | Self::AssignAnd
                | Self::AssignOr
                | Self::AssignXor
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalKind {
    Null,
    Int(i64),
    Hex(i64),
    Float(OrderedFloat),
    Str(String),
    Identifier(String),
}

/// A thin `f64` wrapper that derives `PartialEq`/Eq well enough for AST
/// comparisons in tests; NaN is never produced by the lexer's grammar so
/// bitwise equality is sufficient here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedFloat(pub f64);
impl Eq for OrderedFloat {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableShape {
    Table,
    Array,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct TableInitializer {
    pub key: Option<Expr>,
    pub value: Expr,
    pub flags: Flags,
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub arguments: Vec<VariableStmt>,
    pub body: Box<Stmt>,
    pub position: Position,

    /// Free variables captured from an enclosing function, resolved by the
    /// analyzer as `TerminalExpr(Identifier)` nodes it found outside this
    /// function's own scope stack.
    pub upvalues: Vec<UpvalueRef>,

    /// Set by the analyzer when the function's scope closes.
    pub num_variable: Option<u32>,
    pub function_level: Option<u32>,
    /// Index of this definition among all nested prototypes of its parent,
    /// assigned by the parser in source order; used by `NEWFUNC`'s operand.
    pub function_num: Option<u32>,
}

/// One captured free variable, recorded the first time the analyzer
/// resolves an identifier to an outer function's local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpvalueRef {
    pub name: String,
    pub function_level: u32,
    pub register_offset: u32,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Trinary(TrinaryExpr),
    Terminal(TerminalExpr),
    Call(CallExpr),
    Function(FunctionExpr),
    TableLit(TableExpr),
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
    pub position: Position,
    pub flags: Flags,
    pub register_offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    /// For assignment-shaped operators this is the *value* operand; see
    /// spec.md §4.2's note that assignment parses with the destination as
    /// the second child.
    pub first: Box<Expr>,
    pub second: Box<Expr>,
    pub position: Position,
    pub flags: Flags,
    pub register_offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TrinaryExpr {
    pub condition: Box<Expr>,
    pub second: Box<Expr>,
    pub third: Box<Expr>,
    pub position: Position,
    pub flags: Flags,
    pub register_offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TerminalExpr {
    pub kind: TerminalKind,
    pub position: Position,
    pub flags: Flags,
    pub register_offset: Option<u32>,
    /// Set only for `Identifier` terminals once the analyzer resolves the
    /// name.
    pub var_kind: Option<VarKind>,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub arguments: Vec<Expr>,
    pub position: Position,
    pub flags: Flags,
    pub register_offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FunctionExpr {
    pub def: Box<FunctionDefinition>,
    pub position: Position,
    pub flags: Flags,
    pub register_offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TableExpr {
    pub shape: TableShape,
    pub initializers: Vec<TableInitializer>,
    pub position: Position,
    pub flags: Flags,
    pub register_offset: Option<u32>,
}

impl Expr {
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Self::Unary(e) => e.position,
            Self::Binary(e) => e.position,
            Self::Trinary(e) => e.position,
            Self::Terminal(e) => e.position,
            Self::Call(e) => e.position,
            Self::Function(e) => e.position,
            Self::TableLit(e) => e.position,
        }
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        match self {
            Self::Unary(e) => e.flags,
            Self::Binary(e) => e.flags,
            Self::Trinary(e) => e.flags,
            Self::Terminal(e) => e.flags,
            Self::Call(e) => e.flags,
            Self::Function(e) => e.flags,
            Self::TableLit(e) => e.flags,
        }
    }

    pub fn flags_mut(&mut self) -> &mut Flags {
        match self {
            Self::Unary(e) => &mut e.flags,
            Self::Binary(e) => &mut e.flags,
            Self::Trinary(e) => &mut e.flags,
            Self::Terminal(e) => &mut e.flags,
            Self::Call(e) => &mut e.flags,
            Self::Function(e) => &mut e.flags,
            Self::TableLit(e) => &mut e.flags,
        }
    }

    #[must_use]
    pub fn register_offset(&self) -> Option<u32> {
        match self {
            Self::Unary(e) => e.register_offset,
            Self::Binary(e) => e.register_offset,
            Self::Trinary(e) => e.register_offset,
            Self::Terminal(e) => e.register_offset,
            Self::Call(e) => e.register_offset,
            Self::Function(e) => e.register_offset,
            Self::TableLit(e) => e.register_offset,
        }
    }

    pub fn set_register_offset(&mut self, r: u32) {
        let slot = match self {
            Self::Unary(e) => &mut e.register_offset,
            Self::Binary(e) => &mut e.register_offset,
            Self::Trinary(e) => &mut e.register_offset,
            Self::Terminal(e) => &mut e.register_offset,
            Self::Call(e) => &mut e.register_offset,
            Self::Function(e) => &mut e.register_offset,
            Self::TableLit(e) => &mut e.register_offset,
        };
        *slot = Some(r);
    }
}

#[derive(Debug, Clone)]
pub struct VariableStmt {
    pub name: String,
    pub init: Option<Expr>,
    pub position: Position,

    pub scope_level: Option<u32>,
    pub function_level: Option<u32>,
    pub register_offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CompoundStmt {
    pub body: Vec<Stmt>,
    pub position: Position,

    pub scope_level: Option<u32>,
    pub num_variable: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ForStmt {
    pub init: Option<Box<Stmt>>,
    pub condition: Option<Expr>,
    pub step: Option<Expr>,
    pub body: Box<Stmt>,
    pub position: Position,

    /// Identity used by `JumpStmt.corresponding_loop` to refer back to
    /// this loop; assigned by the analyzer when the loop scope opens.
    pub loop_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Box<Stmt>,
    pub position: Position,

    pub loop_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DoWhileStmt {
    pub body: Box<Stmt>,
    pub condition: Expr,
    pub position: Position,

    pub loop_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct IfElseStmt {
    pub condition: Expr,
    pub then_branch: Box<Stmt>,
    pub else_branch: Option<Box<Stmt>>,
    pub position: Position,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub kind: ReturnKind,
    pub value: Option<Expr>,
    pub position: Position,
}

#[derive(Debug, Clone)]
pub struct JumpStmt {
    pub kind: JumpKind,
    pub position: Position,
    /// Index, within the current function, of the `LoopStmt` this jump
    /// targets; set by the analyzer.
    pub corresponding_loop: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Sequence(Vec<Stmt>),
    Compound(CompoundStmt),
    For(ForStmt),
    While(WhileStmt),
    DoWhile(DoWhileStmt),
    IfElse(IfElseStmt),
    Return(ReturnStmt),
    Jump(JumpStmt),
    Variable(VariableStmt),
    Expression(Expr),
}

impl Stmt {
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Self::Sequence(stmts) => stmts.first().map_or_else(Position::default, Stmt::position),
            Self::Compound(s) => s.position,
            Self::For(s) => s.position,
            Self::While(s) => s.position,
            Self::DoWhile(s) => s.position,
            Self::IfElse(s) => s.position,
            Self::Return(s) => s.position,
            Self::Jump(s) => s.position,
            Self::Variable(s) => s.position,
            Self::Expression(e) => e.position(),
        }
    }
}

/// The top-level compiled unit: the whole file, parsed as the body of a
/// synthetic top-level function with no parameters (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct Program {
    pub top_level: FunctionDefinition,
}
