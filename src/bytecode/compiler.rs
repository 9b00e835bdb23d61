//! Lowers an analyzed [`Program`] into a tree of [`Prototype`]s.
//!
//! Grounded in the dispatch shape of
//! `examples/original_source/cmm-lang/CodeGenerator.cpp` (one `case AST::*`
//! arm per node kind, each responsible for allocating its own result
//! register and freeing its temporaries before returning to its caller) and
//! in monty's `bytecode/builder.rs` for the builder-object style of
//! emitting instructions instead of constructing them by hand.

use std::rc::Rc;

use crate::ast::*;
use crate::bytecode::builder::FunctionBuilder;
use crate::bytecode::op::Opcode;
use crate::bytecode::prototype::Prototype;
use crate::heap::Heap;

enum ContinueTarget {
    /// `continue` jumps straight back to an already-emitted instruction
    /// (the condition check of a `while`/`for`).
    BackTo(usize),
    /// `continue` jumps forward to a location not yet emitted (a
    /// `do...while`'s condition, or a `for`'s step expression); patched
    /// once that location is known.
    Forward(Vec<usize>),
}

struct LoopCtx {
    loop_id: u32,
    continue_target: ContinueTarget,
    break_patches: Vec<usize>,
}

/// An l-value that has already been visited once, so it can be read and
/// then written through the same registers instead of recompiling its
/// sub-expressions (needed for `+=`-style compound assignment and
/// `++`/`--`, which both read the current value and store a new one).
enum LValue {
    Local { register_offset: u32 },
    Upvalue { idx: u32 },
    Global { const_idx: u32 },
    Table { obj: u32, key: u32 },
}

struct Compiler<'a> {
    heap: &'a mut Heap,
    builder: FunctionBuilder,
    loops: Vec<LoopCtx>,
    upvalues: Vec<UpvalueRef>,
}

/// Compiles a fully analyzed program into its top-level [`Prototype`].
///
/// # Panics
/// Panics if any analyzer-assigned field the compiler reads is `None` —
/// that indicates a bug in [`crate::analyzer::Analyzer`], not malformed
/// input, since `analyze` is required to run (and succeed) first.
#[must_use]
pub fn compile(program: &Program, heap: &mut Heap) -> Rc<Prototype> {
    compile_function(&program.top_level, heap)
}

fn compile_function(def: &FunctionDefinition, heap: &mut Heap) -> Rc<Prototype> {
    let mut compiler = Compiler {
        heap,
        builder: FunctionBuilder::new(),
        loops: Vec::new(),
        upvalues: def.upvalues.clone(),
    };

    for _ in &def.arguments {
        compiler.builder.registers.alloc();
    }

    compiler.compile_stmt(&def.body);
    // A function whose control flow falls off the end returns no values.
    compiler.builder.emit(Opcode::Return, 0, 0, 0, def.position.end_line);

    let num_variable = def.num_variable.expect("analyzer must set num_variable");
    let num_params = def.arguments.len() as u32;
    let function_level = def.function_level.expect("analyzer must set function_level");

    let Compiler { heap, mut builder, .. } = compiler;
    let code = std::mem::take(&mut builder.code);
    let lines = std::mem::take(&mut builder.lines);
    let nested = std::mem::take(&mut builder.nested);
    let num_registers = num_variable.max(builder.registers.high_watermark());
    let constants = builder.into_constants(heap);

    Rc::new(Prototype {
        code,
        constants,
        num_params,
        num_registers,
        upvalues: def.upvalues.clone(),
        nested,
        lines,
        function_level,
    })
}

impl<'a> Compiler<'a> {
    fn upvalue_index(&self, name: &str) -> u32 {
        self.upvalues
            .iter()
            .position(|u| u.name == name)
            .expect("analyzer must have registered every referenced upvalue") as u32
    }

    fn dest(&mut self, target: Option<u32>) -> u32 {
        target.unwrap_or_else(|| self.builder.registers.alloc())
    }

    fn compile_nested_function(&mut self, def: &FunctionDefinition) -> u32 {
        let proto = compile_function(def, self.heap);
        self.builder.nested.push(proto);
        (self.builder.nested.len() - 1) as u32
    }

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Sequence(stmts) => {
                for s in stmts {
                    self.compile_stmt(s);
                }
            }
            Stmt::Compound(s) => self.compile_compound(s),
            Stmt::For(s) => self.compile_for(s),
            Stmt::While(s) => self.compile_while(s),
            Stmt::DoWhile(s) => self.compile_do_while(s),
            Stmt::IfElse(s) => self.compile_if_else(s),
            Stmt::Return(s) => self.compile_return(s),
            Stmt::Jump(s) => self.compile_jump(s),
            Stmt::Variable(s) => self.compile_variable(s),
            Stmt::Expression(e) => {
                let mark = self.builder.registers.mark();
                self.compile_expr(e, None);
                self.builder.registers.free_to(mark);
            }
        }
    }

    fn compile_compound(&mut self, s: &CompoundStmt) {
        let mark = self.builder.registers.mark();
        for stmt in &s.body {
            self.compile_stmt(stmt);
        }
        self.builder.registers.free_to(mark);
    }

    fn compile_variable(&mut self, s: &VariableStmt) {
        let offset = s.register_offset.expect("analyzer must assign local register offsets");
        let allocated = self.builder.registers.alloc();
        debug_assert_eq!(
            allocated, offset,
            "codegen's register allocator must mirror the analyzer's scope discipline exactly"
        );
        let line = s.position.start_line;
        match &s.init {
            Some(init) => {
                self.compile_expr(init, Some(offset));
            }
            None => {
                let k = self.builder.const_null();
                self.builder.emit(Opcode::GetConst, offset as i32, k as i32, 0, line);
            }
        }
    }

    fn compile_return(&mut self, s: &ReturnStmt) {
        let line = s.position.start_line;
        match &s.value {
            Some(value) => {
                let mark = self.builder.registers.mark();
                let reg = self.builder.registers.alloc();
                self.compile_expr(value, Some(reg));
                self.builder.emit(Opcode::Return, reg as i32, 1, 0, line);
                self.builder.registers.free_to(mark);
            }
            None => {
                self.builder.emit(Opcode::Return, 0, 0, 0, line);
            }
        }
    }

    fn compile_jump(&mut self, s: &JumpStmt) {
        let loop_id = s.corresponding_loop.expect("analyzer must resolve break/continue targets");
        let line = s.position.start_line;
        let index = self.loops.iter().rposition(|l| l.loop_id == loop_id).expect("matching loop must be open");
        match s.kind {
            JumpKind::Break => {
                let patch = self.builder.emit_jump(Opcode::Jump, 0, line);
                self.loops[index].break_patches.push(patch);
            }
            JumpKind::Continue => match &self.loops[index].continue_target {
                ContinueTarget::BackTo(target) => {
                    let target = *target;
                    self.builder.emit_jump_to(Opcode::Jump, 0, target, line);
                }
                ContinueTarget::Forward(_) => {
                    let patch = self.builder.emit_jump(Opcode::Jump, 0, line);
                    if let ContinueTarget::Forward(patches) = &mut self.loops[index].continue_target {
                        patches.push(patch);
                    }
                }
            },
        }
    }

    fn compile_if_else(&mut self, s: &IfElseStmt) {
        let mark = self.builder.registers.mark();
        let creg = self.builder.registers.alloc();
        self.compile_expr(&s.condition, Some(creg));
        let line = s.position.start_line;
        let else_jump = self.builder.emit_jump(Opcode::BranchNot, creg as i32, line);
        self.builder.registers.free_to(mark);

        self.compile_stmt(&s.then_branch);
        if let Some(else_branch) = &s.else_branch {
            let end_jump = self.builder.emit_jump(Opcode::Jump, 0, line);
            self.builder.patch_jump(else_jump);
            self.compile_stmt(else_branch);
            self.builder.patch_jump(end_jump);
        } else {
            self.builder.patch_jump(else_jump);
        }
    }

    fn compile_while(&mut self, s: &WhileStmt) {
        let loop_id = s.loop_id.expect("analyzer must assign loop_id");
        let line = s.position.start_line;
        let loop_start = self.builder.next_index();

        let mark = self.builder.registers.mark();
        let creg = self.builder.registers.alloc();
        self.compile_expr(&s.condition, Some(creg));
        let exit_jump = self.builder.emit_jump(Opcode::BranchNot, creg as i32, line);
        self.builder.registers.free_to(mark);

        self.loops.push(LoopCtx {
            loop_id,
            continue_target: ContinueTarget::BackTo(loop_start),
            break_patches: Vec::new(),
        });
        self.compile_stmt(&s.body);
        self.builder.emit_jump_to(Opcode::Jump, 0, loop_start, line);

        self.builder.patch_jump(exit_jump);
        let ctx = self.loops.pop().expect("pushed above");
        for patch in ctx.break_patches {
            self.builder.patch_jump(patch);
        }
    }

    fn compile_do_while(&mut self, s: &DoWhileStmt) {
        let loop_id = s.loop_id.expect("analyzer must assign loop_id");
        let line = s.position.start_line;
        let body_start = self.builder.next_index();

        self.loops.push(LoopCtx {
            loop_id,
            continue_target: ContinueTarget::Forward(Vec::new()),
            break_patches: Vec::new(),
        });
        self.compile_stmt(&s.body);

        let cond_start = self.builder.next_index();
        {
            let ctx = self.loops.last_mut().expect("pushed above");
            if let ContinueTarget::Forward(patches) = &mut ctx.continue_target {
                let patches = std::mem::take(patches);
                for patch in patches {
                    self.builder.patch_jump_to_index(patch, cond_start);
                }
            }
        }

        let mark = self.builder.registers.mark();
        let creg = self.builder.registers.alloc();
        self.compile_expr(&s.condition, Some(creg));
        self.builder.emit_jump_to(Opcode::Branch, creg as i32, body_start, line);
        self.builder.registers.free_to(mark);

        let ctx = self.loops.pop().expect("pushed above");
        for patch in ctx.break_patches {
            self.builder.patch_jump(patch);
        }
    }

    fn compile_for(&mut self, s: &ForStmt) {
        let loop_id = s.loop_id.expect("analyzer must assign loop_id");
        let line = s.position.start_line;
        let mark = self.builder.registers.mark();

        if let Some(init) = &s.init {
            self.compile_stmt(init);
        }

        let loop_start = self.builder.next_index();
        let exit_jump = s.condition.as_ref().map(|condition| {
            let creg = self.builder.registers.alloc();
            self.compile_expr(condition, Some(creg));
            let jump = self.builder.emit_jump(Opcode::BranchNot, creg as i32, line);
            self.builder.registers.free_to(creg);
            jump
        });

        self.loops.push(LoopCtx {
            loop_id,
            continue_target: ContinueTarget::Forward(Vec::new()),
            break_patches: Vec::new(),
        });
        self.compile_stmt(&s.body);

        let step_start = self.builder.next_index();
        {
            let ctx = self.loops.last_mut().expect("pushed above");
            if let ContinueTarget::Forward(patches) = &mut ctx.continue_target {
                let patches = std::mem::take(patches);
                for patch in patches {
                    self.builder.patch_jump_to_index(patch, step_start);
                }
            }
        }
        if let Some(step) = &s.step {
            let step_mark = self.builder.registers.mark();
            self.compile_expr(step, None);
            self.builder.registers.free_to(step_mark);
        }
        self.builder.emit_jump_to(Opcode::Jump, 0, loop_start, line);

        if let Some(exit_jump) = exit_jump {
            self.builder.patch_jump(exit_jump);
        }
        let ctx = self.loops.pop().expect("pushed above");
        for patch in ctx.break_patches {
            self.builder.patch_jump(patch);
        }
        self.builder.registers.free_to(mark);
    }

    fn compile_expr(&mut self, expr: &Expr, target: Option<u32>) -> u32 {
        match expr {
            Expr::Unary(e) => self.compile_unary(e, target),
            Expr::Binary(e) => self.compile_binary(e, target),
            Expr::Trinary(e) => self.compile_trinary(e, target),
            Expr::Terminal(e) => self.compile_terminal(e, target),
            Expr::Call(e) => self.compile_call(e, target),
            Expr::Function(e) => {
                let dest = self.dest(target);
                let idx = self.compile_nested_function(&e.def);
                self.builder.emit(Opcode::NewFunc, dest as i32, idx as i32, 0, e.position.start_line);
                dest
            }
            Expr::TableLit(e) => self.compile_table(e, target),
        }
    }

    fn compile_unary(&mut self, e: &UnaryExpr, target: Option<u32>) -> u32 {
        let line = e.position.start_line;
        match e.op {
            UnaryOp::Plus => self.compile_expr(&e.operand, target),
            UnaryOp::Minus | UnaryOp::BitNot | UnaryOp::LogicNot => {
                let dest = self.dest(target);
                let mark = self.builder.registers.mark();
                let src = self.compile_expr(&e.operand, None);
                let op = match e.op {
                    UnaryOp::Minus => Opcode::Unm,
                    UnaryOp::BitNot => Opcode::BitNot,
                    _ => Opcode::Not,
                };
                self.builder.emit(op, dest as i32, src as i32, 0, line);
                self.builder.registers.free_to(mark.max(dest + 1));
                dest
            }
            UnaryOp::PrefixInc | UnaryOp::PrefixDec | UnaryOp::PostfixInc | UnaryOp::PostfixDec => {
                self.compile_incdec(e, target)
            }
        }
    }

    fn compile_incdec(&mut self, e: &UnaryExpr, target: Option<u32>) -> u32 {
        let line = e.position.start_line;
        let is_inc = matches!(e.op, UnaryOp::PrefixInc | UnaryOp::PostfixInc);
        let is_prefix = matches!(e.op, UnaryOp::PrefixInc | UnaryOp::PrefixDec);

        let mark = self.builder.registers.mark();
        let lv = self.resolve_lvalue(&e.operand);
        let old = self.load_lvalue(&lv, None, line);
        let one = self.builder.registers.alloc();
        let k = self.builder.const_int(1);
        self.builder.emit(Opcode::GetConst, one as i32, k as i32, 0, line);
        let updated = self.builder.registers.alloc();
        let op = if is_inc { Opcode::Add } else { Opcode::Sub };
        self.builder.emit(op, updated as i32, old as i32, one as i32, line);
        self.store_lvalue(&lv, updated, line);

        let dest = self.dest(target);
        let result_src = if is_prefix { updated } else { old };
        if dest != result_src {
            self.builder.emit(Opcode::Assign, dest as i32, result_src as i32, 0, line);
        }
        self.builder.registers.free_to(mark.max(dest + 1));
        dest
    }

    /// Visits an l-value expression exactly once, resolving it to a
    /// location that can be both read and written without recompiling its
    /// sub-expressions. For a table index this evaluates the container and
    /// key into registers that both `load_lvalue` and `store_lvalue` reuse
    /// — the thing `lvalue1`/`lvalue2` cache in the original CodeGenerator.
    fn resolve_lvalue(&mut self, target_expr: &Expr) -> LValue {
        match target_expr {
            Expr::Terminal(t) => match &t.kind {
                TerminalKind::Identifier(name) => {
                    match t.var_kind.as_ref().expect("analyzer must resolve l-value identifiers") {
                        VarKind::Local { register_offset } => LValue::Local { register_offset: *register_offset },
                        VarKind::Upvalue { .. } => LValue::Upvalue { idx: self.upvalue_index(name) },
                        VarKind::Global => LValue::Global { const_idx: self.builder.const_str(name) },
                    }
                }
                _ => unreachable!("non-identifier terminal cannot be an l-value"),
            },
            Expr::Binary(b) if b.op == BinaryOp::Index => {
                let obj = self.compile_expr(&b.first, None);
                let key = self.compile_expr(&b.second, None);
                LValue::Table { obj, key }
            }
            _ => unreachable!("analyzer rejects non-lvalue assignment targets before codegen runs"),
        }
    }

    /// Reads the current value out of an already-resolved l-value.
    fn load_lvalue(&mut self, lv: &LValue, target: Option<u32>, line: u32) -> u32 {
        match *lv {
            LValue::Local { register_offset } => match target {
                Some(t) if t != register_offset => {
                    self.builder.emit(Opcode::Assign, t as i32, register_offset as i32, 0, line);
                    t
                }
                Some(t) => t,
                None => register_offset,
            },
            LValue::Upvalue { idx } => {
                let dest = self.dest(target);
                self.builder.emit(Opcode::GetUpval, dest as i32, idx as i32, 0, line);
                dest
            }
            LValue::Global { const_idx } => {
                let dest = self.dest(target);
                self.builder.emit(Opcode::GetGlobal, dest as i32, const_idx as i32, 0, line);
                dest
            }
            LValue::Table { obj, key } => {
                let dest = self.dest(target);
                self.builder.emit(Opcode::GetTable, dest as i32, obj as i32, key as i32, line);
                dest
            }
        }
    }

    /// Stores `value_reg` into an already-resolved l-value.
    fn store_lvalue(&mut self, lv: &LValue, value_reg: u32, line: u32) {
        match *lv {
            LValue::Local { register_offset } => {
                if register_offset != value_reg {
                    self.builder.emit(Opcode::Assign, register_offset as i32, value_reg as i32, 0, line);
                }
            }
            LValue::Upvalue { idx } => {
                self.builder.emit(Opcode::SetUpval, idx as i32, value_reg as i32, 0, line);
            }
            LValue::Global { const_idx } => {
                self.builder.emit(Opcode::SetGlobal, const_idx as i32, value_reg as i32, 0, line);
            }
            LValue::Table { obj, key } => {
                self.builder.emit(Opcode::SetTable, obj as i32, key as i32, value_reg as i32, line);
            }
        }
    }

    /// Stores `value_reg` into the l-value denoted by `target_expr`
    /// (already validated as an l-value by the analyzer). Visits
    /// `target_expr` exactly once via [`Self::resolve_lvalue`].
    fn store_to(&mut self, target_expr: &Expr, value_reg: u32, line: u32) {
        let lv = self.resolve_lvalue(target_expr);
        self.store_lvalue(&lv, value_reg, line);
    }

    fn compile_binary(&mut self, e: &BinaryExpr, target: Option<u32>) -> u32 {
        let line = e.position.start_line;
        if e.op.is_assignment() {
            return self.compile_assignment(e, target);
        }

        match e.op {
            BinaryOp::Index => {
                let dest = self.dest(target);
                let mark = self.builder.registers.mark();
                let obj = self.compile_expr(&e.first, None);
                let key = self.compile_expr(&e.second, None);
                self.builder.emit(Opcode::GetTable, dest as i32, obj as i32, key as i32, line);
                self.builder.registers.free_to(mark.max(dest + 1));
                dest
            }
            BinaryOp::LogicAnd | BinaryOp::LogicOr => self.compile_short_circuit(e, target),
            _ => {
                let dest = self.dest(target);
                let mark = self.builder.registers.mark();
                let lhs = self.compile_expr(&e.first, None);
                let rhs = self.compile_expr(&e.second, None);
                // No dedicated GT/GE opcode exists: `a > b` compiles as
                // `b < a`, `a >= b` as `b <= a`.
                let (op, b, c) = match e.op {
                    BinaryOp::Greater => (Opcode::Lt, rhs, lhs),
                    BinaryOp::GreaterEq => (Opcode::Le, rhs, lhs),
                    ref other => (binary_opcode(other), lhs, rhs),
                };
                self.builder.emit(op, dest as i32, b as i32, c as i32, line);
                self.builder.registers.free_to(mark.max(dest + 1));
                dest
            }
        }
    }

    fn compile_short_circuit(&mut self, e: &BinaryExpr, target: Option<u32>) -> u32 {
        let line = e.position.start_line;
        let dest = self.dest(target);
        let mark = self.builder.registers.mark();
        self.compile_expr(&e.first, Some(dest));
        let skip = match e.op {
            BinaryOp::LogicAnd => self.builder.emit_jump(Opcode::BranchNot, dest as i32, line),
            _ => self.builder.emit_jump(Opcode::Branch, dest as i32, line),
        };
        self.compile_expr(&e.second, Some(dest));
        self.builder.patch_jump(skip);
        self.builder.registers.free_to(mark.max(dest + 1));
        dest
    }

    fn compile_assignment(&mut self, e: &BinaryExpr, target: Option<u32>) -> u32 {
        let line = e.position.start_line;
        let mark = self.builder.registers.mark();

        let value_reg = if let BinaryOp::Assign = e.op {
            let reg = self.builder.registers.alloc();
            self.compile_expr(&e.first, Some(reg));
            self.store_to(&e.second, reg, line);
            reg
        } else {
            let lv = self.resolve_lvalue(&e.second);
            let current = self.load_lvalue(&lv, None, line);
            let incoming = self.compile_expr(&e.first, None);
            let result = self.builder.registers.alloc();
            let op = compound_opcode(&e.op);
            self.builder.emit(op, result as i32, current as i32, incoming as i32, line);
            self.store_lvalue(&lv, result, line);
            result
        };

        let dest = self.dest(target);
        if dest != value_reg {
            self.builder.emit(Opcode::Assign, dest as i32, value_reg as i32, 0, line);
        }
        self.builder.registers.free_to(mark.max(dest + 1));
        dest
    }

    fn compile_trinary(&mut self, e: &TrinaryExpr, target: Option<u32>) -> u32 {
        let line = e.position.start_line;
        let dest = self.dest(target);
        let mark = self.builder.registers.mark();
        let creg = self.builder.registers.alloc();
        self.compile_expr(&e.condition, Some(creg));
        let else_jump = self.builder.emit_jump(Opcode::BranchNot, creg as i32, line);
        self.builder.registers.free_to(creg);

        self.compile_expr(&e.second, Some(dest));
        let end_jump = self.builder.emit_jump(Opcode::Jump, 0, line);
        self.builder.patch_jump(else_jump);
        self.compile_expr(&e.third, Some(dest));
        self.builder.patch_jump(end_jump);

        self.builder.registers.free_to(mark.max(dest + 1));
        dest
    }

    fn compile_terminal(&mut self, e: &TerminalExpr, target: Option<u32>) -> u32 {
        let line = e.position.start_line;
        match &e.kind {
            TerminalKind::Identifier(name) => {
                match e.var_kind.as_ref().expect("analyzer must resolve every identifier") {
                    VarKind::Local { register_offset } => match target {
                        Some(t) if t != *register_offset => {
                            self.builder.emit(Opcode::Assign, t as i32, *register_offset as i32, 0, line);
                            t
                        }
                        Some(t) => t,
                        None => *register_offset,
                    },
                    VarKind::Upvalue { .. } => {
                        let dest = self.dest(target);
                        let idx = self.upvalue_index(name);
                        self.builder.emit(Opcode::GetUpval, dest as i32, idx as i32, 0, line);
                        dest
                    }
                    VarKind::Global => {
                        let dest = self.dest(target);
                        let k = self.builder.const_str(name);
                        self.builder.emit(Opcode::GetGlobal, dest as i32, k as i32, 0, line);
                        dest
                    }
                }
            }
            TerminalKind::Null => {
                let dest = self.dest(target);
                let k = self.builder.const_null();
                self.builder.emit(Opcode::GetConst, dest as i32, k as i32, 0, line);
                dest
            }
            TerminalKind::Int(v) | TerminalKind::Hex(v) => {
                let dest = self.dest(target);
                let k = self.builder.const_int(*v);
                self.builder.emit(Opcode::GetConst, dest as i32, k as i32, 0, line);
                dest
            }
            TerminalKind::Float(v) => {
                let dest = self.dest(target);
                let k = self.builder.const_float(v.0);
                self.builder.emit(Opcode::GetConst, dest as i32, k as i32, 0, line);
                dest
            }
            TerminalKind::Str(v) => {
                let dest = self.dest(target);
                let k = self.builder.const_str(v);
                self.builder.emit(Opcode::GetConst, dest as i32, k as i32, 0, line);
                dest
            }
        }
    }

    fn compile_call(&mut self, e: &CallExpr, target: Option<u32>) -> u32 {
        let line = e.position.start_line;
        let mark = self.builder.registers.mark();
        let base = self.builder.registers.alloc_range(1 + e.arguments.len() as u32);
        self.compile_expr(&e.callee, Some(base));
        for (i, arg) in e.arguments.iter().enumerate() {
            self.compile_expr(arg, Some(base + 1 + i as u32));
        }
        self.builder.emit(Opcode::Call, base as i32, e.arguments.len() as i32, 1, line);

        let dest = self.dest(target);
        if dest != base {
            self.builder.emit(Opcode::Assign, dest as i32, base as i32, 0, line);
        }
        self.builder.registers.free_to(mark.max(dest + 1));
        dest
    }

    fn compile_table(&mut self, e: &TableExpr, target: Option<u32>) -> u32 {
        let line = e.position.start_line;
        let dest = self.dest(target);
        let op = if e.shape == TableShape::Array { Opcode::NewArray } else { Opcode::NewTable };
        self.builder.emit(op, dest as i32, 0, 0, line);

        let mut auto_key = 0i64;
        let mark = self.builder.registers.mark();
        for init in &e.initializers {
            let key_reg = self.builder.registers.alloc();
            match &init.key {
                Some(key) => {
                    self.compile_expr(key, Some(key_reg));
                }
                None => {
                    let k = self.builder.const_int(auto_key);
                    self.builder.emit(Opcode::GetConst, key_reg as i32, k as i32, 0, line);
                    auto_key += 1;
                }
            }
            let val_reg = self.compile_expr(&init.value, None);
            self.builder.emit(Opcode::SetTable, dest as i32, key_reg as i32, val_reg as i32, line);
            self.builder.registers.free_to(key_reg);
        }
        self.builder.registers.free_to(mark.max(dest + 1));
        dest
    }
}

fn binary_opcode(op: &BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Mod,
        BinaryOp::BitAnd => Opcode::BitAnd,
        BinaryOp::BitOr => Opcode::BitOr,
        BinaryOp::BitXor => Opcode::BitXor,
        BinaryOp::Shl => Opcode::Sl,
        BinaryOp::Shr => Opcode::Sr,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::NotEq => Opcode::NotEq,
        BinaryOp::Less => Opcode::Lt,
        BinaryOp::LessEq => Opcode::Le,
        other => unreachable!("{other:?} is not a plain binary opcode"),
    }
}

fn compound_opcode(op: &BinaryOp) -> Opcode {
    match op {
        BinaryOp::AssignAdd => Opcode::Add,
        BinaryOp::AssignSub => Opcode::Sub,
        BinaryOp::AssignMul => Opcode::Mul,
        BinaryOp::AssignDiv => Opcode::Div,
        BinaryOp::AssignMod => Opcode::Mod,
        BinaryOp::AssignShl => Opcode::Sl,
        BinaryOp::AssignShr => Opcode::Sr,
        BinaryOp::AssignAnd => Opcode::BitAnd,
        BinaryOp::AssignOr => Opcode::BitOr,
        BinaryOp::AssignXor => Opcode::BitXor,
        other => unreachable!("{other:?} is not a compound-assignment opcode"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::heap::Heap;
    use crate::parser::Parser;

    fn compile_src(src: &str) -> Rc<Prototype> {
        let mut program = Parser::new(src).and_then(Parser::parse_program).expect("parse error");
        Analyzer::new().analyze(&mut program).expect("analysis error");
        let mut heap = Heap::new();
        compile(&program, &mut heap)
    }

    #[test]
    fn compound_assignment_through_table_index_visits_it_once() {
        let proto = compile_src("local t = table{}; t[1] += 2;");
        let gets: Vec<_> = proto.code.iter().filter(|i| i.op == Opcode::GetTable).collect();
        let sets: Vec<_> = proto.code.iter().filter(|i| i.op == Opcode::SetTable).collect();
        assert_eq!(gets.len(), 1, "container/key must be evaluated exactly once for the read");
        assert_eq!(sets.len(), 1, "container/key must be evaluated exactly once for the write");

        // GETTABLE a b c: reg[a] = reg[b][reg[c]]; SETTABLE a b c: reg[a][reg[b]] = reg[c].
        // The read and the write must land on the same container/key registers.
        assert_eq!(gets[0].b, sets[0].a, "container register must be shared between read and write");
        assert_eq!(gets[0].c, sets[0].b, "key register must be shared between read and write");
    }

    #[test]
    fn increment_through_table_index_visits_it_once() {
        let proto = compile_src("local t = table{}; t[1]++;");
        let gets = proto.code.iter().filter(|i| i.op == Opcode::GetTable).count();
        let sets = proto.code.iter().filter(|i| i.op == Opcode::SetTable).count();
        assert_eq!(gets, 1);
        assert_eq!(sets, 1);
    }

    #[test]
    fn simple_assignment_through_table_index_emits_a_single_settable() {
        let proto = compile_src("local t = table{}; t[1] = 5;");
        let sets = proto.code.iter().filter(|i| i.op == Opcode::SetTable).count();
        assert_eq!(sets, 1);
    }

    #[test]
    fn plain_index_read_emits_a_single_gettable() {
        let proto = compile_src("local t = table{}; return t[1];");
        let gets = proto.code.iter().filter(|i| i.op == Opcode::GetTable).count();
        assert_eq!(gets, 1);
    }
}
