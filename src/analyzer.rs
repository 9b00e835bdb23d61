//! Semantic analysis: name resolution, l-value validation, and loop/jump
//! bookkeeping.
//!
//! Walks the tree the parser produced and fills in every `Option<T>` field
//! the analyzer owns (see ast.rs's module doc for the phase-ordering
//! discipline). Grounded in the scope-management shape of
//! `examples/scostello-monty/crates/monty/src/namespace.rs` (a stack of
//! per-function frames, each tracking its own locals and resolving free
//! names against enclosing frames before falling back to global), adapted
//! from monty's Python-scoping rules to this language's C-like block scopes.

use crate::ast::*;
use crate::error::AnalysisError;

struct LocalVar {
    name: String,
    register_offset: u32,
    scope_depth: u32,
}

/// One function's worth of scope state: its locals (as a flat stack, not a
/// tree, so popping a block scope is an O(k) truncation) and its open loop
/// ids for `break`/`continue` resolution.
struct FunctionFrame {
    locals: Vec<LocalVar>,
    scope_depth: u32,
    next_register: u32,
    max_register: u32,
    loop_stack: Vec<u32>,
    next_loop_id: u32,
    /// Upvalues already captured by this frame, so repeated references to
    /// the same outer local reuse one `UpvalueRef` instead of duplicating.
    upvalues: Vec<UpvalueRef>,
}

impl FunctionFrame {
    fn new() -> Self {
        Self {
            locals: Vec::new(),
            scope_depth: 0,
            next_register: 0,
            max_register: 0,
            loop_stack: Vec::new(),
            next_loop_id: 0,
            upvalues: Vec::new(),
        }
    }

    fn declare_local(&mut self, name: String) -> u32 {
        let register_offset = self.next_register;
        self.next_register += 1;
        self.max_register = self.max_register.max(self.next_register);
        self.locals.push(LocalVar { name, register_offset, scope_depth: self.scope_depth });
        register_offset
    }

    fn open_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn close_scope(&mut self) {
        let depth = self.scope_depth;
        let cutoff = self.locals.iter().rposition(|l| l.scope_depth < depth).map_or(0, |i| i + 1);
        self.next_register -= (self.locals.len() - cutoff) as u32;
        self.locals.truncate(cutoff);
        self.scope_depth -= 1;
    }

    fn resolve_local(&self, name: &str) -> Option<u32> {
        self.locals.iter().rev().find(|l| l.name == name).map(|l| l.register_offset)
    }

    fn or_insert_upvalue(&mut self, name: &str, function_level: u32, register_offset: u32) {
        if !self.upvalues.iter().any(|u| u.name == name) {
            self.upvalues.push(UpvalueRef { name: name.to_owned(), function_level, register_offset });
        }
    }
}

pub struct Analyzer {
    frames: Vec<FunctionFrame>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    #[must_use]
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// # Errors
    /// Returns an [`AnalysisError`] on the first unresolved l-value,
    /// out-of-loop jump, or malformed `array` literal key.
    pub fn analyze(&mut self, program: &mut Program) -> Result<(), AnalysisError> {
        self.analyze_function(&mut program.top_level)
    }

    fn current_level(&self) -> u32 {
        (self.frames.len() - 1) as u32
    }

    fn analyze_function(&mut self, def: &mut FunctionDefinition) -> Result<(), AnalysisError> {
        self.frames.push(FunctionFrame::new());
        let level = self.current_level();
        def.function_level = Some(level);

        for arg in &mut def.arguments {
            let offset = self.frames.last_mut().expect("just pushed").declare_local(arg.name.clone());
            arg.scope_level = Some(0);
            arg.function_level = Some(level);
            arg.register_offset = Some(offset);
        }

        self.analyze_stmt(&mut def.body)?;

        let frame = self.frames.pop().expect("pushed at function entry");
        def.num_variable = Some(frame.max_register);
        def.upvalues = frame.upvalues;
        Ok(())
    }

    fn frame(&mut self) -> &mut FunctionFrame {
        self.frames.last_mut().expect("analyzer always runs inside a function frame")
    }

    fn analyze_stmt(&mut self, stmt: &mut Stmt) -> Result<(), AnalysisError> {
        match stmt {
            Stmt::Sequence(stmts) => {
                for s in stmts {
                    self.analyze_stmt(s)?;
                }
                Ok(())
            }
            Stmt::Compound(s) => self.analyze_compound(s),
            Stmt::For(s) => self.analyze_for(s),
            Stmt::While(s) => self.analyze_while(s),
            Stmt::DoWhile(s) => self.analyze_do_while(s),
            Stmt::IfElse(s) => self.analyze_if_else(s),
            Stmt::Return(s) => {
                if let Some(value) = &mut s.value {
                    self.analyze_rvalue(value)?;
                }
                Ok(())
            }
            Stmt::Jump(s) => self.analyze_jump(s),
            Stmt::Variable(s) => self.analyze_variable(s),
            Stmt::Expression(e) => self.analyze_rvalue(e),
        }
    }

    fn analyze_compound(&mut self, s: &mut CompoundStmt) -> Result<(), AnalysisError> {
        let frame = self.frame();
        frame.open_scope();
        s.scope_level = Some(frame.scope_depth);
        let locals_before = frame.locals.len();

        for stmt in &mut s.body {
            self.analyze_stmt(stmt)?;
        }

        let frame = self.frame();
        s.num_variable = Some((frame.locals.len() - locals_before) as u32);
        frame.close_scope();
        Ok(())
    }

    fn analyze_for(&mut self, s: &mut ForStmt) -> Result<(), AnalysisError> {
        self.frame().open_scope();
        let loop_id = self.push_loop();
        s.loop_id = Some(loop_id);

        if let Some(init) = &mut s.init {
            self.analyze_stmt(init)?;
        }
        if let Some(condition) = &mut s.condition {
            self.analyze_rvalue(condition)?;
        }
        if let Some(step) = &mut s.step {
            self.analyze_rvalue(step)?;
        }
        self.analyze_stmt(&mut s.body)?;

        self.pop_loop();
        self.frame().close_scope();
        Ok(())
    }

    fn analyze_while(&mut self, s: &mut WhileStmt) -> Result<(), AnalysisError> {
        self.analyze_rvalue(&mut s.condition)?;
        let loop_id = self.push_loop();
        s.loop_id = Some(loop_id);
        self.analyze_stmt(&mut s.body)?;
        self.pop_loop();
        Ok(())
    }

    fn analyze_do_while(&mut self, s: &mut DoWhileStmt) -> Result<(), AnalysisError> {
        let loop_id = self.push_loop();
        s.loop_id = Some(loop_id);
        self.analyze_stmt(&mut s.body)?;
        self.pop_loop();
        self.analyze_rvalue(&mut s.condition)?;
        Ok(())
    }

    fn analyze_if_else(&mut self, s: &mut IfElseStmt) -> Result<(), AnalysisError> {
        self.analyze_rvalue(&mut s.condition)?;
        self.analyze_stmt(&mut s.then_branch)?;
        if let Some(else_branch) = &mut s.else_branch {
            self.analyze_stmt(else_branch)?;
        }
        Ok(())
    }

    fn analyze_jump(&mut self, s: &mut JumpStmt) -> Result<(), AnalysisError> {
        let keyword = match s.kind {
            JumpKind::Break => "break",
            JumpKind::Continue => "continue",
        };
        let frame = self.frame();
        let loop_id = *frame
            .loop_stack
            .last()
            .ok_or(AnalysisError::JumpOutsideLoop { line: s.position.start_line, keyword })?;
        s.corresponding_loop = Some(loop_id);
        Ok(())
    }

    fn analyze_variable(&mut self, s: &mut VariableStmt) -> Result<(), AnalysisError> {
        if let Some(init) = &mut s.init {
            self.analyze_rvalue(init)?;
        }
        let level = self.current_level();
        let frame = self.frame();
        let offset = frame.declare_local(s.name.clone());
        s.scope_level = Some(frame.scope_depth);
        s.function_level = Some(level);
        s.register_offset = Some(offset);
        Ok(())
    }

    fn push_loop(&mut self) -> u32 {
        let frame = self.frame();
        let id = frame.next_loop_id;
        frame.next_loop_id += 1;
        frame.loop_stack.push(id);
        id
    }

    fn pop_loop(&mut self) {
        self.frame().loop_stack.pop();
    }

    /// Resolves a name visible from the current (innermost) function frame,
    /// searching enclosing frames and registering an upvalue chain as
    /// needed. Returns `None` if the name is not declared in any frame,
    /// meaning it's a global.
    fn resolve(&mut self, name: &str) -> Option<VarKind> {
        let current = self.frames.len() - 1;
        if let Some(offset) = self.frames[current].resolve_local(name) {
            return Some(VarKind::Local { register_offset: offset });
        }

        for depth in (0..current).rev() {
            if let Some(offset) = self.frames[depth].resolve_local(name) {
                let function_level = depth as u32;
                // Every intermediate frame between the definition and the
                // use site also needs to thread the upvalue through,
                // mirroring how a closure captures by walking its lexical
                // chain one link at a time.
                let mut carried_offset = offset;
                for mid in (depth + 1)..=current {
                    self.frames[mid].or_insert_upvalue(name, function_level, carried_offset);
                    carried_offset = self.frames[mid].upvalues.iter().position(|u| u.name == name).unwrap() as u32;
                }
                return Some(VarKind::Upvalue { function_level, offset });
            }
        }

        None
    }

    /// Visits an expression used strictly for its value (never as an
    /// assignment/inc-dec target).
    fn analyze_rvalue(&mut self, expr: &mut Expr) -> Result<(), AnalysisError> {
        match expr {
            Expr::Unary(e) => {
                if matches!(
                    e.op,
                    UnaryOp::PrefixInc | UnaryOp::PrefixDec | UnaryOp::PostfixInc | UnaryOp::PostfixDec
                ) {
                    self.analyze_lvalue(&mut e.operand, true)?;
                } else {
                    self.analyze_rvalue(&mut e.operand)?;
                }
                Ok(())
            }
            Expr::Binary(e) => {
                if e.op.is_assignment() {
                    self.analyze_rvalue(&mut e.first)?;
                    let read_back = !matches!(e.op, BinaryOp::Assign);
                    self.analyze_lvalue(&mut e.second, read_back)?;
                    e.flags |= Flags::STORE;
                } else {
                    self.analyze_rvalue(&mut e.first)?;
                    self.analyze_rvalue(&mut e.second)?;
                }
                Ok(())
            }
            Expr::Trinary(e) => {
                self.analyze_rvalue(&mut e.condition)?;
                self.analyze_rvalue(&mut e.second)?;
                self.analyze_rvalue(&mut e.third)?;
                Ok(())
            }
            Expr::Terminal(e) => self.analyze_terminal(e, false),
            Expr::Call(e) => {
                self.analyze_rvalue(&mut e.callee)?;
                for arg in &mut e.arguments {
                    self.analyze_rvalue(arg)?;
                }
                Ok(())
            }
            Expr::Function(e) => self.analyze_function(&mut e.def),
            Expr::TableLit(e) => self.analyze_table(e),
        }
    }

    /// Visits an expression used as an assignment or increment/decrement
    /// target. `also_loaded` is true when the operator also reads the
    /// target first (compound assignment, inc/dec).
    fn analyze_lvalue(&mut self, expr: &mut Expr, also_loaded: bool) -> Result<(), AnalysisError> {
        match expr {
            Expr::Terminal(e) => self.analyze_terminal(e, true).map(|()| {
                e.flags |= Flags::LVALUE | Flags::STORE;
                if also_loaded {
                    e.flags |= Flags::LOAD;
                } else {
                    e.flags |= Flags::NOLOAD;
                }
            }),
            Expr::Binary(e) if e.op == BinaryOp::Index => {
                self.analyze_rvalue(&mut e.first)?;
                self.analyze_rvalue(&mut e.second)?;
                e.flags |= Flags::LVALUE | Flags::STORE | Flags::TABLE;
                if also_loaded {
                    e.flags |= Flags::LOAD;
                } else {
                    e.flags |= Flags::NOLOAD;
                }
                Ok(())
            }
            other => Err(AnalysisError::NotAnLValue { line: other.position().start_line }),
        }
    }

    fn analyze_terminal(&mut self, e: &mut TerminalExpr, is_lvalue_target: bool) -> Result<(), AnalysisError> {
        match &e.kind {
            TerminalKind::Identifier(name) => {
                let kind = self.resolve(name).unwrap_or(VarKind::Global);
                match &kind {
                    VarKind::Global => e.flags |= Flags::GLOBAL,
                    VarKind::Upvalue { .. } => e.flags |= Flags::UPVALUE,
                    VarKind::Local { .. } => {}
                }
                if !is_lvalue_target {
                    e.flags |= Flags::LOAD;
                }
                e.var_kind = Some(kind);
            }
            TerminalKind::Int(_) | TerminalKind::Hex(_) => e.flags |= Flags::INTVALUE,
            TerminalKind::Null | TerminalKind::Float(_) | TerminalKind::Str(_) => {}
        }
        Ok(())
    }

    fn analyze_table(&mut self, e: &mut TableExpr) -> Result<(), AnalysisError> {
        e.flags |= Flags::TABLE;

        let mut all_array = true;
        for init in &mut e.initializers {
            let is_array_field = match &init.key {
                None => true,
                Some(key) => {
                    matches!(key, Expr::Terminal(t) if matches!(t.kind, TerminalKind::Int(_) | TerminalKind::Hex(_)))
                }
            };
            if is_array_field {
                init.flags |= Flags::ARRAY;
            } else {
                all_array = false;
            }

            if let Some(key) = &mut init.key {
                if e.shape == TableShape::Array && !is_array_field {
                    return Err(AnalysisError::NonIntegerArrayKey { line: key.position().start_line });
                }
                self.analyze_rvalue(key)?;
            }
            self.analyze_rvalue(&mut init.value)?;
        }

        // An un-keyworded literal's shape is inferred from its fields: all
        // of them keyless or integer-literal-keyed makes it an array,
        // anything else makes it a table (spec.md §4.3).
        if e.shape == TableShape::Unknown {
            e.shape = if all_array { TableShape::Array } else { TableShape::Table };
        }
        if e.shape == TableShape::Array {
            e.flags |= Flags::ARRAY;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn analyze_ok(src: &str) -> Program {
        let mut program = Parser::new(src).and_then(Parser::parse_program).expect("parse error");
        Analyzer::new().analyze(&mut program).expect("analysis error");
        program
    }

    fn analyze_err(src: &str) -> AnalysisError {
        let mut program = Parser::new(src).and_then(Parser::parse_program).expect("parse error");
        Analyzer::new().analyze(&mut program).expect_err("expected analysis error")
    }

    #[test]
    fn resolves_local_before_global() {
        let program = analyze_ok("local x = 1; return x;");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Return(ret) = &stmts[1] else { panic!() };
        let Some(Expr::Terminal(t)) = &ret.value else { panic!() };
        assert_eq!(t.var_kind, Some(VarKind::Local { register_offset: 0 }));
    }

    #[test]
    fn undeclared_name_resolves_global() {
        let program = analyze_ok("return undeclared;");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Return(ret) = &stmts[0] else { panic!() };
        let Some(Expr::Terminal(t)) = &ret.value else { panic!() };
        assert_eq!(t.var_kind, Some(VarKind::Global));
        assert!(t.flags.contains(Flags::GLOBAL));
    }

    #[test]
    fn closure_captures_outer_local_as_upvalue() {
        let program = analyze_ok("local x = 1; local f = function() { return x; };");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Variable(f_decl) = &stmts[1] else { panic!() };
        let Some(Expr::Function(f)) = &f_decl.init else { panic!() };
        assert_eq!(f.def.upvalues.len(), 1);
        assert_eq!(f.def.upvalues[0].name, "x");
        assert_eq!(f.def.upvalues[0].function_level, 0);
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let err = analyze_err("break;");
        assert!(matches!(err, AnalysisError::JumpOutsideLoop { keyword: "break", .. }));
    }

    #[test]
    fn break_inside_loop_resolves_loop_id() {
        let program = analyze_ok("while (1) { break; }");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::While(w) = &stmts[0] else { panic!() };
        assert_eq!(w.loop_id, Some(0));
        let Stmt::Compound(body) = w.body.as_ref() else { panic!() };
        let Stmt::Jump(j) = &body.body[0] else { panic!() };
        assert_eq!(j.corresponding_loop, Some(0));
    }

    #[test]
    fn assignment_to_literal_is_not_an_lvalue() {
        let err = analyze_err("1 = 2;");
        assert!(matches!(err, AnalysisError::NotAnLValue { .. }));
    }

    #[test]
    fn array_literal_rejects_non_integer_key() {
        let err = analyze_err(r#"return array { x: 1 };"#);
        assert!(matches!(err, AnalysisError::NonIntegerArrayKey { .. }));
    }

    #[test]
    fn array_literal_accepts_hex_key() {
        analyze_ok("return array { 0x1: 1 };");
    }

    #[test]
    fn unkeyworded_literal_infers_array_shape_when_all_fields_are_keyless() {
        let program = analyze_ok("return {1, 2, 3};");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Return(ret) = &stmts[0] else { panic!() };
        let Some(Expr::TableLit(t)) = &ret.value else { panic!() };
        assert_eq!(t.shape, TableShape::Array);
    }

    #[test]
    fn unkeyworded_literal_infers_table_shape_when_any_field_has_a_non_integer_key() {
        let program = analyze_ok(r#"return {1, x: 2};"#);
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Return(ret) = &stmts[0] else { panic!() };
        let Some(Expr::TableLit(t)) = &ret.value else { panic!() };
        assert_eq!(t.shape, TableShape::Table);
    }

    #[test]
    fn block_scope_locals_do_not_leak() {
        // `y` is declared inside the compound block and must not resolve
        // as a local once that block has closed; referencing it afterward
        // resolves as a global instead of reusing the freed register slot.
        let program = analyze_ok("{ local y = 1; } return y;");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Return(ret) = &stmts[1] else { panic!() };
        let Some(Expr::Terminal(t)) = &ret.value else { panic!() };
        assert_eq!(t.var_kind, Some(VarKind::Global));
    }
}
