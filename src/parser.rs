//! Recursive-descent parser with explicit precedence climbing.
//!
//! Grammar and precedence table follow spec.md §4.2, grounded in
//! `examples/original_source/cmm-lang/Parser.cpp`'s hand-written descent
//! (no parser generator / combinator crate, matching monty's own
//! hand-written recursive descent in spirit even though monty delegates to
//! `ruff_python_parser` for actual Python syntax — this grammar is bespoke,
//! so it is parsed bespoke).

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, Position, Token, TokenKind};

pub struct Parser {
    lexer: Lexer,
    current: Token,
    function_counter: u32,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    /// # Errors
    /// Returns a [`ParseError`] if the very first token cannot be lexed.
    pub fn new(source: &str) -> PResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.scan()?;
        Ok(Self { lexer, current, function_counter: 0 })
    }

    /// Entry rule: wraps the whole file in a synthetic top-level function
    /// with no parameters, per spec.md §4.2.
    ///
    /// # Errors
    /// Returns a [`ParseError`] on any lexical or syntactic failure.
    pub fn parse_program(mut self) -> PResult<Program> {
        let position = self.current.position;
        let mut stmts = Vec::new();
        while self.current.kind != TokenKind::End {
            stmts.push(self.parse_statement()?);
        }
        Ok(Program {
            top_level: FunctionDefinition {
                arguments: Vec::new(),
                body: Box::new(Stmt::Sequence(stmts)),
                position,
                upvalues: Vec::new(),
                num_variable: None,
                function_level: None,
                function_num: None,
            },
        })
    }

    fn bump(&mut self) -> PResult<Token> {
        let next = self.lexer.scan()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn line(&self) -> u32 {
        self.current.position.start_line
    }

    fn describe(tok: &Token) -> String {
        match &tok.kind {
            TokenKind::End => "end of input".to_owned(),
            _ => tok.lexeme.clone(),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        if std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind) {
            self.bump()
        } else {
            Err(ParseError::Expected {
                line: self.line(),
                expected: format!("{kind}"),
                found: Self::describe(&self.current),
            })
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> PResult<bool> {
        if self.at(kind) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_identifier(&mut self) -> PResult<(String, Position)> {
        match self.current.kind.clone() {
            TokenKind::Identifier(name) => {
                let position = self.current.position;
                self.bump()?;
                Ok((name, position))
            }
            _ => Err(ParseError::Expected {
                line: self.line(),
                expected: "identifier".to_owned(),
                found: Self::describe(&self.current),
            }),
        }
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> PResult<Stmt> {
        match &self.current.kind {
            TokenKind::LeftBrace => self.parse_compound(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::If => self.parse_if(),
            TokenKind::Return | TokenKind::Yield => self.parse_return(),
            TokenKind::Break | TokenKind::Continue => self.parse_jump(),
            TokenKind::Local => self.parse_local(),
            TokenKind::Semicolon => {
                self.bump()?;
                Ok(Stmt::Sequence(vec![]))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_compound(&mut self) -> PResult<Stmt> {
        let position = self.current.position;
        self.expect(&TokenKind::LeftBrace)?;
        let mut body = Vec::new();
        while !self.at(&TokenKind::RightBrace) && self.current.kind != TokenKind::End {
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(Stmt::Compound(CompoundStmt { body, position, scope_level: None, num_variable: None }))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let position = self.current.position;
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LeftParen)?;
        let init = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_for_clause_statement()?))
        };
        self.expect(&TokenKind::Semicolon)?;
        let condition = if self.at(&TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
        self.expect(&TokenKind::Semicolon)?;
        let step = if self.at(&TokenKind::RightParen) { None } else { Some(self.parse_expression()?) };
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For(ForStmt { init, condition, step, body, position, loop_id: None }))
    }

    /// `for`'s init clause accepts either a `local` declaration or a bare
    /// expression statement, but not a full nested statement grammar.
    fn parse_for_clause_statement(&mut self) -> PResult<Stmt> {
        if self.at(&TokenKind::Local) {
            self.parse_local_no_semicolon()
        } else {
            let expr = self.parse_expression()?;
            Ok(Stmt::Expression(expr))
        }
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let position = self.current.position;
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While(WhileStmt { condition, body, position, loop_id: None }))
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        let position = self.current.position;
        self.expect(&TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::DoWhile(DoWhileStmt { body, condition, position, loop_id: None }))
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let position = self.current.position;
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch =
            if self.eat(&TokenKind::Else)? { Some(Box::new(self.parse_statement()?)) } else { None };
        Ok(Stmt::IfElse(IfElseStmt { condition, then_branch, else_branch, position }))
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let position = self.current.position;
        let kind = if self.at(&TokenKind::Yield) {
            return Err(ParseError::YieldUnsupported { line: self.line() });
        } else {
            self.expect(&TokenKind::Return)?;
            ReturnKind::Return
        };
        let value = if self.at(&TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Return(ReturnStmt { kind, value, position }))
    }

    fn parse_jump(&mut self) -> PResult<Stmt> {
        let position = self.current.position;
        let kind = if self.eat(&TokenKind::Break)? {
            JumpKind::Break
        } else {
            self.expect(&TokenKind::Continue)?;
            JumpKind::Continue
        };
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Jump(JumpStmt { kind, position, corresponding_loop: None }))
    }

    fn parse_local(&mut self) -> PResult<Stmt> {
        let stmt = self.parse_local_no_semicolon()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(stmt)
    }

    fn parse_local_no_semicolon(&mut self) -> PResult<Stmt> {
        let position = self.current.position;
        self.expect(&TokenKind::Local)?;

        if self.eat(&TokenKind::Function)? {
            let (name, name_pos) = self.expect_identifier()?;
            let def = self.parse_function_tail(name_pos)?;
            return Ok(Stmt::Variable(VariableStmt {
                name,
                init: Some(Expr::Function(FunctionExpr {
                    def: Box::new(def),
                    position: name_pos,
                    flags: Flags::empty(),
                    register_offset: None,
                })),
                position,
                scope_level: None,
                function_level: None,
                register_offset: None,
            }));
        }

        match self.current.kind.clone() {
            TokenKind::Identifier(_) => {
                let mut decls = Vec::new();
                loop {
                    let (name, name_pos) = self.expect_identifier()?;
                    let init = if self.eat(&TokenKind::Assign)? { Some(self.parse_assignment()?) } else { None };
                    decls.push(Stmt::Variable(VariableStmt {
                        name,
                        init,
                        position: name_pos,
                        scope_level: None,
                        function_level: None,
                        register_offset: None,
                    }));
                    if !self.eat(&TokenKind::Comma)? {
                        break;
                    }
                }
                // A single declaration returns bare, so `local x = 1;` is
                // indistinguishable downstream from any other single
                // statement; only `local a, b;` needs the `Sequence` wrapper.
                if decls.len() == 1 {
                    Ok(decls.into_iter().next().expect("len checked above"))
                } else {
                    Ok(Stmt::Sequence(decls))
                }
            }
            _ => Err(ParseError::MalformedLocal { line: self.line(), found: Self::describe(&self.current) }),
        }
    }

    fn parse_expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.parse_expression()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::Expression(expr))
    }

    // ---- expressions, by precedence (lowest to highest) ----

    fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    /// Right-associative. Builds a downward-growing `BinaryExpr` chain
    /// whose *second* operand is the destination and whose *first* operand
    /// is the value, per spec.md §4.2.
    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_conditional()?;
        let position = lhs.position();

        let op = match &self.current.kind {
            TokenKind::Assign => BinaryOp::Assign,
            TokenKind::PlusAssign => BinaryOp::AssignAdd,
            TokenKind::MinusAssign => BinaryOp::AssignSub,
            TokenKind::StarAssign => BinaryOp::AssignMul,
            TokenKind::SlashAssign => BinaryOp::AssignDiv,
            TokenKind::PercentAssign => BinaryOp::AssignMod,
            TokenKind::ShlAssign => BinaryOp::AssignShl,
            TokenKind::ShrAssign => BinaryOp::AssignShr,
            TokenKind::AmpAssign => BinaryOp::AssignAnd,
            TokenKind::PipeAssign => BinaryOp::AssignOr,
            TokenKind::CaretAssign => BinaryOp::AssignXor,
            _ => return Ok(lhs),
        };
        self.bump()?;
        let value = self.parse_assignment()?;
        Ok(Expr::Binary(BinaryExpr {
            op,
            first: Box::new(value),
            second: Box::new(lhs),
            position,
            flags: Flags::empty(),
            register_offset: None,
        }))
    }

    /// Right-associative `? :`.
    fn parse_conditional(&mut self) -> PResult<Expr> {
        let condition = self.parse_logic_or()?;
        if self.eat(&TokenKind::Question)? {
            let position = condition.position();
            let second = self.parse_assignment()?;
            self.expect(&TokenKind::Colon)?;
            let third = self.parse_conditional()?;
            Ok(Expr::Trinary(TrinaryExpr {
                condition: Box::new(condition),
                second: Box::new(second),
                third: Box::new(third),
                position,
                flags: Flags::empty(),
                register_offset: None,
            }))
        } else {
            Ok(condition)
        }
    }

    fn parse_logic_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_logic_and()?;
        while self.at(&TokenKind::OrOr) {
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_logic_and()?;
            lhs = Expr::Binary(Self::binop(BinaryOp::LogicOr, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_logic_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bit_or()?;
        while self.at(&TokenKind::AndAnd) {
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_bit_or()?;
            lhs = Expr::Binary(Self::binop(BinaryOp::LogicAnd, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bit_xor()?;
        while self.at(&TokenKind::Pipe) {
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_bit_xor()?;
            lhs = Expr::Binary(Self::binop(BinaryOp::BitOr, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bit_and()?;
        while self.at(&TokenKind::Caret) {
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_bit_and()?;
            lhs = Expr::Binary(Self::binop(BinaryOp::BitXor, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.at(&TokenKind::Amp) {
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(Self::binop(BinaryOp::BitAnd, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match &self.current.kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(Self::binop(op, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match &self.current.kind {
                TokenKind::Lt => BinaryOp::Less,
                TokenKind::Le => BinaryOp::LessEq,
                TokenKind::Gt => BinaryOp::Greater,
                TokenKind::Ge => BinaryOp::GreaterEq,
                _ => break,
            };
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary(Self::binop(op, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match &self.current.kind {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(Self::binop(op, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match &self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(Self::binop(op, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match &self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let position = lhs.position();
            self.bump()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(Self::binop(op, lhs, rhs, position));
        }
        Ok(lhs)
    }

    fn binop(op: BinaryOp, first: Expr, second: Expr, position: Position) -> BinaryExpr {
        BinaryExpr {
            op,
            first: Box::new(first),
            second: Box::new(second),
            position,
            flags: Flags::empty(),
            register_offset: None,
        }
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let position = self.current.position;
        let op = match &self.current.kind {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Inc => Some(UnaryOp::PrefixInc),
            TokenKind::Dec => Some(UnaryOp::PrefixDec),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Bang => Some(UnaryOp::LogicNot),
            _ => None,
        };
        if let Some(op) = op {
            self.bump()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryExpr {
                op,
                operand: Box::new(operand),
                position,
                flags: Flags::empty(),
                register_offset: None,
            }));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match &self.current.kind {
                TokenKind::LeftBracket => {
                    let position = expr.position();
                    self.bump()?;
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RightBracket)?;
                    expr = Expr::Binary(Self::binop(BinaryOp::Index, expr, index, position));
                }
                TokenKind::LeftParen => {
                    let position = expr.position();
                    self.bump()?;
                    let mut arguments = Vec::new();
                    if !self.at(&TokenKind::RightParen) {
                        loop {
                            arguments.push(self.parse_assignment()?);
                            if !self.eat(&TokenKind::Comma)? {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RightParen)?;
                    expr = Expr::Call(CallExpr {
                        callee: Box::new(expr),
                        arguments,
                        position,
                        flags: Flags::empty(),
                        register_offset: None,
                    });
                }
                TokenKind::Inc => {
                    let position = expr.position();
                    self.bump()?;
                    expr = Expr::Unary(UnaryExpr {
                        op: UnaryOp::PostfixInc,
                        operand: Box::new(expr),
                        position,
                        flags: Flags::empty(),
                        register_offset: None,
                    });
                }
                TokenKind::Dec => {
                    let position = expr.position();
                    self.bump()?;
                    expr = Expr::Unary(UnaryExpr {
                        op: UnaryOp::PostfixDec,
                        operand: Box::new(expr),
                        position,
                        flags: Flags::empty(),
                        register_offset: None,
                    });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let position = self.current.position;
        match self.current.kind.clone() {
            TokenKind::Null => {
                self.bump()?;
                Ok(Self::terminal(TerminalKind::Null, position))
            }
            TokenKind::True => {
                self.bump()?;
                Ok(Self::terminal(TerminalKind::Int(1), position))
            }
            TokenKind::False => {
                self.bump()?;
                Ok(Self::terminal(TerminalKind::Int(0), position))
            }
            TokenKind::Int(v) => {
                self.bump()?;
                Ok(Self::terminal(TerminalKind::Int(v), position))
            }
            TokenKind::Hex(v) => {
                self.bump()?;
                Ok(Self::terminal(TerminalKind::Hex(v), position))
            }
            TokenKind::Float(v) => {
                self.bump()?;
                Ok(Self::terminal(TerminalKind::Float(OrderedFloat(v)), position))
            }
            TokenKind::Str(v) => {
                self.bump()?;
                Ok(Self::terminal(TerminalKind::Str(v), position))
            }
            TokenKind::Identifier(name) => {
                self.bump()?;
                Ok(Self::terminal(TerminalKind::Identifier(name), position))
            }
            TokenKind::LeftParen => {
                self.bump()?;
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::LeftBrace => self.parse_table_literal(TableShape::Unknown, position),
            TokenKind::Table => {
                self.bump()?;
                self.parse_table_literal(TableShape::Table, position)
            }
            TokenKind::Array => {
                self.bump()?;
                self.parse_table_literal(TableShape::Array, position)
            }
            TokenKind::Function => {
                self.bump()?;
                let def = self.parse_function_tail(position)?;
                Ok(Expr::Function(FunctionExpr {
                    def: Box::new(def),
                    position,
                    flags: Flags::empty(),
                    register_offset: None,
                }))
            }
            TokenKind::Yield => Err(ParseError::YieldUnsupported { line: self.line() }),
            _ => Err(ParseError::NotAPrimary { line: self.line(), found: Self::describe(&self.current) }),
        }
    }

    fn terminal(kind: TerminalKind, position: Position) -> Expr {
        Expr::Terminal(TerminalExpr { kind, position, flags: Flags::empty(), register_offset: None, var_kind: None })
    }

    fn parse_table_literal(&mut self, shape: TableShape, position: Position) -> PResult<Expr> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut initializers = Vec::new();
        while !self.at(&TokenKind::RightBrace) {
            let first = self.parse_assignment()?;
            let (key, value) = if self.eat(&TokenKind::Colon)? {
                let value = self.parse_assignment()?;
                (Some(first), value)
            } else {
                (None, first)
            };
            initializers.push(TableInitializer { key, value, flags: Flags::empty() });
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(Expr::TableLit(TableExpr { shape, initializers, position, flags: Flags::empty(), register_offset: None }))
    }

    fn parse_function_tail(&mut self, position: Position) -> PResult<FunctionDefinition> {
        self.expect(&TokenKind::LeftParen)?;
        let mut arguments = Vec::new();
        if !self.at(&TokenKind::RightParen) {
            loop {
                let (name, name_pos) = self.expect_identifier()?;
                arguments.push(VariableStmt {
                    name,
                    init: None,
                    position: name_pos,
                    scope_level: None,
                    function_level: None,
                    register_offset: None,
                });
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_compound()?);
        let function_num = self.function_counter;
        self.function_counter += 1;
        Ok(FunctionDefinition {
            arguments,
            body,
            position,
            upvalues: Vec::new(),
            num_variable: None,
            function_level: None,
            function_num: Some(function_num),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        Parser::new(src).and_then(Parser::parse_program).expect("parse error")
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let program = parse_ok("return 1 + 2 * 3;");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Return(ret) = &stmts[0] else { panic!() };
        let Some(Expr::Binary(add)) = &ret.value else { panic!() };
        assert_eq!(add.op, BinaryOp::Add);
        let Expr::Binary(mul) = add.second.as_ref() else { panic!("rhs should be mul") };
        assert_eq!(mul.op, BinaryOp::Mul);
    }

    #[test]
    fn assignment_is_right_associative_value_first() {
        let program = parse_ok("a = b = 1;");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Expression(Expr::Binary(outer)) = &stmts[0] else { panic!() };
        assert_eq!(outer.op, BinaryOp::Assign);
        // second (destination) of the outer assign is `a`
        let Expr::Terminal(dest) = outer.second.as_ref() else { panic!() };
        assert_eq!(dest.kind, TerminalKind::Identifier("a".into()));
        // first (value) of the outer assign is the inner `b = 1` assignment
        let Expr::Binary(inner) = outer.first.as_ref() else { panic!("value should be nested assign") };
        assert_eq!(inner.op, BinaryOp::Assign);
    }

    #[test]
    fn table_literal_auto_increments_keys_only_at_codegen() {
        let program = parse_ok("return {1, 2, x: 3};");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Return(ret) = &stmts[0] else { panic!() };
        let Some(Expr::TableLit(table)) = &ret.value else { panic!() };
        assert_eq!(table.initializers.len(), 3);
        assert!(table.initializers[0].key.is_none());
        assert!(table.initializers[2].key.is_some());
    }

    #[test]
    fn yield_is_rejected() {
        let err = Parser::new("yield 1;").and_then(Parser::parse_program).unwrap_err();
        assert!(matches!(err, ParseError::YieldUnsupported { .. }));
    }

    #[test]
    fn local_without_identifier_or_function_errors() {
        let err = Parser::new("local 1;").and_then(Parser::parse_program).unwrap_err();
        assert!(matches!(err, ParseError::MalformedLocal { .. }));
    }

    #[test]
    fn function_literal_parses_params_and_body() {
        let program = parse_ok("local f = function(a, b) { return a + b; };");
        let Stmt::Sequence(stmts) = program.top_level.body.as_ref() else { panic!() };
        let Stmt::Variable(v) = &stmts[0] else { panic!() };
        let Some(Expr::Function(f)) = &v.init else { panic!() };
        assert_eq!(f.def.arguments.len(), 2);
    }
}
