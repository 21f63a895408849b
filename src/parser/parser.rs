use crate::error::{ErrorKind, LoxError};
use crate::lexer::{Literal, Token, TokenType};
use crate::parser::ast::{Expr, ExprKind, FunctionDecl, NodeId, Stmt};
use std::rc::Rc;

const MAX_PARAMS: usize = 255;

/*
Recursive-descent parser. The precedence ladder is assignment -> or ->
and -> equality -> comparison -> term -> factor -> unary -> call ->
primary, and each rule gets one method. A rule only ever calls the next
rule down, which is what makes the ladder resolve precedence without an
explicit operator-precedence table.

`Bail` is used internally to unwind a malformed production back to
synchronize(). The actual diagnostic is pushed onto self.errors at the
point of failure, so declaration-level recovery can keep collecting
more errors in one pass over the token stream.
*/

struct Bail;

type PResult<T> = Result<T, Bail>;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    next_id: NodeId,
    errors: Vec<LoxError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            next_id: 0,
            errors: Vec::new(),
        }
    }

    // declaration-level failures synchronize internally (see
    // `declaration`) and keep going, so this can return more than one
    // syntax error from a single run. a statement-level failure instead
    // comes back out of `declaration` unsynced, so it stops the parse
    // here rather than being recovered from.
    pub fn parse(mut self) -> Result<Vec<Stmt>, Vec<LoxError>> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(Bail) => break,
            }
        }
        if self.errors.is_empty() {
            Ok(statements)
        } else {
            Err(self.errors)
        }
    }

    fn next_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr {
            id: self.next_id(),
            kind,
        }
    }

    // ---- declarations -----------------------------------------------

    // only the three declaration-level productions (class/fun/var) ever
    // synchronize and retry here; a bail from `self.statement()` returns
    // straight out, unsynced, per spec.md's "statement-level failures are
    // propagated without sync"
    fn declaration(&mut self) -> PResult<Stmt> {
        loop {
            let result = if self.match_tokens(&[TokenType::Class]) {
                self.class_declaration()
            } else if self.match_tokens(&[TokenType::Fun]) {
                self.function_declaration("function").map(Stmt::Function)
            } else if self.match_tokens(&[TokenType::Var]) {
                self.var_declaration()
            } else {
                return self.statement();
            };

            match result {
                Ok(stmt) => return Ok(stmt),
                Err(Bail) => {
                    self.synchronize();
                    if self.is_at_end() {
                        return Err(Bail);
                    }
                    // try again: parse whatever follows the resync point
                }
            }
        }
    }

    fn class_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            methods.push(self.function_declaration("method")?);
        }

        self.consume(TokenType::RightBrace, "Expect '}' after class body.")?;
        Ok(Stmt::Class { name, methods })
    }

    fn function_declaration(&mut self, kind: &str) -> PResult<Rc<FunctionDecl>> {
        let name = self.consume(TokenType::Identifier, &format!("Expect {} name.", kind))?;
        self.consume(
            TokenType::LeftParen,
            &format!("Expect '(' after {} name.", kind),
        )?;

        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= MAX_PARAMS {
                    let t = self.peek().clone();
                    self.errors.push(LoxError::at(
                        ErrorKind::ParamLimitExceeded,
                        &t,
                        "Can't have more than 255 parameters.",
                    ));
                    return Err(Bail);
                }
                let param = self.advance().clone();
                if param.token_type != TokenType::Identifier {
                    self.errors.push(LoxError::at(
                        ErrorKind::InvalidParamName,
                        &param,
                        format!("Expect parameter name, got '{}'.", param.lexeme),
                    ));
                    return Err(Bail);
                }
                params.push(param);
                if !self.match_tokens(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;

        self.consume(
            TokenType::LeftBrace,
            &format!("Expect '{{' before {} body.", kind),
        )?;
        let body = self.block()?;

        Ok(Rc::new(FunctionDecl { name, params, body }))
    }

    fn var_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;

        let initializer = if self.match_tokens(&[TokenType::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::SemiColon,
            "Expect ';' after variable declaration.",
        )?;
        Ok(Stmt::Var { name, initializer })
    }

    // ---- statements ---------------------------------------------------

    fn statement(&mut self) -> PResult<Stmt> {
        if self.match_tokens(&[TokenType::Print]) {
            return self.print_statement();
        }
        if self.match_tokens(&[TokenType::LeftBrace]) {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.match_tokens(&[TokenType::If]) {
            return self.if_statement();
        }
        if self.match_tokens(&[TokenType::While]) {
            return self.while_statement();
        }
        if self.match_tokens(&[TokenType::For]) {
            return self.for_statement();
        }
        if self.match_tokens(&[TokenType::Return]) {
            return self.return_statement();
        }
        self.expression_statement()
    }

    fn print_statement(&mut self) -> PResult<Stmt> {
        let value = self.expression()?;
        self.consume(TokenType::SemiColon, "Expect ';' after value.")?;
        Ok(Stmt::Print(value))
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenType::SemiColon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::SemiColon, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_tokens(&[TokenType::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after while condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    // desugars into a block containing the initializer, followed by a
    // while whose body is the original body plus the increment. a
    // missing condition becomes a literal true
    fn for_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.match_tokens(&[TokenType::SemiColon]) {
            None
        } else if self.match_tokens(&[TokenType::Var]) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::SemiColon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::SemiColon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(increment)]);
        }

        let condition = condition.unwrap_or_else(|| self.expr(ExprKind::Literal(Literal::Bool(true))));
        body = Stmt::While {
            condition,
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }

        Ok(body)
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenType::SemiColon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression(expr))
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    // ---- expressions ----------------------------------------------------

    fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    // right-associative. the left-hand side is reparsed from the
    // already-built expression: a Variable becomes Assign, a Get
    // becomes Set. anything else is an invalid assignment target
    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.or()?;

        if self.match_tokens(&[TokenType::Equal]) {
            let equals = self.previous().clone();
            let value = self.assignment()?;

            return match expr.kind {
                ExprKind::Variable(name) => Ok(self.expr(ExprKind::Assign {
                    name,
                    value: Box::new(value),
                })),
                ExprKind::Get { object, name } => Ok(self.expr(ExprKind::Set {
                    object,
                    name,
                    value: Box::new(value),
                })),
                _ => {
                    self.errors.push(LoxError::at(
                        ErrorKind::InvalidAssignment,
                        &equals,
                        "Invalid assignment target.",
                    ));
                    Err(Bail)
                }
            };
        }

        Ok(expr)
    }

    fn or(&mut self) -> PResult<Expr> {
        let mut expr = self.and()?;
        while self.match_tokens(&[TokenType::Or]) {
            let operator = self.previous().clone();
            let right = self.and()?;
            expr = self.expr(ExprKind::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn and(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_tokens(&[TokenType::And]) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = self.expr(ExprKind::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;
        while self.match_tokens(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = self.expr(ExprKind::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.term()?;
        while self.match_tokens(&[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let operator = self.previous().clone();
            let right = self.term()?;
            expr = self.expr(ExprKind::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut expr = self.factor()?;
        while self.match_tokens(&[TokenType::Minus, TokenType::Plus]) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = self.expr(ExprKind::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let mut expr = self.unary()?;
        while self.match_tokens(&[TokenType::Slash, TokenType::Star]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = self.expr(ExprKind::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.match_tokens(&[TokenType::Bang, TokenType::Minus]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(self.expr(ExprKind::Unary {
                operator,
                right: Box::new(right),
            }));
        }
        self.call()
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_tokens(&[TokenType::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_tokens(&[TokenType::Dot]) {
                let name = self.consume(TokenType::Identifier, "Expect property name after '.'.")?;
                expr = self.expr(ExprKind::Get {
                    object: Box::new(expr),
                    name,
                });
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let mut arguments = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if arguments.len() >= MAX_PARAMS {
                    let t = self.peek().clone();
                    self.errors.push(LoxError::at(
                        ErrorKind::ArgumentLimitExceeded,
                        &t,
                        "Can't have more than 255 arguments.",
                    ));
                    return Err(Bail);
                }
                arguments.push(self.expression()?);
                if !self.match_tokens(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;
        Ok(self.expr(ExprKind::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        }))
    }

    fn primary(&mut self) -> PResult<Expr> {
        if self.match_tokens(&[TokenType::False]) {
            return Ok(self.expr(ExprKind::Literal(Literal::Bool(false))));
        }
        if self.match_tokens(&[TokenType::True]) {
            return Ok(self.expr(ExprKind::Literal(Literal::Bool(true))));
        }
        if self.match_tokens(&[TokenType::Nil]) {
            return Ok(self.expr(ExprKind::Literal(Literal::Nil)));
        }
        if self.match_tokens(&[TokenType::Number, TokenType::String]) {
            let literal = self.previous().literal.clone();
            return Ok(self.expr(ExprKind::Literal(literal)));
        }
        if self.match_tokens(&[TokenType::This]) {
            let keyword = self.previous().clone();
            return Ok(self.expr(ExprKind::This(keyword)));
        }
        if self.match_tokens(&[TokenType::Identifier]) {
            let name = self.previous().clone();
            return Ok(self.expr(ExprKind::Variable(name)));
        }
        if self.match_tokens(&[TokenType::LeftParen]) {
            let expr = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Ok(self.expr(ExprKind::Grouping(Box::new(expr))));
        }

        let t = self.peek().clone();
        self.errors.push(LoxError::at(
            ErrorKind::UnfinishedExpression,
            &t,
            "Expected an expression.",
        ));
        Err(Bail)
    }

    // ---- token-stream plumbing -----------------------------------------

    fn match_tokens(&mut self, types: &[TokenType]) -> bool {
        for tt in types {
            if self.check(*tt) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: TokenType) -> bool {
        !self.is_at_end() && self.peek().token_type == token_type
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> PResult<Token> {
        if self.check(token_type) {
            return Ok(self.advance().clone());
        }
        let t = self.peek().clone();
        self.errors.push(LoxError::at(ErrorKind::UnfinishedExpression, &t, message));
        Err(Bail)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    // discard tokens until a consumed ';' or a statement-starting
    // keyword, so one bad token doesn't cascade into a wall of errors
    fn synchronize(&mut self) {
        log::warn!("parser: synchronizing after error at line {}", self.peek().line);
        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::SemiColon {
                return;
            }

            match self.peek().token_type {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {}
            }

            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Result<Vec<Stmt>, Vec<LoxError>> {
        let tokens = Lexer::new(src, "<test>").scan_tokens().unwrap();
        Parser::new(tokens).parse()
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let stmts = parse("1 + 2 * 3;").unwrap();
        match &stmts[0] {
            Stmt::Expression(Expr {
                kind: ExprKind::Binary { operator, .. },
                ..
            }) => assert_eq!(operator.token_type, TokenType::Plus),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn for_loop_desugars_to_block_with_while() {
        let stmts = parse("for (var i = 0; i < 3; i = i + 1) print i;").unwrap();
        match &stmts[0] {
            Stmt::Block(inner) => {
                assert!(matches!(inner[0], Stmt::Var { .. }));
                assert!(matches!(inner[1], Stmt::While { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn for_loop_missing_condition_is_literal_true() {
        let stmts = parse("for (;;) print 1;").unwrap();
        match &stmts[0] {
            Stmt::While { condition, .. } => {
                assert_eq!(condition.kind, ExprKind::Literal(Literal::Bool(true)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_assignment_target_is_an_error() {
        let errs = parse("1 = 2;").unwrap_err();
        assert_eq!(errs[0].kind, ErrorKind::InvalidAssignment);
    }

    #[test]
    fn determinism_parsing_twice_yields_equal_trees() {
        let src = "fun f(a, b) { return a + b; } print f(1, 2);";
        let a = parse(src).unwrap();
        let b = parse(src).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn param_limit_is_enforced() {
        let params: Vec<String> = (0..300).map(|i| format!("p{i}")).collect();
        let src = format!("fun f({}) {{}}", params.join(", "));
        let errs = parse(&src).unwrap_err();
        assert!(errs.iter().any(|e| e.kind == ErrorKind::ParamLimitExceeded));
    }

    // two back-to-back malformed `var` declarations: declaration-level
    // failures synchronize and retry, so both get reported from one pass
    #[test]
    fn declaration_level_failures_synchronize_and_collect_both_errors() {
        let errs = parse("var; var;").unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| e.kind == ErrorKind::UnfinishedExpression));
    }

    // a malformed `print` statement fails inside `statement()`, not one of
    // the three declaration productions, so it must propagate without
    // synchronizing: the second print is never even attempted, unlike the
    // declaration-level case above
    #[test]
    fn statement_level_failure_propagates_without_synchronizing() {
        let errs = parse("print 1 + ; print 2 + ;").unwrap_err();
        assert_eq!(errs.len(), 1);
    }
}
