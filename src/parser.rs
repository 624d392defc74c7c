use std::rc::Rc;

use crate::diagnostics::Diagnostics;
use crate::error::ParseError;
use crate::syntax::{Expr, FunctionExpr, Stmt};
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Recursive-descent parser over a finished token stream. On a syntax
/// error it reports through `diagnostics` immediately and returns
/// `ParseError`, a sentinel with nothing further to say; `declaration`
/// catches it and resynchronizes instead of aborting the whole parse.
pub struct Parser<'t, 'd> {
    tokens: &'t [Token],
    current: usize,
    diagnostics: &'d Diagnostics,
}

impl<'t, 'd> Parser<'t, 'd> {
    pub fn new(tokens: &'t [Token], diagnostics: &'d Diagnostics) -> Self {
        Self {
            tokens,
            current: 0,
            diagnostics,
        }
    }

    // program        → declaration* EOF ;
    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        statements
    }

    // declaration    → classDecl | funDecl | varDecl | statement ;
    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_token(TokenType::Var) {
            self.var_declaration()
        } else if self.match_token(TokenType::Class) {
            self.class_declaration()
        } else if self.match_token(TokenType::Fun) {
            self.function_declaration("function")
        } else {
            self.statement()
        };

        match result {
            Ok(statement) => Some(statement),
            Err(ParseError) => {
                self.synchronize();
                None
            }
        }
    }

    // classDecl      → "class" IDENTIFIER ( "<" IDENTIFIER )? "{" IDENTIFIER function_tail* "}" ;
    fn class_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;
        let superclass = if self.match_token(TokenType::Less) {
            let superclass_name = self.consume(TokenType::Identifier, "Expect superclass name.")?;
            Some(Expr::Variable { name: superclass_name })
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            let method_name = self.consume(TokenType::Identifier, "Expect method name.")?;
            methods.push(self.finish_function(Some(method_name), "method")?);
        }

        self.consume(TokenType::RightBrace, "Expect '}' after class body.")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    // funDecl        → "fun" IDENTIFIER function_tail ;
    // A named declaration wraps its FunctionExpr in a bare expression
    // statement — the "trailing-brace rule" means no semicolon is consumed
    // here, since the body's closing '}' already ends the statement.
    fn function_declaration(&mut self, kind: &str) -> Result<Stmt, ParseError> {
        let name = self.consume(TokenType::Identifier, &format!("Expect {kind} name."))?;
        let function = self.finish_function(Some(name), kind)?;
        Ok(Stmt::Expression(Expr::Function(Box::new(function))))
    }

    // function_tail  → "(" parameters? ")" block ;
    // parameters     → IDENTIFIER ( "," IDENTIFIER )* ;
    // Shared by named declarations, methods, and anonymous function
    // expressions — only what happens with the parsed name differs.
    fn finish_function(
        &mut self,
        name: Option<Token>,
        kind: &str,
    ) -> Result<FunctionExpr, ParseError> {
        self.consume(TokenType::LeftParen, &format!("Expect '(' after {kind} name."))?;

        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    self.error(self.peek(), "Can't have more than 255 parameters.");
                }
                params.push(self.consume(TokenType::Identifier, "Expect parameter name.")?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;
        self.consume(
            TokenType::LeftBrace,
            &format!("Expect '{{' before {kind} body."),
        )?;
        let body = self.block()?;

        Ok(FunctionExpr {
            name,
            params,
            body: Rc::from(body),
        })
    }

    // statement → forStmt | ifStmt | printStmt | returnStmt | whileStmt
    //           | breakStmt | continueStmt | block | exprStmt ;
    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.match_token(TokenType::For) {
            self.for_statement()
        } else if self.match_token(TokenType::If) {
            self.if_statement()
        } else if self.match_token(TokenType::Print) {
            self.print_statement()
        } else if self.match_token(TokenType::Return) {
            self.return_statement()
        } else if self.match_token(TokenType::While) {
            self.while_statement()
        } else if self.match_token(TokenType::Break) {
            self.break_statement()
        } else if self.match_token(TokenType::Continue) {
            self.continue_statement()
        } else if self.match_token(TokenType::LeftBrace) {
            Ok(Stmt::Block(self.block()?))
        } else {
            self.expression_statement()
        }
    }

    // breakStmt      → "break" ";" ;
    fn break_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        self.consume(TokenType::Semicolon, "Expect ';' after 'break'.")?;
        Ok(Stmt::Break(keyword))
    }

    // continueStmt   → "continue" ";" ;
    fn continue_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        self.consume(TokenType::Semicolon, "Expect ';' after 'continue'.")?;
        Ok(Stmt::Continue(keyword))
    }

    // returnStmt     → "return" expression? ";" ;
    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    // ifStmt         → "if" "(" expression ")" statement ( "else" statement )? ;
    // The else is bound to the nearest preceding if, matching the grammar's
    // own recursive-descent shape.
    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_token(TokenType::Else) {
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

    // block          → "{" declaration* "}" ;
    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    // whileStmt      → "while" "(" expression ")" statement ;
    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);

        Ok(Stmt::Loop {
            condition,
            body,
            increment: None,
        })
    }

    // forStmt → "for" "(" ( varDecl | exprStmt | ";" )
    //                 expression? ";" expression? ")" statement ;
    // Desugars to a `Stmt::Loop`, but keeps the increment on the node's own
    // `increment` field rather than appending it into the body — required
    // for `continue` to still run it (see crate::interpreter::execute_loop).
    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.match_token(TokenType::Semicolon) {
            None
        } else if self.match_token(TokenType::Var) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::Semicolon) {
            self.expression()?
        } else {
            Expr::Literal(Value::Bool(true))
        };
        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let body = Box::new(self.statement()?);
        let loop_stmt = Stmt::Loop {
            condition,
            body,
            increment,
        };

        Ok(match initializer {
            Some(init) => Stmt::Block(vec![init, loop_stmt]),
            None => loop_stmt,
        })
    }

    // varDecl        → "var" IDENTIFIER ( "=" expression )? ";" ;
    fn var_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;
        let initializer = if self.match_token(TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        )?;
        Ok(Stmt::Var { name, initializer })
    }

    // printStmt      → "print" expression ";" ;
    fn print_statement(&mut self) -> Result<Stmt, ParseError> {
        let value = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print(value))
    }

    // exprStmt       → expression ";" ;
    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression(expr))
    }

    // expression     → assignment ;
    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    // assignment     → ( call "." )? IDENTIFIER "=" assignment | logic_or ;
    // The left side is parsed as an ordinary expression first, then
    // reinterpreted as an assignment target if "=" follows — every valid
    // target also happens to parse as a normal expression.
    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.or()?;

        if self.match_token(TokenType::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment()?;

            return match expr {
                Expr::Variable { name } => Ok(Expr::Assign {
                    name,
                    value: Box::new(value),
                }),
                Expr::Get { object, name } => Ok(Expr::Set {
                    object,
                    name,
                    value: Box::new(value),
                }),
                other => {
                    self.error(&equals, "Invalid assignment target.");
                    Ok(other)
                }
            };
        }

        Ok(expr)
    }

    // logic_or       → logic_and ( "or" logic_and )* ;
    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.and()?;
        while self.match_token(TokenType::Or) {
            let operator = self.previous().clone();
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // logic_and      → equality ( "and" equality )* ;
    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.equality()?;
        while self.match_token(TokenType::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // equality       → comparison ( ( "!=" | "==" ) comparison )* ;
    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.comparison()?;
        while self.match_any(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // comparison     → term ( ( ">" | ">=" | "<" | "<=" ) term )* ;
    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.term()?;
        while self.match_any(&[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let operator = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // term           → factor ( ( "-" | "+" ) factor )* ;
    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.factor()?;
        while self.match_any(&[TokenType::Minus, TokenType::Plus]) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // factor         → unary ( ( "/" | "*" ) unary )* ;
    fn factor(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;
        while self.match_any(&[TokenType::Slash, TokenType::Star]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    // unary          → ( "!" | "-" ) unary | call ;
    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_any(&[TokenType::Bang, TokenType::Minus]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }
        self.call()
    }

    // call           → primary ( "(" arguments? ")" | "." IDENTIFIER )* ;
    fn call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.match_token(TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_token(TokenType::Dot) {
                let name = self.consume(TokenType::Identifier, "Expect property name after '.'.")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    // arguments      → expression ( "," expression )* ;
    fn finish_call(&mut self, callee: Expr) -> Result<Expr, ParseError> {
        let mut arguments = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if arguments.len() >= 255 {
                    self.error(self.peek(), "Can't have more than 255 arguments.");
                }
                arguments.push(self.expression()?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    // primary → NUMBER | STRING | "true" | "false" | "nil" | "this"
    //         | "(" expression ")" | IDENTIFIER | "super" "." IDENTIFIER
    //         | "fun" function_tail ;
    fn primary(&mut self) -> Result<Expr, ParseError> {
        if self.match_token(TokenType::False) {
            return Ok(Expr::Literal(Value::Bool(false)));
        }
        if self.match_token(TokenType::True) {
            return Ok(Expr::Literal(Value::Bool(true)));
        }
        if self.match_token(TokenType::Nil) {
            return Ok(Expr::Literal(Value::Nil));
        }
        if self.match_any(&[TokenType::Number, TokenType::String]) {
            let literal = self
                .previous()
                .literal
                .clone()
                .expect("the scanner always attaches a literal to Number/String tokens");
            return Ok(Expr::Literal(literal));
        }
        if self.match_token(TokenType::Super) {
            let keyword = self.previous().clone();
            self.consume(TokenType::Dot, "Expect '.' after 'super'.")?;
            let method = self.consume(TokenType::Identifier, "Expect superclass method name.")?;
            return Ok(Expr::Super { keyword, method });
        }
        if self.match_token(TokenType::This) {
            return Ok(Expr::This {
                keyword: self.previous().clone(),
            });
        }
        if self.match_token(TokenType::Identifier) {
            return Ok(Expr::Variable {
                name: self.previous().clone(),
            });
        }
        if self.match_token(TokenType::Fun) {
            let name = if self.check(TokenType::Identifier) {
                Some(self.advance().clone())
            } else {
                None
            };
            let function = self.finish_function(name, "function")?;
            return Ok(Expr::Function(Box::new(function)));
        }
        if self.match_token(TokenType::LeftParen) {
            let expr = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Ok(Expr::Grouping {
                expression: Box::new(expr),
            });
        }

        Err(self.error(self.peek(), "Expect expression."))
    }

    // Discards tokens until it finds a likely statement boundary, so one
    // syntax error doesn't cascade into a wall of spurious follow-on ones.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
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
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, types: &[TokenType]) -> bool {
        for &token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: TokenType) -> bool {
        !self.is_at_end() && self.peek().token_type == token_type
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

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<Token, ParseError> {
        if self.check(token_type) {
            Ok(self.advance().clone())
        } else {
            Err(self.error(self.peek(), message))
        }
    }

    fn error(&self, token: &Token, message: &str) -> ParseError {
        self.diagnostics.token_error(token, message);
        ParseError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;

    fn parse(source: &str) -> (Vec<Stmt>, Diagnostics) {
        let diagnostics = Diagnostics::new();
        let tokens = Scanner::new(source, &diagnostics).scan_tokens();
        let statements = Parser::new(&tokens, &diagnostics).parse();
        (statements, diagnostics)
    }

    #[test]
    fn for_loop_desugars_to_a_block_wrapping_a_loop_with_increment_on_the_node() {
        let (statements, diagnostics) =
            parse("for (var i = 0; i < 3; i = i + 1) print i;");
        assert!(!diagnostics.had_error());
        assert_eq!(statements.len(), 1);
        match &statements[0] {
            Stmt::Block(inner) => {
                assert_eq!(inner.len(), 2);
                assert!(matches!(inner[0], Stmt::Var { .. }));
                match &inner[1] {
                    Stmt::Loop { increment, .. } => {
                        assert!(increment.is_some(), "increment must live on the Loop node");
                    }
                    other => panic!("expected Stmt::Loop, got {other:?}"),
                }
            }
            other => panic!("expected Stmt::Block, got {other:?}"),
        }
    }

    #[test]
    fn for_loop_without_initializer_is_a_bare_loop() {
        let (statements, diagnostics) = parse("for (; true;) break;");
        assert!(!diagnostics.had_error());
        assert_eq!(statements.len(), 1);
        assert!(matches!(statements[0], Stmt::Loop { .. }));
    }

    #[test]
    fn assignment_to_a_get_expression_produces_a_set_node() {
        let (statements, diagnostics) = parse("a.b = 1;");
        assert!(!diagnostics.had_error());
        match &statements[0] {
            Stmt::Expression(Expr::Set { .. }) => {}
            other => panic!("expected Expr::Set, got {other:?}"),
        }
    }

    #[test]
    fn invalid_assignment_target_reports_but_keeps_parsing() {
        let (statements, diagnostics) = parse("1 = 2;");
        assert!(diagnostics.had_error());
        // Parsing recovers and still yields a statement for the rest.
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn more_than_255_parameters_is_a_non_fatal_diagnostic() {
        let params = (0..300)
            .map(|i| format!("p{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let source = format!("fun f({params}) {{}}");
        let (statements, diagnostics) = parse(&source);
        assert!(diagnostics.had_error());
        // The function is still fully parsed despite the diagnostic.
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn anonymous_function_expression_parses_as_expr_function() {
        let (statements, diagnostics) = parse("var f = fun (a, b) { return a + b; };");
        assert!(!diagnostics.had_error());
        match &statements[0] {
            Stmt::Var {
                initializer: Some(Expr::Function(func)),
                ..
            } => {
                assert!(func.name.is_none());
                assert_eq!(func.params.len(), 2);
            }
            other => panic!("expected Var with a Function initializer, got {other:?}"),
        }
    }

    #[test]
    fn named_function_expression_in_non_statement_position_parses_its_name() {
        let (statements, diagnostics) =
            parse("var fact = fun factorial(n) { return n; };");
        assert!(!diagnostics.had_error());
        match &statements[0] {
            Stmt::Var {
                initializer: Some(Expr::Function(func)),
                ..
            } => {
                assert_eq!(func.name.as_ref().map(|t| &*t.lexeme), Some("factorial"));
                assert_eq!(func.params.len(), 1);
            }
            other => panic!("expected Var with a named Function initializer, got {other:?}"),
        }
    }

    #[test]
    fn class_with_superclass_parses_methods_and_superclass_variable() {
        let (statements, diagnostics) =
            parse("class B < A { init() {} greet() { print 1; } }");
        assert!(!diagnostics.had_error());
        match &statements[0] {
            Stmt::Class {
                superclass, methods, ..
            } => {
                assert!(matches!(superclass, Some(Expr::Variable { .. })));
                assert_eq!(methods.len(), 2);
            }
            other => panic!("expected Stmt::Class, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_block_reports_a_parse_error() {
        let (_, diagnostics) = parse("{ var a = 1;");
        assert!(diagnostics.had_error());
    }

    #[test]
    fn synchronize_recovers_after_a_bad_statement() {
        // The first statement is garbage; the second should still parse.
        let (statements, diagnostics) = parse("var ; print 1;");
        assert!(diagnostics.had_error());
        assert_eq!(statements.len(), 1);
        assert!(matches!(statements[0], Stmt::Print(_)));
    }
}
