//! Token stream → AST, with panic-mode error recovery (spec §4.2).

use crate::ast::*;
use crate::error::ParseErrorDetail;
use crate::token::{LiteralValue, Token, TokenKind};

#[derive(Debug)]
struct ParseError;

type PResult<T> = Result<T, ParseError>;

/// Recursive-descent, precedence-climbing parser over a token stream.
///
/// On a bad token it records a diagnostic, synchronizes to the next
/// statement boundary, and keeps going, so one typo doesn't hide every other
/// syntax error in a file (spec §4.2). The module loader is the one that
/// decides a non-empty error list means the whole file is unusable.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<ParseErrorDetail>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    /// Parse a whole program: a sequence of top-level declarations.
    pub fn parse(mut self) -> Result<Vec<Stmt>, Vec<ParseErrorDetail>> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(ParseError) => self.synchronize(),
            }
        }

        if self.errors.is_empty() {
            Ok(statements)
        } else {
            Err(self.errors)
        }
    }

    // ---- token stream primitives ----------------------------------------

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn match_token(&mut self, kinds: &[TokenKind]) -> bool {
        for kind in kinds {
            if self.check(*kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(message))
        }
    }

    fn error(&mut self, message: &str) -> ParseError {
        let token = self.peek();
        let detail = if token.kind == TokenKind::Eof {
            ParseErrorDetail {
                line: token.line,
                message: format!("at end: {message}"),
            }
        } else {
            ParseErrorDetail {
                line: token.line,
                message: format!("at '{}': {message}", token.lexeme),
            }
        };
        self.errors.push(detail);
        ParseError
    }

    /// Advance to the next probable statement boundary after an error.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }

            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Dollar
                | TokenKind::At
                | TokenKind::Var
                | TokenKind::Percent
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return
                | TokenKind::Import
                | TokenKind::Export => return,
                _ => {}
            }

            self.advance();
        }
    }

    // ---- declarations ------------------------------------------------------

    fn declaration(&mut self) -> PResult<Stmt> {
        if self.match_token(&[TokenKind::Export]) {
            return self.export_declaration();
        }
        if self.match_token(&[TokenKind::Import]) {
            return self.import_declaration();
        }
        if self.match_token(&[TokenKind::Class]) {
            return self.class_declaration();
        }
        if self.check(TokenKind::Dollar) {
            self.advance();
            return self.function_declaration().map(Stmt::Function);
        }
        if self.match_token(&[TokenKind::Percent]) {
            return self.type_alias_declaration();
        }
        if self.check(TokenKind::At) || self.check(TokenKind::Var) {
            return self.var_declaration();
        }
        self.statement()
    }

    fn export_declaration(&mut self) -> PResult<Stmt> {
        if self.check(TokenKind::Identifier) && self.peek_next_is_semicolon_ident() {
            let name = self.advance();
            self.consume(TokenKind::Semicolon, "expect ';' after exported name")?;
            return Ok(Stmt::ExportIdentifier(name));
        }
        let inner = self.declaration()?;
        Ok(Stmt::Export(Box::new(inner)))
    }

    /// Lookahead used only to disambiguate `export name;` from `export $ f() {}`.
    fn peek_next_is_semicolon_ident(&self) -> bool {
        self.tokens
            .get(self.current + 1)
            .map(|t| t.kind == TokenKind::Semicolon)
            .unwrap_or(false)
    }

    fn import_declaration(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();

        let names = if self.match_token(&[TokenKind::LeftBrace]) {
            let mut names = Vec::new();
            if !self.check(TokenKind::RightBrace) {
                loop {
                    names.push(self.consume(TokenKind::Identifier, "expect imported name")?);
                    if !self.match_token(&[TokenKind::Comma]) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightBrace, "expect '}' after import names")?;
            self.consume(TokenKind::From, "expect 'from' after import names")?;
            Some(names)
        } else {
            None
        };

        let module_tok = self.consume(TokenKind::String, "expect module path string")?;
        let module = match module_tok.literal {
            Some(LiteralValue::Str(s)) => s,
            _ => module_tok.lexeme.clone(),
        };
        self.consume(TokenKind::Semicolon, "expect ';' after import")?;

        Ok(Stmt::Import {
            module,
            names,
            keyword,
        })
    }

    fn class_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "expect class name")?;
        let type_params = self.type_params()?;
        self.consume(TokenKind::LeftBrace, "expect '{' before class body")?;

        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            self.consume(TokenKind::Dollar, "expect '$' before method")?;
            let mut method = self.function_declaration()?;
            if method.name.lexeme == "init" {
                rewrite_bare_assignments_to_this(&mut method.body);
            }
            methods.push(method);
        }
        self.consume(TokenKind::RightBrace, "expect '}' after class body")?;

        Ok(Stmt::Class {
            name,
            type_params,
            methods,
        })
    }

    fn type_params(&mut self) -> PResult<Vec<TypeParam>> {
        if !self.match_token(&[TokenKind::Less]) {
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        if !self.check(TokenKind::Greater) {
            loop {
                let name = self.consume(TokenKind::Identifier, "expect type parameter name")?;
                let constraint = if self.match_token(&[TokenKind::Colon]) {
                    Some(self.type_expr()?)
                } else {
                    None
                };
                params.push(TypeParam {
                    name: name.lexeme,
                    constraint,
                });
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::Greater, "expect '>' after type parameters")?;
        Ok(params)
    }

    fn function_declaration(&mut self) -> PResult<FunctionDecl> {
        let name = self.consume(TokenKind::Identifier, "expect function name")?;
        let type_params = self.type_params()?;
        self.consume(TokenKind::LeftParen, "expect '(' after function name")?;
        let params = self.param_list()?;
        self.consume(TokenKind::RightParen, "expect ')' after parameters")?;

        let return_type = if self.match_token(&[TokenKind::Colon]) {
            Some(self.type_expr()?)
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "expect '{' before function body")?;
        let body = self.block()?;

        Ok(FunctionDecl {
            name,
            type_params,
            params,
            return_type,
            body,
        })
    }

    fn param_list(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                let name = self.consume(TokenKind::Identifier, "expect parameter name")?;
                let type_ann = if self.match_token(&[TokenKind::Colon]) {
                    Some(self.type_expr()?)
                } else {
                    None
                };
                params.push(Param {
                    name: name.lexeme,
                    type_ann,
                });
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        Ok(params)
    }

    fn type_alias_declaration(&mut self) -> PResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "expect type alias name")?;
        self.consume(TokenKind::Eq, "expect '=' in type alias")?;
        let type_ann = self.type_expr()?;
        self.consume(TokenKind::Semicolon, "expect ';' after type alias")?;
        Ok(Stmt::TypeAlias { name, type_ann })
    }

    fn var_declaration(&mut self) -> PResult<Stmt> {
        let immutable = self.match_token(&[TokenKind::At]);
        if immutable {
            self.consume(TokenKind::Immut, "expect 'immut' after '@'")?;
        } else {
            self.consume(TokenKind::Var, "expect 'var'")?;
        }

        let name = self.consume(TokenKind::Identifier, "expect variable name")?;
        let type_ann = if self.match_token(&[TokenKind::Colon]) {
            Some(self.type_expr()?)
        } else {
            None
        };
        let init = if self.match_token(&[TokenKind::Eq]) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "expect ';' after variable declaration")?;

        Ok(Stmt::Var {
            name,
            type_ann,
            init,
            immutable,
        })
    }

    // ---- statements --------------------------------------------------------

    fn statement(&mut self) -> PResult<Stmt> {
        if self.match_token(&[TokenKind::If]) {
            return self.if_statement();
        }
        if self.match_token(&[TokenKind::While]) {
            return self.while_statement();
        }
        if self.match_token(&[TokenKind::For]) {
            return self.for_statement();
        }
        if self.match_token(&[TokenKind::Return]) {
            return self.return_statement();
        }
        if self.match_token(&[TokenKind::Throw]) {
            return self.throw_statement();
        }
        if self.match_token(&[TokenKind::Try]) {
            return self.try_statement();
        }
        if self.match_token(&[TokenKind::LeftBrace]) {
            return Ok(Stmt::Block(self.block()?));
        }
        self.expression_statement()
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(ParseError) => self.synchronize(),
            }
        }
        self.consume(TokenKind::RightBrace, "expect '}' after block")?;
        Ok(statements)
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftParen, "expect '(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "expect ')' after if condition")?;

        self.consume(TokenKind::LeftBrace, "expect '{' for if body")?;
        let then_branch = Box::new(Stmt::Block(self.block()?));

        let else_branch = if self.match_token(&[TokenKind::Else]) {
            if self.match_token(&[TokenKind::If]) {
                Some(Box::new(self.if_statement()?))
            } else {
                self.consume(TokenKind::LeftBrace, "expect '{' for else body")?;
                Some(Box::new(Stmt::Block(self.block()?)))
            }
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
        self.consume(TokenKind::LeftParen, "expect '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "expect ')' after while condition")?;
        self.consume(TokenKind::LeftBrace, "expect '{' for while body")?;
        let body = Box::new(Stmt::Block(self.block()?));
        Ok(Stmt::While { condition, body })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftParen, "expect '(' after 'for'")?;
        let var = self.consume(TokenKind::Identifier, "expect loop variable name")?;
        self.consume(TokenKind::In, "expect 'in' in for loop")?;
        let iterable = self.expression()?;
        self.consume(TokenKind::RightParen, "expect ')' after for clause")?;
        self.consume(TokenKind::LeftBrace, "expect '{' for loop body")?;
        let body = Box::new(Stmt::Block(self.block()?));
        Ok(Stmt::For {
            var,
            iterable,
            body,
        })
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "expect ';' after return value")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn throw_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();
        let value = self.expression()?;
        self.consume(TokenKind::Semicolon, "expect ';' after throw value")?;
        Ok(Stmt::Throw { keyword, value })
    }

    fn try_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenKind::LeftBrace, "expect '{' after 'try'")?;
        let try_block = Box::new(Stmt::Block(self.block()?));

        self.consume(TokenKind::Catch, "expect 'catch' after try block")?;
        let catch_var = if self.match_token(&[TokenKind::LeftParen]) {
            let name = if self.check(TokenKind::Identifier) {
                Some(self.advance())
            } else {
                None
            };
            self.consume(TokenKind::RightParen, "expect ')' after catch binding")?;
            name
        } else {
            None
        };
        self.consume(TokenKind::LeftBrace, "expect '{' after catch")?;
        let catch_block = Box::new(Stmt::Block(self.block()?));

        Ok(Stmt::TryCatch {
            try_block,
            catch_var,
            catch_block,
        })
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenKind::Semicolon, "expect ';' after expression")?;
        Ok(Stmt::Expression(expr))
    }

    // ---- expressions, low to high precedence --------------------------------

    fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.null_coalescing()?;

        let compound = [
            TokenKind::PlusEqual,
            TokenKind::MinusEqual,
            TokenKind::StarEqual,
            TokenKind::SlashEqual,
            TokenKind::PercentEqual,
        ];

        if self.check(TokenKind::Eq) || compound.iter().any(|k| self.check(*k)) {
            let op_token = self.advance();
            let value = self.assignment()?;

            let value = if op_token.kind == TokenKind::Eq {
                value
            } else {
                let binary_op = strip_compound(&op_token);
                Expr::Binary {
                    left: Box::new(expr.clone()),
                    operator: binary_op,
                    right: Box::new(value),
                }
            };

            return match expr {
                Expr::Variable(name) => Ok(Expr::Assign {
                    name,
                    value: Box::new(value),
                }),
                Expr::Get { object, name } => Ok(Expr::Set {
                    object,
                    name,
                    value: Box::new(value),
                }),
                Expr::Index {
                    object,
                    bracket,
                    index,
                } => Ok(Expr::IndexSet {
                    object,
                    bracket,
                    index,
                    value: Box::new(value),
                }),
                _ => Err(self.error("invalid assignment target")),
            };
        }

        Ok(expr)
    }

    fn null_coalescing(&mut self) -> PResult<Expr> {
        let mut expr = self.or_expr()?;
        while self.check(TokenKind::QuestionQuestion) {
            let operator = self.advance();
            let right = self.or_expr()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.and_expr()?;
        while self.check(TokenKind::OrOr) || self.check(TokenKind::Or) {
            let operator = self.advance();
            let right = self.and_expr()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.match_expr()?;
        while self.check(TokenKind::AndAnd) || self.check(TokenKind::And) {
            let operator = self.advance();
            let right = self.match_expr()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn match_expr(&mut self) -> PResult<Expr> {
        if !self.check(TokenKind::Match) {
            return self.equality();
        }
        let keyword = self.advance();
        self.consume(TokenKind::LeftParen, "expect '(' after 'match'")?;
        let subject = Box::new(self.expression()?);
        self.consume(TokenKind::RightParen, "expect ')' after match subject")?;
        self.consume(TokenKind::LeftBrace, "expect '{' before match cases")?;

        let mut cases = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            cases.push(self.match_case()?);
        }
        self.consume(TokenKind::RightBrace, "expect '}' after match cases")?;

        Ok(Expr::Match {
            subject,
            cases,
            keyword,
        })
    }

    fn match_case(&mut self) -> PResult<MatchCase> {
        let pattern = self.pattern()?;
        let guard = if self.match_token(&[TokenKind::If]) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Arrow, "expect '=>' after match pattern")?;

        let body = if self.check(TokenKind::LeftBrace) {
            self.advance();
            MatchBody::Block(self.block()?)
        } else {
            MatchBody::Expr(Box::new(self.expression()?))
        };

        self.match_token(&[TokenKind::Comma]);

        Ok(MatchCase {
            pattern,
            guard,
            body,
        })
    }

    fn pattern(&mut self) -> PResult<Pattern> {
        if self.match_token(&[TokenKind::Underscore]) {
            return Ok(Pattern::Wildcard);
        }
        if self.check(TokenKind::Identifier)
            && (self.peek().lexeme == "Ok" || self.peek().lexeme == "Err")
        {
            let is_ok = self.peek().lexeme == "Ok";
            self.advance();
            self.consume(TokenKind::LeftParen, "expect '(' after Ok/Err pattern")?;
            let binding = self.consume(TokenKind::Identifier, "expect bound name")?;
            self.consume(TokenKind::RightParen, "expect ')' after pattern binding")?;
            return Ok(if is_ok {
                Pattern::Ok(binding.lexeme)
            } else {
                Pattern::Err(binding.lexeme)
            });
        }
        if self.check(TokenKind::Identifier) {
            let name = self.advance();
            return Ok(Pattern::Binding(name.lexeme));
        }
        self.literal_pattern()
    }

    fn literal_pattern(&mut self) -> PResult<Pattern> {
        if self.match_token(&[TokenKind::True]) {
            return Ok(Pattern::Literal(Literal::Bool(true)));
        }
        if self.match_token(&[TokenKind::False]) {
            return Ok(Pattern::Literal(Literal::Bool(false)));
        }
        if self.match_token(&[TokenKind::Null]) {
            return Ok(Pattern::Literal(Literal::Null));
        }
        if self.check(TokenKind::Number) {
            let tok = self.advance();
            let LiteralValue::Number(n) = tok.literal.unwrap() else {
                unreachable!()
            };
            return Ok(Pattern::Literal(Literal::Number(n)));
        }
        if self.check(TokenKind::String) {
            let tok = self.advance();
            let LiteralValue::Str(s) = tok.literal.unwrap() else {
                unreachable!()
            };
            return Ok(Pattern::Literal(Literal::Str(s)));
        }
        if self.match_token(&[TokenKind::Minus]) {
            if self.check(TokenKind::Number) {
                let tok = self.advance();
                let LiteralValue::Number(n) = tok.literal.unwrap() else {
                    unreachable!()
                };
                return Ok(Pattern::Literal(Literal::Number(-n)));
            }
        }
        Err(self.error("expected a pattern"))
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;
        while self.check(TokenKind::BangEqual) || self.check(TokenKind::EqEqual) {
            let operator = self.advance();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.additive()?;
        while matches!(
            self.peek().kind,
            TokenKind::Greater | TokenKind::GreaterEqual | TokenKind::Less | TokenKind::LessEqual
        ) {
            let operator = self.advance();
            let right = self.additive()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut expr = self.multiplicative()?;
        while matches!(self.peek().kind, TokenKind::Plus | TokenKind::Minus) {
            let operator = self.advance();
            let right = self.multiplicative()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut expr = self.power()?;
        while matches!(
            self.peek().kind,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent
        ) {
            let operator = self.advance();
            let right = self.power()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    /// Right-associative: `2 ** 3 ** 2` is `2 ** (3 ** 2)`.
    fn power(&mut self) -> PResult<Expr> {
        let expr = self.unary()?;
        if self.check(TokenKind::StarStar) {
            let operator = self.advance();
            let right = self.power()?;
            return Ok(Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if matches!(self.peek().kind, TokenKind::Bang | TokenKind::Minus) {
            let operator = self.advance();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }
        self.call()
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(&[TokenKind::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_token(&[TokenKind::Dot]) {
                let name = self.consume(TokenKind::Identifier, "expect property name after '.'")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else if self.match_token(&[TokenKind::LeftBracket]) {
                expr = self.finish_index(expr)?;
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenKind::RightParen, "expect ')' after arguments")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
        })
    }

    fn finish_index(&mut self, object: Expr) -> PResult<Expr> {
        let bracket = self.previous().clone();

        if self.check(TokenKind::Colon) {
            self.advance();
            let end = if self.check(TokenKind::RightBracket) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            self.consume(TokenKind::RightBracket, "expect ']' after slice")?;
            return Ok(Expr::Slice {
                object: Box::new(object),
                bracket,
                start: None,
                end,
            });
        }

        let first = self.expression()?;

        if self.match_token(&[TokenKind::Colon]) {
            let end = if self.check(TokenKind::RightBracket) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            self.consume(TokenKind::RightBracket, "expect ']' after slice")?;
            return Ok(Expr::Slice {
                object: Box::new(object),
                bracket,
                start: Some(Box::new(first)),
                end,
            });
        }

        self.consume(TokenKind::RightBracket, "expect ']' after index")?;
        Ok(Expr::Index {
            object: Box::new(object),
            bracket,
            index: Box::new(first),
        })
    }

    fn primary(&mut self) -> PResult<Expr> {
        if self.match_token(&[TokenKind::False]) {
            return Ok(Expr::Literal(Literal::Bool(false)));
        }
        if self.match_token(&[TokenKind::True]) {
            return Ok(Expr::Literal(Literal::Bool(true)));
        }
        if self.match_token(&[TokenKind::Null]) {
            return Ok(Expr::Literal(Literal::Null));
        }
        if self.check(TokenKind::Number) {
            let tok = self.advance();
            let LiteralValue::Number(n) = tok.literal.unwrap() else {
                unreachable!()
            };
            return Ok(Expr::Literal(Literal::Number(n)));
        }
        if self.check(TokenKind::String) {
            let tok = self.advance();
            let LiteralValue::Str(s) = tok.literal.unwrap() else {
                unreachable!()
            };
            return Ok(Expr::Literal(Literal::Str(s)));
        }
        if self.match_token(&[TokenKind::This]) {
            return Ok(Expr::This(self.previous().clone()));
        }
        if self.check(TokenKind::Dollar) {
            return self.lambda();
        }
        if self.match_token(&[TokenKind::LeftBracket]) {
            return self.list_literal();
        }
        if self.match_token(&[TokenKind::LeftBrace]) {
            return self.dict_literal();
        }
        if matches!(
            self.peek().kind,
            TokenKind::TString
                | TokenKind::TNumber
                | TokenKind::TBoolean
                | TokenKind::TNull
                | TokenKind::TAny
                | TokenKind::TVoid
                | TokenKind::TArray
                | TokenKind::TFunction
        ) {
            return Ok(Expr::TypeExpr(self.type_expr()?));
        }
        if self.check(TokenKind::Identifier) {
            return Ok(Expr::Variable(self.advance()));
        }
        if self.match_token(&[TokenKind::LeftParen]) {
            let expr = self.expression()?;
            self.consume(TokenKind::RightParen, "expect ')' after expression")?;
            return Ok(Expr::Grouping(Box::new(expr)));
        }

        Err(self.error("expected an expression"))
    }

    fn lambda(&mut self) -> PResult<Expr> {
        self.consume(TokenKind::Dollar, "expect '$' before lambda parameters")?;
        self.consume(TokenKind::LeftParen, "expect '(' after '$'")?;
        let params = self.param_list()?;
        self.consume(TokenKind::RightParen, "expect ')' after lambda parameters")?;

        let return_type = if self.match_token(&[TokenKind::Colon]) {
            Some(self.type_expr()?)
        } else {
            None
        };

        self.consume(TokenKind::Arrow, "expect '=>' after lambda parameters")?;

        let body = if self.match_token(&[TokenKind::LeftBrace]) {
            LambdaBody::Block(self.block()?)
        } else {
            LambdaBody::Expr(self.expression()?)
        };

        Ok(Expr::Lambda {
            params,
            return_type,
            body: std::rc::Rc::new(body),
        })
    }

    fn list_literal(&mut self) -> PResult<Expr> {
        let mut items = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                items.push(self.expression()?);
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBracket, "expect ']' after list literal")?;
        Ok(Expr::ListExpr(items))
    }

    fn dict_literal(&mut self) -> PResult<Expr> {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        if !self.check(TokenKind::RightBrace) {
            loop {
                keys.push(self.expression()?);
                self.consume(TokenKind::Colon, "expect ':' after dictionary key")?;
                values.push(self.expression()?);
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBrace, "expect '}' after dictionary literal")?;
        Ok(Expr::Dict { keys, values })
    }

    // ---- type expressions ---------------------------------------------------

    fn type_expr(&mut self) -> PResult<TypeExpr> {
        let base = if self.match_token(&[TokenKind::TArray]) {
            self.consume(TokenKind::Less, "expect '<' after Array")?;
            let elem = self.type_expr()?;
            self.consume(TokenKind::Greater, "expect '>' after Array element type")?;
            TypeExpr::Array(Box::new(elem))
        } else if self.match_token(&[TokenKind::TFunction]) {
            self.consume(TokenKind::LeftParen, "expect '(' after Function")?;
            let mut params = Vec::new();
            if !self.check(TokenKind::RightParen) {
                loop {
                    params.push(self.type_expr()?);
                    if !self.match_token(&[TokenKind::Comma]) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightParen, "expect ')' after Function parameters")?;
            self.consume(TokenKind::Arrow, "expect '->' before Function return type")?;
            let ret = self.type_expr()?;
            TypeExpr::Function(params, Box::new(ret))
        } else {
            let name = self.type_name()?;
            if self.match_token(&[TokenKind::Less]) {
                let mut args = Vec::new();
                loop {
                    args.push(self.type_expr()?);
                    if !self.match_token(&[TokenKind::Comma]) {
                        break;
                    }
                }
                self.consume(TokenKind::Greater, "expect '>' after type arguments")?;
                TypeExpr::Generic(name, args)
            } else {
                TypeExpr::Named(name)
            }
        };

        // `T[]` array sugar.
        if self.match_token(&[TokenKind::LeftBracket]) {
            self.consume(TokenKind::RightBracket, "expect ']' after array type")?;
            return Ok(TypeExpr::Array(Box::new(base)));
        }

        Ok(base)
    }

    fn type_name(&mut self) -> PResult<String> {
        if self.match_token(&[TokenKind::TString]) {
            return Ok("string".to_string());
        }
        if self.match_token(&[TokenKind::TNumber]) {
            return Ok("number".to_string());
        }
        if self.match_token(&[TokenKind::TBoolean]) {
            return Ok("boolean".to_string());
        }
        if self.match_token(&[TokenKind::TNull]) {
            return Ok("null".to_string());
        }
        if self.match_token(&[TokenKind::TAny]) {
            return Ok("any".to_string());
        }
        if self.match_token(&[TokenKind::TVoid]) {
            return Ok("void".to_string());
        }
        let name = self.consume(TokenKind::Identifier, "expect a type name")?;
        Ok(name.lexeme)
    }
}

/// `+= -= *= /= %=` desugar to a binary op token of the corresponding kind.
fn strip_compound(token: &Token) -> Token {
    let kind = match token.kind {
        TokenKind::PlusEqual => TokenKind::Plus,
        TokenKind::MinusEqual => TokenKind::Minus,
        TokenKind::StarEqual => TokenKind::Star,
        TokenKind::SlashEqual => TokenKind::Slash,
        TokenKind::PercentEqual => TokenKind::Percent,
        other => other,
    };
    Token::new(kind, &token.lexeme[..token.lexeme.len() - 1], token.line)
}

/// Inside a class's `init` method, a bare `name = value;` means `this.name = value;`
/// (spec §4.2). Applied once, recursively, over the freshly parsed method body.
fn rewrite_bare_assignments_to_this(body: &mut [Stmt]) {
    for stmt in body {
        rewrite_stmt(stmt);
    }
}

fn rewrite_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::Block(stmts) => rewrite_bare_assignments_to_this(stmts),
        Stmt::Expression(expr) => rewrite_expr(expr),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            rewrite_expr(condition);
            rewrite_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                rewrite_stmt(else_branch);
            }
        }
        Stmt::While { condition, body } => {
            rewrite_expr(condition);
            rewrite_stmt(body);
        }
        Stmt::For { iterable, body, .. } => {
            rewrite_expr(iterable);
            rewrite_stmt(body);
        }
        Stmt::Return { value: Some(v), .. } => rewrite_expr(v),
        Stmt::Throw { value, .. } => rewrite_expr(value),
        Stmt::Var { init: Some(v), .. } => rewrite_expr(v),
        Stmt::TryCatch {
            try_block,
            catch_block,
            ..
        } => {
            rewrite_stmt(try_block);
            rewrite_stmt(catch_block);
        }
        _ => {}
    }
}

fn rewrite_expr(expr: &mut Expr) {
    match expr {
        Expr::Assign { name, value } => {
            rewrite_expr(value);
            let replaced = Expr::Set {
                object: Box::new(Expr::This(name.clone())),
                name: name.clone(),
                value: value.clone(),
            };
            *expr = replaced;
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            rewrite_expr(left);
            rewrite_expr(right);
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => rewrite_expr(right),
        Expr::Call { callee, args, .. } => {
            rewrite_expr(callee);
            args.iter_mut().for_each(rewrite_expr);
        }
        Expr::Get { object, .. } => rewrite_expr(object),
        Expr::Set { object, value, .. } => {
            rewrite_expr(object);
            rewrite_expr(value);
        }
        Expr::Index { object, index, .. } => {
            rewrite_expr(object);
            rewrite_expr(index);
        }
        Expr::IndexSet {
            object,
            index,
            value,
            ..
        } => {
            rewrite_expr(object);
            rewrite_expr(index);
            rewrite_expr(value);
        }
        Expr::ListExpr(items) => items.iter_mut().for_each(rewrite_expr),
        Expr::Dict { keys, values } => {
            keys.iter_mut().for_each(rewrite_expr);
            values.iter_mut().for_each(rewrite_expr);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Vec<Stmt> {
        let tokens = Lexer::new(src).scan_tokens().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    #[test]
    fn parses_immutable_declaration() {
        let stmts = parse("@immut a = 1;");
        assert!(matches!(
            stmts[0],
            Stmt::Var {
                immutable: true,
                ..
            }
        ));
    }

    #[test]
    fn parses_function_with_dollar_sigil() {
        let stmts = parse("$ add(a, b) { return a + b; }");
        assert!(matches!(stmts[0], Stmt::Function(_)));
    }

    #[test]
    fn parses_match_with_ok_err_patterns() {
        let stmts = parse("match (x) { Ok(v) => v, Err(e) => -1, _ => 0, };");
        let Stmt::Expression(Expr::Match { cases, .. }) = &stmts[0] else {
            panic!("expected a match expression statement");
        };
        assert_eq!(cases.len(), 3);
        assert!(matches!(cases[0].pattern, Pattern::Ok(_)));
        assert!(matches!(cases[1].pattern, Pattern::Err(_)));
        assert!(matches!(cases[2].pattern, Pattern::Wildcard));
    }

    #[test]
    fn power_is_right_associative() {
        let stmts = parse("x = 2 ** 3 ** 2;");
        let Stmt::Expression(Expr::Assign { value, .. }) = &stmts[0] else {
            panic!()
        };
        let Expr::Binary { right, .. } = value.as_ref() else {
            panic!()
        };
        assert!(matches!(right.as_ref(), Expr::Binary { .. }));
    }

    #[test]
    fn rewrites_bare_assignment_in_init_to_this() {
        let stmts = parse("class Point { $ init(x) { x = x; } }");
        let Stmt::Class { methods, .. } = &stmts[0] else {
            panic!()
        };
        let Stmt::Expression(Expr::Set { object, .. }) = &methods[0].body[0] else {
            panic!("expected a rewritten `this.x = x` assignment");
        };
        assert!(matches!(object.as_ref(), Expr::This(_)));
    }

    #[test]
    fn recovers_after_a_parse_error_and_keeps_going() {
        let tokens = Lexer::new("var x = ; var y = 2;").scan_tokens().unwrap();
        let err = Parser::new(tokens).parse().unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn parses_slice_with_open_start() {
        let stmts = parse("a = xs[:2];");
        let Stmt::Expression(Expr::Assign { value, .. }) = &stmts[0] else {
            panic!()
        };
        assert!(matches!(value.as_ref(), Expr::Slice { start: None, .. }));
    }
}
