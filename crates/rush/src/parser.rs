//! Pratt parser for Rush.
//!
//! Expressions are parsed with a precedence ladder and per-token prefix/infix
//! rules; statements are recursive descent. The parser accumulates syntax
//! errors and keeps going (`parse_program` never panics on malformed input);
//! on an unparsable statement it synchronizes to the next statement
//! separator.
//!
//! Convention: every `parse_*` helper is entered with `cur` on the first
//! token of its construct and leaves `cur` on the last token it consumed.

use crate::{
    ast::{
        Block, CatchClause, ClassDecl, Expr, ExprKind, ImportItem, InfixOp, MethodDecl, Pos, PrefixOp, Program, Stmt,
        StmtKind, SwitchCase,
    },
    error::SyntaxError,
    lexer::Lexer,
    token::{Token, TokenKind},
};

/// Operator precedence, low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Equality,
    Comparison,
    Additive,
    Multiplicative,
    Prefix,
    Call,
    Index,
}

fn precedence_of(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equality,
        TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => Precedence::Comparison,
        TokenKind::Plus | TokenKind::Minus => Precedence::Additive,
        TokenKind::Asterisk | TokenKind::Slash | TokenKind::Percent => Precedence::Multiplicative,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket | TokenKind::Dot => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

fn infix_op(kind: TokenKind) -> Option<InfixOp> {
    Some(match kind {
        TokenKind::Plus => InfixOp::Plus,
        TokenKind::Minus => InfixOp::Minus,
        TokenKind::Asterisk => InfixOp::Asterisk,
        TokenKind::Slash => InfixOp::Slash,
        TokenKind::Percent => InfixOp::Percent,
        TokenKind::Eq => InfixOp::Eq,
        TokenKind::NotEq => InfixOp::NotEq,
        TokenKind::Lt => InfixOp::Lt,
        TokenKind::LtEq => InfixOp::LtEq,
        TokenKind::Gt => InfixOp::Gt,
        TokenKind::GtEq => InfixOp::GtEq,
        TokenKind::And => InfixOp::And,
        TokenKind::Or => InfixOp::Or,
        _ => return None,
    })
}

/// Recursive-descent + Pratt parser over the token stream.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    peek: Token,
    errors: Vec<SyntaxError>,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let cur = next_real_token(&mut lexer);
        let peek = next_real_token(&mut lexer);
        Self {
            lexer,
            cur,
            peek,
            errors: vec![],
        }
    }

    /// Parses the whole input, returning the program plus accumulated syntax
    /// errors.
    pub fn parse_program(mut self) -> (Program, Vec<SyntaxError>) {
        let mut program = Program::default();
        loop {
            self.skip_cur_separators();
            if self.cur_is(TokenKind::Eof) {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => program.statements.push(stmt),
                None => self.synchronize(),
            }
            self.advance();
        }
        (program, self.errors)
    }

    // ----- token plumbing -----

    fn advance(&mut self) {
        self.cur = std::mem::replace(&mut self.peek, next_real_token(&mut self.lexer));
    }

    fn cur_is(&self, kind: TokenKind) -> bool {
        self.cur.kind == kind
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek.kind == kind
    }

    fn cur_pos(&self) -> Pos {
        Pos::new(self.cur.line, self.cur.column)
    }

    /// Advances when the next token matches, otherwise records an error.
    fn expect_peek(&mut self, kind: TokenKind) -> bool {
        if self.peek_is(kind) {
            self.advance();
            true
        } else {
            self.errors.push(SyntaxError {
                message: format!("expected next token to be {kind}, got {} instead", self.peek.kind),
                line: self.peek.line,
                column: self.peek.column,
            });
            false
        }
    }

    fn error_at_cur(&mut self, message: impl Into<String>) {
        self.errors.push(SyntaxError {
            message: message.into(),
            line: self.cur.line,
            column: self.cur.column,
        });
    }

    fn skip_cur_separators(&mut self) {
        while self.cur_is(TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn skip_peek_separators(&mut self) {
        while self.peek_is(TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Skips to the next statement boundary after a parse error.
    fn synchronize(&mut self) {
        while !matches!(
            self.cur.kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            self.advance();
        }
    }

    // ----- statements -----

    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.cur.kind {
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => Some(Stmt {
                kind: StmtKind::Break,
                pos: self.cur_pos(),
            }),
            TokenKind::Continue => Some(Stmt {
                kind: StmtKind::Continue,
                pos: self.cur_pos(),
            }),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Throw => self.parse_throw(),
            TokenKind::Import => self.parse_import(),
            TokenKind::Export => self.parse_export(),
            TokenKind::Class => self.parse_class(),
            _ => self.parse_expression_or_assignment(),
        }
    }

    /// Parses either a bare expression statement or an assignment, deciding
    /// after the expression by looking for `=`. Valid assignment targets are
    /// a bare identifier, `@name`, or an index expression.
    fn parse_expression_or_assignment(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        let expr = self.parse_expression(Precedence::Lowest)?;

        if !self.peek_is(TokenKind::Assign) {
            return Some(Stmt {
                kind: StmtKind::Expression(expr),
                pos,
            });
        }
        self.advance(); // onto '='
        self.advance(); // onto the first token of the value
        let mut value = self.parse_expression(Precedence::Lowest)?;

        let kind = match expr.kind {
            ExprKind::Identifier(name) => {
                // Name the function literal for stack traces.
                if let ExprKind::Function { name: fn_name, .. } = &mut value.kind {
                    fn_name.get_or_insert_with(|| name.clone());
                }
                StmtKind::Assignment { name, value }
            }
            ExprKind::InstanceVar(name) => StmtKind::InstanceAssignment { name, value },
            ExprKind::Index { receiver, index } => StmtKind::IndexAssignment {
                target: *receiver,
                index: *index,
                value,
            },
            _ => {
                self.error_at_cur("invalid assignment target");
                return None;
            }
        };
        Some(Stmt { kind, pos })
    }

    /// Statement form allowed in a `for` header: assignment or expression,
    /// with no terminator handling.
    fn parse_simple_statement(&mut self) -> Option<Stmt> {
        self.parse_expression_or_assignment()
    }

    fn parse_return(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        if matches!(
            self.peek.kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            return Some(Stmt {
                kind: StmtKind::Return(None),
                pos,
            });
        }
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        Some(Stmt {
            kind: StmtKind::Return(Some(value)),
            pos,
        })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RParen) || !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block();
        Some(Stmt {
            kind: StmtKind::While { condition, body },
            pos,
        })
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }

        self.advance();
        let init = if self.cur_is(TokenKind::Semicolon) {
            None
        } else {
            let stmt = self.parse_simple_statement()?;
            if !self.expect_peek(TokenKind::Semicolon) {
                return None;
            }
            Some(Box::new(stmt))
        };

        self.advance();
        let condition = if self.cur_is(TokenKind::Semicolon) {
            None
        } else {
            let cond = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(TokenKind::Semicolon) {
                return None;
            }
            Some(cond)
        };

        self.advance();
        let update = if self.cur_is(TokenKind::RParen) {
            None
        } else {
            let stmt = self.parse_simple_statement()?;
            if !self.expect_peek(TokenKind::RParen) {
                return None;
            }
            Some(Box::new(stmt))
        };

        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block();
        Some(Stmt {
            kind: StmtKind::For {
                init,
                condition,
                update,
                body,
            },
            pos,
        })
    }

    fn parse_switch(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RParen) || !self.expect_peek(TokenKind::LBrace) {
            return None;
        }

        let mut cases = vec![];
        let mut default = None;
        loop {
            self.skip_peek_separators();
            match self.peek.kind {
                TokenKind::Case => {
                    self.advance(); // onto `case`
                    self.advance(); // onto the first value
                    let mut values = vec![self.parse_expression(Precedence::Lowest)?];
                    while self.peek_is(TokenKind::Comma) {
                        self.advance();
                        self.advance();
                        values.push(self.parse_expression(Precedence::Lowest)?);
                    }
                    if !self.expect_peek(TokenKind::Colon) {
                        return None;
                    }
                    let body = self.parse_case_body();
                    cases.push(SwitchCase { values, body });
                }
                TokenKind::Default => {
                    self.advance();
                    if !self.expect_peek(TokenKind::Colon) {
                        return None;
                    }
                    if default.is_some() {
                        self.error_at_cur("duplicate default case in switch");
                    }
                    default = Some(self.parse_case_body());
                }
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                _ => {
                    self.error_at_cur(format!("expected case, default or }} in switch, got {}", self.peek.kind));
                    return None;
                }
            }
        }

        Some(Stmt {
            kind: StmtKind::Switch { value, cases, default },
            pos,
        })
    }

    /// Statements after a `case v:` label up to the next label or `}`.
    fn parse_case_body(&mut self) -> Block {
        let mut statements = vec![];
        loop {
            self.skip_peek_separators();
            if matches!(
                self.peek.kind,
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                break;
            }
            self.advance();
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
        }
        Block { statements }
    }

    fn parse_try(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block();

        let mut catches = vec![];
        loop {
            self.skip_peek_separators();
            if !self.peek_is(TokenKind::Catch) {
                break;
            }
            self.advance(); // onto `catch`
            let catch_pos = self.cur_pos();
            if !self.expect_peek(TokenKind::LParen) {
                return None;
            }
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            let (error_type, variable) = if self.peek_is(TokenKind::Ident) {
                let ty = self.cur.literal.clone();
                self.advance();
                (Some(ty), self.cur.literal.clone())
            } else {
                (None, self.cur.literal.clone())
            };
            if !self.expect_peek(TokenKind::RParen) || !self.expect_peek(TokenKind::LBrace) {
                return None;
            }
            let catch_body = self.parse_block();
            catches.push(CatchClause {
                error_type,
                variable,
                body: catch_body,
                pos: catch_pos,
            });
        }

        self.skip_peek_separators();
        let finally = if self.peek_is(TokenKind::Finally) {
            self.advance();
            if !self.expect_peek(TokenKind::LBrace) {
                return None;
            }
            Some(self.parse_block())
        } else {
            None
        };

        if catches.is_empty() && finally.is_none() {
            self.error_at_cur("try statement requires at least one catch or finally block");
            return None;
        }

        Some(Stmt {
            kind: StmtKind::Try { body, catches, finally },
            pos,
        })
    }

    fn parse_throw(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        Some(Stmt {
            kind: StmtKind::Throw(value),
            pos,
        })
    }

    fn parse_import(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }

        let mut items = vec![];
        loop {
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            let name = self.cur.literal.clone();
            let alias = if self.peek_is(TokenKind::As) {
                self.advance();
                if !self.expect_peek(TokenKind::Ident) {
                    return None;
                }
                Some(self.cur.literal.clone())
            } else {
                None
            };
            items.push(ImportItem { name, alias });
            if self.peek_is(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        if !self.expect_peek(TokenKind::RBrace) || !self.expect_peek(TokenKind::From) {
            return None;
        }
        if !self.expect_peek(TokenKind::Str) {
            return None;
        }
        let module = self.cur.literal.clone();
        Some(Stmt {
            kind: StmtKind::Import { module, items },
            pos,
        })
    }

    fn parse_export(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur.literal.clone();
        let value = if self.peek_is(TokenKind::Assign) {
            self.advance();
            self.advance();
            let mut value = self.parse_expression(Precedence::Lowest)?;
            if let ExprKind::Function { name: fn_name, .. } = &mut value.kind {
                fn_name.get_or_insert_with(|| name.clone());
            }
            Some(value)
        } else {
            None
        };
        Some(Stmt {
            kind: StmtKind::Export { name, value },
            pos,
        })
    }

    fn parse_class(&mut self) -> Option<Stmt> {
        let pos = self.cur_pos();
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur.literal.clone();

        let superclass = if self.peek_is(TokenKind::Lt) {
            self.advance();
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            Some(self.cur.literal.clone())
        } else {
            None
        };

        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }

        let mut methods = vec![];
        loop {
            self.skip_peek_separators();
            match self.peek.kind {
                TokenKind::Function => {
                    self.advance();
                    if let Some(method) = self.parse_method() {
                        methods.push(method);
                    } else {
                        self.synchronize();
                    }
                }
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                _ => {
                    self.error_at_cur(format!(
                        "expected method declaration or }} in class body, got {}",
                        self.peek.kind
                    ));
                    return None;
                }
            }
        }

        Some(Stmt {
            kind: StmtKind::Class(ClassDecl {
                name,
                superclass,
                methods,
            }),
            pos,
        })
    }

    /// `fn name(params) { body }` inside a class body. The name may be the
    /// `initialize` keyword (the constructor).
    fn parse_method(&mut self) -> Option<MethodDecl> {
        let pos = self.cur_pos();
        if !matches!(self.peek.kind, TokenKind::Ident | TokenKind::Initialize) {
            self.error_at_cur(format!("expected method name, got {}", self.peek.kind));
            return None;
        }
        self.advance();
        let name = self.cur.literal.clone();
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        let params = self.parse_parameters()?;
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block();
        Some(MethodDecl { name, params, body, pos })
    }

    /// Parses a `{ ... }` block; `cur` must be on `{`, ends on `}`.
    fn parse_block(&mut self) -> Block {
        let mut statements = vec![];
        self.advance();
        loop {
            self.skip_cur_separators();
            if self.cur_is(TokenKind::RBrace) || self.cur_is(TokenKind::Eof) {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
            self.advance();
        }
        if !self.cur_is(TokenKind::RBrace) {
            self.error_at_cur("expected } to close block");
        }
        Block { statements }
    }

    // ----- expressions -----

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = self.parse_prefix()?;
        while !self.peek_is(TokenKind::Semicolon) && precedence < precedence_of(self.peek.kind) {
            self.advance();
            left = self.parse_infix(left)?;
        }
        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        let pos = self.cur_pos();
        let kind = match self.cur.kind {
            TokenKind::Int => match self.cur.literal.parse::<i64>() {
                Ok(n) => ExprKind::Integer(n),
                Err(_) => {
                    self.error_at_cur(format!("could not parse {:?} as integer", self.cur.literal));
                    return None;
                }
            },
            TokenKind::Float => match self.cur.literal.parse::<f64>() {
                Ok(f) => ExprKind::Float(f),
                Err(_) => {
                    self.error_at_cur(format!("could not parse {:?} as float", self.cur.literal));
                    return None;
                }
            },
            TokenKind::Str => ExprKind::Str(self.cur.literal.clone()),
            TokenKind::True => ExprKind::Boolean(true),
            TokenKind::False => ExprKind::Boolean(false),
            TokenKind::Ident => ExprKind::Identifier(self.cur.literal.clone()),
            TokenKind::At => {
                if !self.expect_peek(TokenKind::Ident) {
                    return None;
                }
                ExprKind::InstanceVar(self.cur.literal.clone())
            }
            TokenKind::Bang => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                ExprKind::Prefix {
                    op: PrefixOp::Bang,
                    right: Box::new(right),
                }
            }
            TokenKind::Minus => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                ExprKind::Prefix {
                    op: PrefixOp::Minus,
                    right: Box::new(right),
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression(Precedence::Lowest)?;
                if !self.expect_peek(TokenKind::RParen) {
                    return None;
                }
                return Some(inner);
            }
            TokenKind::If => return self.parse_if(),
            TokenKind::Function => return self.parse_function_literal(),
            TokenKind::LBracket => {
                let elements = self.parse_expression_list(TokenKind::RBracket)?;
                ExprKind::Array(elements)
            }
            TokenKind::LBrace => return self.parse_hash_literal(),
            TokenKind::Super => {
                if !self.expect_peek(TokenKind::LParen) {
                    return None;
                }
                let args = self.parse_expression_list(TokenKind::RParen)?;
                ExprKind::Super(args)
            }
            other => {
                self.error_at_cur(format!("no prefix parse function for {other}"));
                return None;
            }
        };
        Some(Expr { kind, pos })
    }

    fn parse_infix(&mut self, left: Expr) -> Option<Expr> {
        let pos = self.cur_pos();
        match self.cur.kind {
            TokenKind::LParen => {
                let args = self.parse_expression_list(TokenKind::RParen)?;
                Some(Expr {
                    kind: ExprKind::Call {
                        function: Box::new(left),
                        args,
                    },
                    pos,
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expression(Precedence::Lowest)?;
                if !self.expect_peek(TokenKind::RBracket) {
                    return None;
                }
                Some(Expr {
                    kind: ExprKind::Index {
                        receiver: Box::new(left),
                        index: Box::new(index),
                    },
                    pos,
                })
            }
            TokenKind::Dot => {
                if !matches!(self.peek.kind, TokenKind::Ident | TokenKind::Initialize) {
                    self.error_at_cur(format!("expected property name after '.', got {}", self.peek.kind));
                    return None;
                }
                self.advance();
                Some(Expr {
                    kind: ExprKind::Property {
                        receiver: Box::new(left),
                        name: self.cur.literal.clone(),
                    },
                    pos,
                })
            }
            kind => {
                let op = infix_op(kind)?;
                let precedence = precedence_of(kind);
                self.advance();
                let right = self.parse_expression(precedence)?;
                Some(Expr {
                    kind: ExprKind::Infix {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    pos,
                })
            }
        }
    }

    fn parse_if(&mut self) -> Option<Expr> {
        let pos = self.cur_pos();
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RParen) || !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let consequence = self.parse_block();

        self.skip_peek_separators();
        let alternative = if self.peek_is(TokenKind::Else) {
            self.advance();
            if self.peek_is(TokenKind::If) {
                // `else if` chains become a nested if inside the alternative.
                self.advance();
                let nested_pos = self.cur_pos();
                let nested = self.parse_if()?;
                Some(Block {
                    statements: vec![Stmt {
                        kind: StmtKind::Expression(nested),
                        pos: nested_pos,
                    }],
                })
            } else {
                if !self.expect_peek(TokenKind::LBrace) {
                    return None;
                }
                Some(self.parse_block())
            }
        } else {
            None
        };

        Some(Expr {
            kind: ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            pos,
        })
    }

    fn parse_function_literal(&mut self) -> Option<Expr> {
        let pos = self.cur_pos();
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        let params = self.parse_parameters()?;
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block();
        Some(Expr {
            kind: ExprKind::Function {
                params,
                body,
                name: None,
            },
            pos,
        })
    }

    /// Parameter list; `cur` must be on `(`, ends on `)`.
    fn parse_parameters(&mut self) -> Option<Vec<String>> {
        let mut params = vec![];
        if self.peek_is(TokenKind::RParen) {
            self.advance();
            return Some(params);
        }
        loop {
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            params.push(self.cur.literal.clone());
            if self.peek_is(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }
        Some(params)
    }

    /// Comma-separated expressions up to `end`; `cur` must be on the opening
    /// delimiter, ends on `end`. Newlines are permitted around elements.
    fn parse_expression_list(&mut self, end: TokenKind) -> Option<Vec<Expr>> {
        let mut items = vec![];
        self.skip_peek_separators();
        if self.peek_is(end) {
            self.advance();
            return Some(items);
        }
        loop {
            self.advance();
            items.push(self.parse_expression(Precedence::Lowest)?);
            self.skip_peek_separators();
            if self.peek_is(TokenKind::Comma) {
                self.advance();
                self.skip_peek_separators();
                // Tolerate a trailing comma before the closing delimiter.
                if self.peek_is(end) {
                    self.advance();
                    return Some(items);
                }
            } else {
                break;
            }
        }
        if !self.expect_peek(end) {
            return None;
        }
        Some(items)
    }

    /// `{ key: value, ... }`; `cur` must be on `{`, ends on `}`.
    fn parse_hash_literal(&mut self) -> Option<Expr> {
        let pos = self.cur_pos();
        let mut pairs = vec![];
        self.skip_peek_separators();
        if self.peek_is(TokenKind::RBrace) {
            self.advance();
            return Some(Expr {
                kind: ExprKind::Hash(pairs),
                pos,
            });
        }
        loop {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            self.skip_peek_separators();
            if self.peek_is(TokenKind::Comma) {
                self.advance();
                self.skip_peek_separators();
                if self.peek_is(TokenKind::RBrace) {
                    break;
                }
            } else {
                break;
            }
        }
        if !self.expect_peek(TokenKind::RBrace) {
            return None;
        }
        Some(Expr {
            kind: ExprKind::Hash(pairs),
            pos,
        })
    }
}

/// Pulls the next non-comment token from the lexer.
fn next_real_token(lexer: &mut Lexer<'_>) -> Token {
    loop {
        let token = lexer.next_token();
        if token.kind != TokenKind::Comment {
            return token;
        }
    }
}

/// Convenience wrapper: parse a full program from source.
pub fn parse(input: &str) -> (Program, Vec<SyntaxError>) {
    Parser::new(input).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Program {
        let (program, errors) = parse(input);
        assert!(errors.is_empty(), "unexpected syntax errors: {errors:?}");
        program
    }

    fn first_expr(program: &Program) -> &Expr {
        match &program.statements[0].kind {
            StmtKind::Expression(expr) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence_nesting() {
        let program = parse_ok("1 + 2 * 3 == 7 && true || false");
        // ((1 + (2 * 3)) == 7 && true) || false
        let ExprKind::Infix { op: InfixOp::Or, .. } = &first_expr(&program).kind else {
            panic!("expected || at top");
        };
    }

    #[test]
    fn assignment_targets() {
        let program = parse_ok("x = 1; @y = 2; a[0] = 3");
        assert!(matches!(program.statements[0].kind, StmtKind::Assignment { .. }));
        assert!(matches!(program.statements[1].kind, StmtKind::InstanceAssignment { .. }));
        assert!(matches!(program.statements[2].kind, StmtKind::IndexAssignment { .. }));
    }

    #[test]
    fn invalid_assignment_target() {
        let (_, errors) = parse("a.b = 1");
        assert!(errors.iter().any(|e| e.message.contains("invalid assignment target")));
    }

    #[test]
    fn named_function_assignment() {
        let program = parse_ok("add = fn(a, b) { return a + b }");
        let StmtKind::Assignment { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Function { name, params, .. } = &value.kind else {
            panic!("expected function literal");
        };
        assert_eq!(name.as_deref(), Some("add"));
        assert_eq!(params, &["a", "b"]);
    }

    #[test]
    fn for_loop_header() {
        let program = parse_ok("for (i = 0; i < 5; i = i + 1) { sum = sum + i }");
        let StmtKind::For {
            init,
            condition,
            update,
            ..
        } = &program.statements[0].kind
        else {
            panic!("expected for");
        };
        assert!(init.is_some());
        assert!(condition.is_some());
        assert!(update.is_some());
    }

    #[test]
    fn switch_with_multi_value_case() {
        let program = parse_ok("switch (x) { case 1, 2: a = 1 case 3: a = 2 default: a = 3 }");
        let StmtKind::Switch { cases, default, .. } = &program.statements[0].kind else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].values.len(), 2);
        assert!(default.is_some());
    }

    #[test]
    fn try_catch_finally() {
        let program = parse_ok("try { x() } catch (TypeError e) { 1 } catch (e) { 2 } finally { 3 }");
        let StmtKind::Try { catches, finally, .. } = &program.statements[0].kind else {
            panic!("expected try");
        };
        assert_eq!(catches.len(), 2);
        assert_eq!(catches[0].error_type.as_deref(), Some("TypeError"));
        assert_eq!(catches[0].variable, "e");
        assert!(catches[1].error_type.is_none());
        assert!(finally.is_some());
    }

    #[test]
    fn try_requires_catch_or_finally() {
        let (_, errors) = parse("try { x() }");
        assert!(!errors.is_empty());
    }

    #[test]
    fn import_export() {
        let program = parse_ok("import { a, b as c } from \"util\"\nexport answer = 42");
        let StmtKind::Import { module, items } = &program.statements[0].kind else {
            panic!("expected import");
        };
        assert_eq!(module, "util");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].alias.as_deref(), Some("c"));
        assert!(matches!(program.statements[1].kind, StmtKind::Export { .. }));
    }

    #[test]
    fn class_with_initialize_and_super() {
        let program = parse_ok("class Dog < Animal { fn initialize(name) { @name = name } fn speak() { super() } }");
        let StmtKind::Class(decl) = &program.statements[0].kind else {
            panic!("expected class");
        };
        assert_eq!(decl.name, "Dog");
        assert_eq!(decl.superclass.as_deref(), Some("Animal"));
        assert_eq!(decl.methods.len(), 2);
        assert_eq!(decl.methods[0].name, "initialize");
    }

    #[test]
    fn hash_and_array_literals_span_lines() {
        let program = parse_ok("{\n  \"a\": 1,\n  \"b\": [1,\n 2],\n}");
        let ExprKind::Hash(pairs) = &first_expr(&program).kind else {
            panic!("expected hash literal");
        };
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn unknown_prefix_reports_error() {
        let (_, errors) = parse("x = * 2");
        assert!(errors.iter().any(|e| e.message.contains("no prefix parse function for *")));
    }

    #[test]
    fn call_index_property_chain() {
        let program = parse_ok("a.b(1)[2].c");
        let expr = first_expr(&program);
        let ExprKind::Property { receiver, name } = &expr.kind else {
            panic!("expected property at top");
        };
        assert_eq!(name, "c");
        assert!(matches!(receiver.kind, ExprKind::Index { .. }));
    }

    #[test]
    fn else_if_chain() {
        let program = parse_ok("if (a) { 1 } else if (b) { 2 } else { 3 }");
        let ExprKind::If { alternative, .. } = &first_expr(&program).kind else {
            panic!("expected if");
        };
        let alt = alternative.as_ref().unwrap();
        let StmtKind::Expression(inner) = &alt.statements[0].kind else {
            panic!("expected nested if expression");
        };
        assert!(matches!(inner.kind, ExprKind::If { .. }));
    }

    #[test]
    fn super_call() {
        let program = parse_ok("super(1, 2)");
        assert!(matches!(first_expr(&program).kind, ExprKind::Super(ref args) if args.len() == 2));
    }
}
