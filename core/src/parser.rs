/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the WASM Transpiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! Source Parser (Recursive Descent)
//!
//! Parses the restricted scripting subset into the `Program` AST of `ast.rs`.
//! The grammar is deliberately wider than what the code generator accepts
//! (array literals, destructuring patterns, `**`, `%=`, anonymous functions)
//! so that unsupported constructs fail with a compile error naming the
//! construct rather than a syntax error.
//!
//! Parameters and function results may carry annotations:
//! `function f(a: int[], n: int): boolean { ... }`.

use crate::ast::{
    AssignOp, BinaryOp, DeclarationKind, Declarator, Expr, ExprId, ExprKind, FunctionDeclaration,
    LogicalOp, Param, Pattern, Program, Property, Statement, UnaryOp, UpdateOp,
};
use crate::types::ValueType;
use thiserror::Error;

// ─── Error Types ─────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Syntax Error at {file}:{line}:{col}: {message}")]
    Syntax {
        message: String,
        line: u32,
        col: u32,
        file: String,
    },
    #[error("Unexpected token: expected {expected}, found {found} at {file}:{line}:{col}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: u32,
        col: u32,
        file: String,
    },
    #[error("Unexpected end of file")]
    UnexpectedEof,
}

impl ParseError {
    fn syntax(msg: impl Into<String>, tok: &Token, file: &str) -> Self {
        ParseError::Syntax {
            message: msg.into(),
            line: tok.line,
            col: tok.col,
            file: file.to_string(),
        }
    }

    fn unexpected(expected: impl Into<String>, tok: &Token, file: &str) -> Self {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: format!("{:?}", tok.kind),
            line: tok.line,
            col: tok.col,
            file: file.to_string(),
        }
    }
}

// ─── Token Types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Identifier(String),

    // Keywords
    Function,
    Var,
    Let,
    Const,
    Return,
    If,
    Else,
    While,
    For,
    True,
    False,

    // Operators
    Plus,
    Minus,
    Star,
    StarStar, // **
    Slash,
    Percent,
    Bang,
    Assign,        // =
    PlusAssign,    // +=
    MinusAssign,   // -=
    StarAssign,    // *=
    SlashAssign,   // /=
    PercentAssign, // %=
    PlusPlus,      // ++
    MinusMinus,    // --
    Eq,            // == or ===
    Neq,           // != or !==
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
}

impl Token {
    fn new(kind: TokenKind, line: u32, col: u32) -> Self {
        Token { kind, line, col }
    }
}

// ─── Lexer ───────────────────────────────────────────────────────────────────

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    file: String,
}

impl Lexer {
    pub fn new(source: &str, file: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            file: file.to_string(),
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            if self.pos >= self.source.len() {
                tokens.push(Token::new(TokenKind::Eof, self.line, self.col));
                break;
            }
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
                self.advance();
            }

            if self.peek() == Some('/') && self.peek_ahead(1) == Some('/') {
                while matches!(self.peek(), Some(ch) if ch != '\n') {
                    self.advance();
                }
                continue;
            }

            if self.peek() == Some('/') && self.peek_ahead(1) == Some('*') {
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        Some(_) => {}
                        None => return Err(ParseError::UnexpectedEof),
                    }
                }
                continue;
            }

            return Ok(());
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let line = self.line;
        let col = self.col;
        let ch = self.peek().ok_or(ParseError::UnexpectedEof)?;

        if ch.is_ascii_digit() || (ch == '.' && matches!(self.peek_ahead(1), Some(d) if d.is_ascii_digit()))
        {
            return self.lex_number(line, col);
        }

        if ch.is_alphabetic() || ch == '_' || ch == '$' {
            let mut word = String::new();
            while let Some(c) = self.peek() {
                if c.is_alphanumeric() || c == '_' || c == '$' {
                    word.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            let kind = match word.as_str() {
                "function" => TokenKind::Function,
                "var" => TokenKind::Var,
                "let" => TokenKind::Let,
                "const" => TokenKind::Const,
                "return" => TokenKind::Return,
                "if" => TokenKind::If,
                "else" => TokenKind::Else,
                "while" => TokenKind::While,
                "for" => TokenKind::For,
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                _ => TokenKind::Identifier(word),
            };
            return Ok(Token::new(kind, line, col));
        }

        self.advance();
        let next = self.peek();
        let kind = match (ch, next) {
            ('+', Some('+')) => self.take(TokenKind::PlusPlus),
            ('+', Some('=')) => self.take(TokenKind::PlusAssign),
            ('+', _) => TokenKind::Plus,
            ('-', Some('-')) => self.take(TokenKind::MinusMinus),
            ('-', Some('=')) => self.take(TokenKind::MinusAssign),
            ('-', _) => TokenKind::Minus,
            ('*', Some('*')) => self.take(TokenKind::StarStar),
            ('*', Some('=')) => self.take(TokenKind::StarAssign),
            ('*', _) => TokenKind::Star,
            ('/', Some('=')) => self.take(TokenKind::SlashAssign),
            ('/', _) => TokenKind::Slash,
            ('%', Some('=')) => self.take(TokenKind::PercentAssign),
            ('%', _) => TokenKind::Percent,
            ('=', Some('=')) => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                }
                TokenKind::Eq
            }
            ('=', _) => TokenKind::Assign,
            ('!', Some('=')) => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                }
                TokenKind::Neq
            }
            ('!', _) => TokenKind::Bang,
            ('<', Some('=')) => self.take(TokenKind::Le),
            ('<', _) => TokenKind::Lt,
            ('>', Some('=')) => self.take(TokenKind::Ge),
            ('>', _) => TokenKind::Gt,
            ('&', Some('&')) => self.take(TokenKind::AndAnd),
            ('|', Some('|')) => self.take(TokenKind::OrOr),
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('{', _) => TokenKind::LBrace,
            ('}', _) => TokenKind::RBrace,
            ('[', _) => TokenKind::LBracket,
            (']', _) => TokenKind::RBracket,
            (',', _) => TokenKind::Comma,
            ('.', _) => TokenKind::Dot,
            (':', _) => TokenKind::Colon,
            (';', _) => TokenKind::Semicolon,
            _ => {
                return Err(ParseError::Syntax {
                    message: format!("Unexpected character '{}'", ch),
                    line,
                    col,
                    file: self.file.clone(),
                })
            }
        };
        Ok(Token::new(kind, line, col))
    }

    /// Consume the second character of a two-character operator.
    fn take(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn lex_number(&mut self, line: u32, col: u32) -> Result<Token, ParseError> {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap_or('0'));
        }
        if self.peek() == Some('.') {
            text.push('.');
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap_or('0'));
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = self.peek_ahead(1);
            let digit_at = if matches!(sign, Some('+' | '-')) { 2 } else { 1 };
            if matches!(self.peek_ahead(digit_at), Some(c) if c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    if let Some(c) = self.advance() {
                        text.push(c);
                    }
                }
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    text.push(self.advance().unwrap_or('0'));
                }
            }
        }
        let value: f64 = text.parse().map_err(|_| ParseError::Syntax {
            message: format!("Invalid numeric literal '{}'", text),
            line,
            col,
            file: self.file.clone(),
        })?;
        Ok(Token::new(TokenKind::Number(value), line, col))
    }
}

// ─── Parser ──────────────────────────────────────────────────────────────────

static EOF_TOKEN: Token = Token {
    kind: TokenKind::Eof,
    line: 0,
    col: 0,
};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, file: &str) -> Self {
        Parser {
            tokens,
            pos: 0,
            file: file.to_string(),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&EOF_TOKEN)
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<Token, ParseError> {
        let tok = self.peek().clone();
        if std::mem::discriminant(&tok.kind) == std::mem::discriminant(expected) {
            self.advance();
            Ok(tok)
        } else {
            Err(ParseError::unexpected(
                format!("{:?}", expected),
                &tok,
                &self.file,
            ))
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn match_tok(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Identifier(name) => Ok(name),
            _ => Err(ParseError::unexpected(what, &tok, &self.file)),
        }
    }

    // ─── Top-Level ───────────────────────────────────────────────────────

    /// Parse the whole unit. Non-function top-level statements are kept so
    /// the module builder can report them by position.
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.at_end() {
            body.push(self.parse_statement()?);
        }
        let mut program = Program::new(body);
        program.renumber();
        Ok(program)
    }

    // ─── Functions ───────────────────────────────────────────────────────

    fn parse_function(&mut self) -> Result<FunctionDeclaration, ParseError> {
        self.expect(&TokenKind::Function)?;
        let name = match self.peek_kind() {
            TokenKind::Identifier(_) => Some(self.expect_identifier("function name")?),
            _ => None,
        };

        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let pattern = self.parse_pattern()?;
            let annotation = self.parse_annotation()?;
            params.push(Param {
                pattern,
                annotation,
            });
            if !self.match_tok(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let return_type = self.parse_annotation()?;
        let body = self.parse_block()?;
        Ok(FunctionDeclaration {
            name,
            params,
            return_type,
            body,
        })
    }

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Pattern::Identifier(name))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    elements.push(self.parse_pattern()?);
                    if !self.match_tok(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Pattern::Array(elements))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut keys = Vec::new();
                while !self.check(&TokenKind::RBrace) {
                    keys.push(self.expect_identifier("property name")?);
                    if !self.match_tok(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace)?;
                Ok(Pattern::Object(keys))
            }
            _ => Err(ParseError::unexpected("binding pattern", &tok, &self.file)),
        }
    }

    // annotation: ":" ("int" | "double" | "boolean") ("[" "]")?
    fn parse_annotation(&mut self) -> Result<Option<ValueType>, ParseError> {
        if !self.match_tok(&TokenKind::Colon) {
            return Ok(None);
        }
        let tok = self.peek().clone();
        let base = self.expect_identifier("type name")?;
        let is_array = if self.match_tok(&TokenKind::LBracket) {
            self.expect(&TokenKind::RBracket)?;
            true
        } else {
            false
        };
        let ty = match (base.as_str(), is_array) {
            ("int", false) => ValueType::Int32,
            ("double", false) => ValueType::Float64,
            ("boolean", false) => ValueType::Boolean,
            ("int", true) => ValueType::Int32Array,
            ("double", true) => ValueType::Float64Array,
            _ => {
                return Err(ParseError::syntax(
                    format!("Unknown type annotation '{}{}'", base, if is_array { "[]" } else { "" }),
                    &tok,
                    &self.file,
                ))
            }
        };
        Ok(Some(ty))
    }

    // ─── Statements ──────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek_kind() {
            TokenKind::Function => Ok(Statement::Function(self.parse_function()?)),
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let stmt = self.parse_variable_declaration()?;
                self.match_tok(&TokenKind::Semicolon);
                Ok(stmt)
            }
            TokenKind::Return => self.parse_return(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::LBrace => Ok(Statement::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement::Empty)
            }
            _ => {
                let expr = self.parse_expression()?;
                self.match_tok(&TokenKind::Semicolon);
                Ok(Statement::Expression(expr))
            }
        }
    }

    fn parse_variable_declaration(&mut self) -> Result<Statement, ParseError> {
        let kind = match self.advance().kind {
            TokenKind::Let => DeclarationKind::Let,
            TokenKind::Const => DeclarationKind::Const,
            _ => DeclarationKind::Var,
        };
        let mut declarations = Vec::new();
        loop {
            let target = self.parse_pattern()?;
            let init = if self.match_tok(&TokenKind::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            declarations.push(Declarator { target, init });
            if !self.match_tok(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Statement::Variable { kind, declarations })
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        self.expect(&TokenKind::Return)?;
        let argument = match self.peek_kind() {
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => None,
            _ => Some(self.parse_expression()?),
        };
        self.match_tok(&TokenKind::Semicolon);
        Ok(Statement::Return(argument))
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.match_tok(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While { test, body })
    }

    // for "(" init? ";" test? ";" update? ")" statement
    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LParen)?;

        let init = match self.peek_kind() {
            TokenKind::Semicolon => None,
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                Some(Box::new(self.parse_variable_declaration()?))
            }
            _ => Some(Box::new(Statement::Expression(self.parse_expression()?))),
        };
        self.expect(&TokenKind::Semicolon)?;

        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(Statement::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            stmts.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(stmts)
    }

    // ─── Expressions (Precedence Climbing) ───────────────────────────────

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    // assignment: logical_or (assign_op assignment)?
    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_logical_or()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::AddAssign,
            TokenKind::MinusAssign => AssignOp::SubAssign,
            TokenKind::StarAssign => AssignOp::MulAssign,
            TokenKind::SlashAssign => AssignOp::DivAssign,
            TokenKind::PercentAssign => AssignOp::RemAssign,
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_assignment()?;
        Ok(node(ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        }))
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_logical_and()?;
        while self.match_tok(&TokenKind::OrOr) {
            let right = self.parse_logical_and()?;
            left = logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.match_tok(&TokenKind::AndAnd) {
            let right = self.parse_equality()?;
            left = logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Neq => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.parse_exponent()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    // exponent: unary ("**" exponent)?   (right-associative)
    fn parse_exponent(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_unary()?;
        if self.match_tok(&TokenKind::StarStar) {
            let exponent = self.parse_exponent()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if self.advance().kind == TokenKind::PlusPlus {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                let argument = self.parse_unary()?;
                return Ok(node(ExprKind::Update {
                    op,
                    prefix: true,
                    argument: Box::new(argument),
                }));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let argument = self.parse_unary()?;
        Ok(node(ExprKind::Unary {
            op,
            argument: Box::new(argument),
        }))
    }

    // postfix: primary ("(" args ")" | "[" expr "]" | "." name)* ("++" | "--")?
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let mut arguments = Vec::new();
                    while !self.check(&TokenKind::RParen) {
                        arguments.push(self.parse_assignment()?);
                        if !self.match_tok(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    expr = node(ExprKind::Call {
                        callee: Box::new(expr),
                        arguments,
                    });
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = node(ExprKind::Member {
                        object: Box::new(expr),
                        property: Property::Computed(Box::new(index)),
                    });
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier("property name")?;
                    expr = node(ExprKind::Member {
                        object: Box::new(expr),
                        property: Property::Named(name),
                    });
                }
                _ => break,
            }
        }

        let op = match self.peek_kind() {
            TokenKind::PlusPlus => UpdateOp::Increment,
            TokenKind::MinusMinus => UpdateOp::Decrement,
            _ => return Ok(expr),
        };
        self.advance();
        Ok(node(ExprKind::Update {
            op,
            prefix: false,
            argument: Box::new(expr),
        }))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Number(value) => Ok(node(ExprKind::Number(value))),
            TokenKind::True => Ok(node(ExprKind::Boolean(true))),
            TokenKind::False => Ok(node(ExprKind::Boolean(false))),
            TokenKind::Identifier(name) => Ok(node(ExprKind::Identifier(name))),
            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                let mut elements = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    elements.push(self.parse_assignment()?);
                    if !self.match_tok(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(node(ExprKind::Array(elements)))
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof),
            _ => Err(ParseError::syntax(
                format!("Unexpected token in expression: {:?}", tok.kind),
                &tok,
                &self.file,
            )),
        }
    }
}

// Ids are filled in by `Program::renumber` once the whole tree exists.
fn node(kind: ExprKind) -> Expr {
    Expr::new(ExprId::default(), kind)
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    node(ExprKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    node(ExprKind::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Parse source text into a `Program` with pre-order expression ids.
pub fn parse_source(source: &str, file: &str) -> Result<Program, ParseError> {
    let mut lexer = Lexer::new(source, file);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(tokens, file);
    parser.parse_program()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
