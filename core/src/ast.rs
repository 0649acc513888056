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

use crate::types::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an expression node within one program.
///
/// Ids are dense and assigned in pre-order. The parser hands them out while
/// building; ASTs that arrive as JSON get theirs from [`Program::renumber`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ExprId(pub u32);

/// A single compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Statement>,
}

impl Program {
    pub fn new(body: Vec<Statement>) -> Self {
        Program { body }
    }

    /// Top-level function declarations, skipping anything else.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDeclaration> {
        self.body.iter().filter_map(|stmt| match stmt {
            Statement::Function(func) => Some(func),
            _ => None,
        })
    }

    /// Reassign every expression id in pre-order, starting from zero.
    pub fn renumber(&mut self) {
        let mut next = 0u32;
        for stmt in &mut self.body {
            renumber_statement(stmt, &mut next);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// `None` for anonymous function expressions.
    pub name: Option<String>,
    pub params: Vec<Param>,
    #[serde(default)]
    pub return_type: Option<ValueType>,
    pub body: Vec<Statement>,
}

impl FunctionDeclaration {
    /// Name for diagnostics; anonymous functions render as `<anonymous>`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub pattern: Pattern,
    #[serde(default)]
    pub annotation: Option<ValueType>,
}

impl Param {
    pub fn named(name: impl Into<String>) -> Self {
        Param {
            pattern: Pattern::Identifier(name.into()),
            annotation: None,
        }
    }

    pub fn typed(name: impl Into<String>, ty: ValueType) -> Self {
        Param {
            pattern: Pattern::Identifier(name.into()),
            annotation: Some(ty),
        }
    }
}

/// Binding target of a parameter or declarator. Only `Identifier` compiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Identifier(String),
    Array(Vec<Pattern>),
    Object(Vec<String>),
}

impl Pattern {
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Pattern::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Function(FunctionDeclaration),
    Variable {
        kind: DeclarationKind,
        declarations: Vec<Declarator>,
    },
    Expression(Expr),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
    },
    While {
        test: Expr,
        body: Box<Statement>,
    },
    For {
        init: Option<Box<Statement>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Statement>,
    },
    Block(Vec<Statement>),
    Empty,
}

impl Statement {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Function(_) => "function declaration",
            Statement::Variable { .. } => "variable declaration",
            Statement::Expression(_) => "expression statement",
            Statement::Return(_) => "return statement",
            Statement::If { .. } => "if statement",
            Statement::While { .. } => "while statement",
            Statement::For { .. } => "for statement",
            Statement::Block(_) => "block statement",
            Statement::Empty => "empty statement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(default)]
    pub id: ExprId,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: ExprId, kind: ExprKind) -> Self {
        Expr { id, kind }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Assignments and updates lower to complete statements on their own.
    pub fn is_effect(&self) -> bool {
        matches!(self.kind, ExprKind::Assign { .. } | ExprKind::Update { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Number(f64),
    Boolean(bool),
    Identifier(String),
    Array(Vec<Expr>),
    Unary {
        op: UnaryOp,
        argument: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        argument: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: Property,
    },
}

impl ExprKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExprKind::Number(_) => "numeric literal",
            ExprKind::Boolean(_) => "boolean literal",
            ExprKind::Identifier(_) => "identifier",
            ExprKind::Array(_) => "array literal",
            ExprKind::Unary { .. } => "unary expression",
            ExprKind::Binary { .. } => "binary expression",
            ExprKind::Logical { .. } => "logical expression",
            ExprKind::Update { .. } => "update expression",
            ExprKind::Assign { .. } => "assignment expression",
            ExprKind::Call { .. } => "call expression",
            ExprKind::Member { .. } => "member expression",
        }
    }
}

/// `a[i]` is `Computed`, `a.length` is `Named`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Property {
    Computed(Box<Expr>),
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Ge | BinaryOp::Gt
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
}

impl AssignOp {
    /// The arithmetic a shorthand assignment combines with, `None` for plain `=`.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
            AssignOp::RemAssign => Some(BinaryOp::Rem),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Not => "!",
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
        };
        f.write_str(s)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Ge => ">=",
            BinaryOp::Gt => ">",
        };
        f.write_str(s)
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        })
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdateOp::Increment => "++",
            UpdateOp::Decrement => "--",
        })
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
            AssignOp::RemAssign => "%=",
        })
    }
}

// ─── Renumbering ─────────────────────────────────────────────────────────────

fn renumber_statement(stmt: &mut Statement, next: &mut u32) {
    match stmt {
        Statement::Function(func) => {
            for s in &mut func.body {
                renumber_statement(s, next);
            }
        }
        Statement::Variable { declarations, .. } => {
            for decl in declarations {
                if let Some(init) = &mut decl.init {
                    renumber_expr(init, next);
                }
            }
        }
        Statement::Expression(expr) => renumber_expr(expr, next),
        Statement::Return(arg) => {
            if let Some(expr) = arg {
                renumber_expr(expr, next);
            }
        }
        Statement::If {
            test,
            consequent,
            alternate,
        } => {
            renumber_expr(test, next);
            renumber_statement(consequent, next);
            if let Some(alt) = alternate {
                renumber_statement(alt, next);
            }
        }
        Statement::While { test, body } => {
            renumber_expr(test, next);
            renumber_statement(body, next);
        }
        Statement::For {
            init,
            test,
            update,
            body,
        } => {
            if let Some(init) = init {
                renumber_statement(init, next);
            }
            if let Some(test) = test {
                renumber_expr(test, next);
            }
            if let Some(update) = update {
                renumber_expr(update, next);
            }
            renumber_statement(body, next);
        }
        Statement::Block(stmts) => {
            for s in stmts {
                renumber_statement(s, next);
            }
        }
        Statement::Empty => {}
    }
}

fn renumber_expr(expr: &mut Expr, next: &mut u32) {
    expr.id = ExprId(*next);
    *next += 1;
    match &mut expr.kind {
        ExprKind::Number(_) | ExprKind::Boolean(_) | ExprKind::Identifier(_) => {}
        ExprKind::Array(elements) => {
            for e in elements {
                renumber_expr(e, next);
            }
        }
        ExprKind::Unary { argument, .. } | ExprKind::Update { argument, .. } => {
            renumber_expr(argument, next)
        }
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            renumber_expr(left, next);
            renumber_expr(right, next);
        }
        ExprKind::Assign { target, value, .. } => {
            renumber_expr(target, next);
            renumber_expr(value, next);
        }
        ExprKind::Call { callee, arguments } => {
            renumber_expr(callee, next);
            for arg in arguments {
                renumber_expr(arg, next);
            }
        }
        ExprKind::Member { object, property } => {
            renumber_expr(object, next);
            if let Property::Computed(index) = property {
                renumber_expr(index, next);
            }
        }
    }
}
