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

//! Read-only tree walking over the AST.
//!
//! Analyses implement [`Visitor`] and override only the node kinds they care
//! about; everything else falls through to the `walk_*` functions, which visit
//! children left to right in source order. An override that still wants the
//! children visited calls the matching `walk_*` itself.

use crate::ast::{Declarator, Expr, ExprKind, FunctionDeclaration, Property, Statement};

pub trait Visitor {
    type Error;

    fn visit_function(&mut self, func: &FunctionDeclaration) -> Result<(), Self::Error> {
        walk_function(self, func)
    }

    fn visit_statement(&mut self, stmt: &Statement) -> Result<(), Self::Error> {
        walk_statement(self, stmt)
    }

    fn visit_declarator(&mut self, decl: &Declarator) -> Result<(), Self::Error> {
        walk_declarator(self, decl)
    }

    fn visit_expression(&mut self, expr: &Expr) -> Result<(), Self::Error> {
        walk_expression(self, expr)
    }
}

pub fn walk_function<V: Visitor + ?Sized>(
    visitor: &mut V,
    func: &FunctionDeclaration,
) -> Result<(), V::Error> {
    for stmt in &func.body {
        visitor.visit_statement(stmt)?;
    }
    Ok(())
}

pub fn walk_statement<V: Visitor + ?Sized>(
    visitor: &mut V,
    stmt: &Statement,
) -> Result<(), V::Error> {
    match stmt {
        Statement::Function(func) => visitor.visit_function(func),
        Statement::Variable { declarations, .. } => {
            for decl in declarations {
                visitor.visit_declarator(decl)?;
            }
            Ok(())
        }
        Statement::Expression(expr) => visitor.visit_expression(expr),
        Statement::Return(arg) => match arg {
            Some(expr) => visitor.visit_expression(expr),
            None => Ok(()),
        },
        Statement::If {
            test,
            consequent,
            alternate,
        } => {
            visitor.visit_expression(test)?;
            visitor.visit_statement(consequent)?;
            if let Some(alt) = alternate {
                visitor.visit_statement(alt)?;
            }
            Ok(())
        }
        Statement::While { test, body } => {
            visitor.visit_expression(test)?;
            visitor.visit_statement(body)
        }
        Statement::For {
            init,
            test,
            update,
            body,
        } => {
            if let Some(init) = init {
                visitor.visit_statement(init)?;
            }
            if let Some(test) = test {
                visitor.visit_expression(test)?;
            }
            if let Some(update) = update {
                visitor.visit_expression(update)?;
            }
            visitor.visit_statement(body)
        }
        Statement::Block(stmts) => {
            for s in stmts {
                visitor.visit_statement(s)?;
            }
            Ok(())
        }
        Statement::Empty => Ok(()),
    }
}

pub fn walk_declarator<V: Visitor + ?Sized>(
    visitor: &mut V,
    decl: &Declarator,
) -> Result<(), V::Error> {
    match &decl.init {
        Some(init) => visitor.visit_expression(init),
        None => Ok(()),
    }
}

pub fn walk_expression<V: Visitor + ?Sized>(
    visitor: &mut V,
    expr: &Expr,
) -> Result<(), V::Error> {
    match &expr.kind {
        ExprKind::Number(_) | ExprKind::Boolean(_) | ExprKind::Identifier(_) => Ok(()),
        ExprKind::Array(elements) => {
            for e in elements {
                visitor.visit_expression(e)?;
            }
            Ok(())
        }
        ExprKind::Unary { argument, .. } | ExprKind::Update { argument, .. } => {
            visitor.visit_expression(argument)
        }
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            visitor.visit_expression(left)?;
            visitor.visit_expression(right)
        }
        ExprKind::Assign { target, value, .. } => {
            visitor.visit_expression(target)?;
            visitor.visit_expression(value)
        }
        ExprKind::Call { callee, arguments } => {
            visitor.visit_expression(callee)?;
            for arg in arguments {
                visitor.visit_expression(arg)?;
            }
            Ok(())
        }
        ExprKind::Member { object, property } => {
            visitor.visit_expression(object)?;
            match property {
                Property::Computed(index) => visitor.visit_expression(index),
                Property::Named(_) => Ok(()),
            }
        }
    }
}
