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

//! Slot allocation for parameters and locals.
//!
//! Every variable of a function lives in exactly one wasm local. Parameters
//! take the low slots in declaration order; locals follow in the order their
//! declaring statement is first reached by a pre-order walk of the body. Block
//! scoping is flattened: a name declared twice shares one slot.

use std::collections::HashMap;

use crate::ast::{AssignOp, Declarator, Expr, ExprKind, FunctionDeclaration};
use crate::error::CompileError;
use crate::visitor::{walk_declarator, walk_expression, walk_function, Visitor};

/// Name to slot mapping that remembers insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMapping {
    first_slot: u32,
    names: Vec<String>,
    slots: HashMap<String, u32>,
}

impl VariableMapping {
    fn starting_at(first_slot: u32) -> Self {
        VariableMapping {
            first_slot,
            ..Default::default()
        }
    }

    /// Returns `false` if the name already had a slot.
    fn declare(&mut self, name: &str) -> bool {
        if self.slots.contains_key(name) {
            return false;
        }
        let slot = self.first_slot + self.names.len() as u32;
        self.slots.insert(name.to_string(), slot);
        self.names.push(name.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.slots.get(name).copied()
    }

    pub fn slot(&self, name: &str) -> Result<u32, CompileError> {
        self.get(name)
            .ok_or_else(|| CompileError::UnresolvedSlot(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in slot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// `(name, slot)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.names
            .iter()
            .enumerate()
            .map(move |(i, name)| (name.as_str(), self.first_slot + i as u32))
    }
}

/// Parameter and local slots of one function. The two ranges are disjoint and
/// contiguous, parameters first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    pub parameters: VariableMapping,
    pub locals: VariableMapping,
}

impl Declarations {
    pub fn merged(&self) -> VariableMapping {
        let mut merged = VariableMapping::starting_at(0);
        for name in self.parameters.names().chain(self.locals.names()) {
            merged.declare(name);
        }
        merged
    }
}

pub fn resolve_declarations(func: &FunctionDeclaration) -> Result<Declarations, CompileError> {
    let function = func.display_name().to_string();
    let mut parameters = VariableMapping::starting_at(0);
    for (index, param) in func.params.iter().enumerate() {
        let name = param
            .pattern
            .as_identifier()
            .ok_or_else(|| CompileError::PatternParameter {
                function: function.clone(),
                index,
            })?;
        if !parameters.declare(name) {
            return Err(CompileError::DuplicateParameter {
                function: function.clone(),
                name: name.to_string(),
            });
        }
    }

    let mut resolver = LocalResolver {
        function,
        locals: VariableMapping::starting_at(parameters.len() as u32),
        parameters: &parameters,
    };
    walk_function(&mut resolver, func)?;
    let locals = resolver.locals;

    Ok(Declarations { parameters, locals })
}

struct LocalResolver<'a> {
    function: String,
    parameters: &'a VariableMapping,
    locals: VariableMapping,
}

impl LocalResolver<'_> {
    fn declare(&mut self, name: &str) {
        if !self.parameters.contains(name) {
            self.locals.declare(name);
        }
    }
}

impl Visitor for LocalResolver<'_> {
    type Error = CompileError;

    // Nested functions are rejected by the code generator; their bodies must
    // not leak slots into the enclosing function.
    fn visit_function(&mut self, _func: &FunctionDeclaration) -> Result<(), CompileError> {
        Ok(())
    }

    fn visit_declarator(&mut self, decl: &Declarator) -> Result<(), CompileError> {
        let name = decl
            .target
            .as_identifier()
            .ok_or_else(|| CompileError::PatternDeclarator {
                function: self.function.clone(),
            })?;
        self.declare(name);
        walk_declarator(self, decl)
    }

    fn visit_expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        if let ExprKind::Assign {
            op: AssignOp::Assign,
            target,
            ..
        } = &expr.kind
        {
            if let Some(name) = target.as_identifier() {
                self.declare(name);
            }
        }
        walk_expression(self, expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn resolve(source: &str) -> Result<Declarations, CompileError> {
        let program = parse_source(source, "test.js").unwrap();
        let func = program.functions().next().unwrap();
        resolve_declarations(func)
    }

    #[test]
    fn test_params_then_locals_in_first_occurrence_order() {
        let decls = resolve(
            "function f(a, b) { var s = 0; for (var i = 0; i < a; i++) { t = i; s += t; } var s = 1; return s; }",
        )
        .unwrap();
        let params: Vec<_> = decls.parameters.iter().collect();
        assert_eq!(params, vec![("a", 0), ("b", 1)]);
        let locals: Vec<_> = decls.locals.iter().collect();
        assert_eq!(locals, vec![("s", 2), ("i", 3), ("t", 4)]);

        let merged = decls.merged();
        assert_eq!(merged.len(), 5);
        assert_eq!(merged.get("t"), Some(4));
        assert_eq!(merged.get("a"), Some(0));
    }

    #[test]
    fn test_assignment_to_parameter_does_not_allocate() {
        let decls = resolve("function f(n) { n = n - 1; var n = 2; return n; }").unwrap();
        assert!(decls.locals.is_empty());
        assert_eq!(decls.merged().len(), 1);
    }

    #[test]
    fn test_unresolved_slot() {
        let decls = resolve("function f(a) { return a; }").unwrap();
        assert_eq!(
            decls.merged().slot("zz"),
            Err(CompileError::UnresolvedSlot("zz".to_string()))
        );
    }

    #[test]
    fn test_pattern_parameter_rejected() {
        let err = resolve("function f(a, [b, c]) { return a; }").unwrap_err();
        assert_eq!(
            err,
            CompileError::PatternParameter {
                function: "f".to_string(),
                index: 1
            }
        );
    }

    #[test]
    fn test_pattern_declarator_rejected() {
        let err = resolve("function g(a) { var {x, y} = a; return 0; }").unwrap_err();
        assert!(matches!(err, CompileError::PatternDeclarator { ref function } if function == "g"));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = resolve("function f(a, a) { return a; }").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"duplicate parameter `a` in function `f`");
    }
}
