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

use std::collections::HashSet;

use crate::ast::{Expr, ExprKind, FunctionDeclaration};
use crate::types::FunctionSignature;
use crate::visitor::{walk_expression, walk_function, Visitor};

/// Whether `func` needs linear memory: it references an array-typed
/// parameter, subscripts something, or reads `.length`.
pub fn is_memory_dependent(func: &FunctionDeclaration, signature: &FunctionSignature) -> bool {
    let array_params = func
        .params
        .iter()
        .zip(&signature.parameters)
        .filter(|(_, ty)| ty.is_array())
        .filter_map(|(param, _)| param.pattern.as_identifier())
        .collect();
    let mut finder = MemoryAccessFinder { array_params };
    walk_function(&mut finder, func).is_err()
}

/// Short-circuits the walk at the first memory access.
struct Found;

struct MemoryAccessFinder<'a> {
    array_params: HashSet<&'a str>,
}

impl Visitor for MemoryAccessFinder<'_> {
    type Error = Found;

    fn visit_expression(&mut self, expr: &Expr) -> Result<(), Found> {
        match &expr.kind {
            ExprKind::Member { .. } => return Err(Found),
            ExprKind::Identifier(name) if self.array_params.contains(name.as_str()) => {
                return Err(Found)
            }
            _ => {}
        }
        walk_expression(self, expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::types::ValueType;

    fn check(source: &str, params: Vec<ValueType>) -> bool {
        let program = parse_source(source, "test.js").unwrap();
        let func = program.functions().next().unwrap();
        is_memory_dependent(func, &FunctionSignature::new(params, ValueType::Int32))
    }

    #[test]
    fn test_scalar_function_is_independent() {
        assert!(!check(
            "function gcd(a, b) { while (b != 0) { var t = b; b = a % b; a = t; } return a; }",
            vec![ValueType::Int32, ValueType::Int32],
        ));
    }

    #[test]
    fn test_subscript_and_length_are_dependent() {
        assert!(check("function f(a) { return a[0]; }", vec![ValueType::Int32Array]));
        assert!(check("function f(a) { return a.length; }", vec![ValueType::Int32Array]));
    }

    #[test]
    fn test_array_parameter_reference_is_dependent() {
        // Passing the array along still needs the memory the caller filled
        assert!(check(
            "function f(a) { return g(a); }",
            vec![ValueType::Float64Array],
        ));
        assert!(!check("function f(a) { return g(a); }", vec![ValueType::Int32]));
    }

    #[test]
    fn test_unused_array_parameter_is_independent() {
        assert!(!check("function f(a, n) { return n; }", vec![ValueType::Int32Array, ValueType::Int32]));
    }
}
