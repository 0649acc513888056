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

//! Signature derivation from source annotations.
//!
//! Annotated parameters and results keep their annotation. An unannotated
//! parameter becomes `Int32Array` when the body subscripts it or reads its
//! `.length`, and `Int32` otherwise. Unannotated results are `Int32`; a
//! function returning a boolean or a double has to say so.

use std::collections::HashSet;
use std::convert::Infallible;

use crate::ast::{Expr, ExprKind, FunctionDeclaration, Program};
use crate::types::{FunctionSignature, FunctionSignatures, ValueType};
use crate::visitor::{walk_expression, walk_function, Visitor};

pub fn derive_signatures(program: &Program) -> FunctionSignatures {
    let mut signatures = FunctionSignatures::new();
    for func in program.functions() {
        if let Some(name) = &func.name {
            signatures.insert(name.clone(), derive_signature(func));
        }
    }
    signatures
}

pub fn derive_signature(func: &FunctionDeclaration) -> FunctionSignature {
    let mut usage = ArrayUsage::default();
    // Infallible visitor
    let _ = walk_function(&mut usage, func);

    let parameters = func
        .params
        .iter()
        .map(|param| match (param.annotation, param.pattern.as_identifier()) {
            (Some(ty), _) => ty,
            (None, Some(name)) if usage.indexed.contains(name) => ValueType::Int32Array,
            (None, _) => ValueType::Int32,
        })
        .collect();
    FunctionSignature::new(parameters, func.return_type.unwrap_or(ValueType::Int32))
}

/// Names that appear as the object of a member expression.
#[derive(Default)]
struct ArrayUsage {
    indexed: HashSet<String>,
}

impl Visitor for ArrayUsage {
    type Error = Infallible;

    fn visit_expression(&mut self, expr: &Expr) -> Result<(), Infallible> {
        if let ExprKind::Member { object, .. } = &expr.kind {
            if let Some(name) = object.as_identifier() {
                self.indexed.insert(name.to_string());
            }
        }
        walk_expression(self, expr)
    }
}
