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

//! Static Type Inference
//!
//! Assigns a `ValueType` to every expression and every variable of one
//! function in a single pass. Parameter types come from the signature; a
//! local's type is fixed by the first value bound to it (declarator
//! initializer or plain `=`). Later assignments of a different type are not
//! re-unified: the code generator coerces them to the bound type.

use std::collections::HashMap;

use crate::ast::{
    AssignOp, BinaryOp, Declarator, Expr, ExprId, ExprKind, FunctionDeclaration, Property, UnaryOp,
};
use crate::error::CompileError;
use crate::types::{FunctionSignature, FunctionSignatures, ValueType};
use crate::visitor::{walk_function, Visitor};

pub type ExpressionTypeMap = HashMap<ExprId, ValueType>;

/// Result of inferring one function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionTypes {
    pub expressions: ExpressionTypeMap,
    pub variables: HashMap<String, ValueType>,
}

impl FunctionTypes {
    pub fn expression(&self, id: ExprId) -> Result<ValueType, CompileError> {
        self.expressions
            .get(&id)
            .copied()
            .ok_or(CompileError::MissingExpressionType(id))
    }

    pub fn variable(&self, name: &str) -> Option<ValueType> {
        self.variables.get(name).copied()
    }
}

pub fn infer_types(
    func: &FunctionDeclaration,
    signature: &FunctionSignature,
    signatures: &FunctionSignatures,
) -> Result<FunctionTypes, CompileError> {
    let function = func.display_name();
    if signature.arity() != func.params.len() {
        return Err(CompileError::SignatureArity {
            function: function.to_string(),
            expected: signature.arity(),
            found: func.params.len(),
        });
    }

    let mut engine = InferenceEngine {
        function: function.to_string(),
        signatures,
        types: FunctionTypes::default(),
    };
    for (index, (param, ty)) in func.params.iter().zip(&signature.parameters).enumerate() {
        let name = param
            .pattern
            .as_identifier()
            .ok_or_else(|| CompileError::PatternParameter {
                function: function.to_string(),
                index,
            })?;
        engine.types.variables.insert(name.to_string(), *ty);
    }

    walk_function(&mut engine, func)?;
    Ok(engine.types)
}

/// Type of a numeric literal: integral values that fit an i32 stay integers.
pub fn literal_type(value: f64) -> ValueType {
    if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        ValueType::Int32
    } else {
        ValueType::Float64
    }
}

fn numeric_result(left: ValueType, right: ValueType) -> ValueType {
    if left.is_float() || right.is_float() {
        ValueType::Float64
    } else {
        ValueType::Int32
    }
}

struct InferenceEngine<'a> {
    function: String,
    signatures: &'a FunctionSignatures,
    types: FunctionTypes,
}

impl InferenceEngine<'_> {
    fn bind_if_unbound(&mut self, name: &str, ty: ValueType) {
        self.types
            .variables
            .entry(name.to_string())
            .or_insert(ty);
    }

    fn infer(&mut self, expr: &Expr) -> Result<ValueType, CompileError> {
        let ty = match &expr.kind {
            ExprKind::Number(value) => literal_type(*value),
            ExprKind::Boolean(_) => ValueType::Boolean,
            ExprKind::Identifier(name) => self
                .types
                .variable(name)
                .ok_or_else(|| CompileError::UntypedVariable(name.clone()))?,
            ExprKind::Array(elements) => {
                for element in elements {
                    self.infer(element)?;
                }
                ValueType::Int32Array
            }
            ExprKind::Unary { op, argument } => {
                let arg = self.infer(argument)?;
                match op {
                    UnaryOp::Not => ValueType::Boolean,
                    UnaryOp::Minus | UnaryOp::Plus => numeric_result(arg, ValueType::Int32),
                }
            }
            ExprKind::Binary { op, left, right } => {
                if *op == BinaryOp::Pow {
                    return Err(CompileError::unsupported_operator(op));
                }
                let l = self.infer(left)?;
                let r = self.infer(right)?;
                if op.is_comparison() {
                    ValueType::Boolean
                } else {
                    numeric_result(l, r)
                }
            }
            ExprKind::Logical { left, right, .. } => {
                self.infer(left)?;
                self.infer(right)?;
                ValueType::Boolean
            }
            ExprKind::Update { argument, .. } => self.infer(argument)?,
            ExprKind::Assign { op, target, value } => {
                if *op == AssignOp::RemAssign {
                    return Err(CompileError::unsupported_operator(op));
                }
                let value_ty = self.infer(value)?;
                if *op == AssignOp::Assign {
                    if let Some(name) = target.as_identifier() {
                        self.bind_if_unbound(name, value_ty);
                    }
                }
                self.infer(target)?;
                value_ty
            }
            ExprKind::Call { callee, arguments } => {
                let name = callee.as_identifier().ok_or_else(|| {
                    CompileError::UnsupportedExpression(format!(
                        "call through a {}",
                        callee.kind.kind_name()
                    ))
                })?;
                let return_type = self.signatures.require(name)?.return_type;
                for arg in arguments {
                    self.infer(arg)?;
                }
                return_type
            }
            ExprKind::Member { object, property } => {
                let object_ty = self.infer(object)?;
                if !object_ty.is_array() {
                    let access = match property {
                        Property::Computed(_) => "index",
                        Property::Named(_) => "read a property of",
                    };
                    return Err(CompileError::NotAnArray {
                        access: access.to_string(),
                        found: object_ty,
                    });
                }
                match property {
                    Property::Computed(index) => {
                        self.infer(index)?;
                        object_ty.element_type()
                    }
                    Property::Named(name) if name == "length" => ValueType::Int32,
                    Property::Named(name) => {
                        return Err(CompileError::UnknownProperty(name.clone()))
                    }
                }
            }
        };
        self.types.expressions.insert(expr.id, ty);
        Ok(ty)
    }
}

impl Visitor for InferenceEngine<'_> {
    type Error = CompileError;

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
        if let Some(init) = &decl.init {
            let ty = self.infer(init)?;
            self.bind_if_unbound(name, ty);
        }
        Ok(())
    }

    fn visit_expression(&mut self, expr: &Expr) -> Result<(), CompileError> {
        self.infer(expr).map(|_| ())
    }
}
