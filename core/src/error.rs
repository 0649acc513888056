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

use thiserror::Error;

use crate::ast::ExprId;
use crate::types::ValueType;

/// Every way compiling a unit can fail. Compilation stops at the first error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    // ─── Structural ──────────────────────────────────────────────────────────
    #[error("file can only contain function declarations (top-level statement {0} is not one)")]
    NonFunctionTopLevel(usize),
    #[error("function expression has to have a name in order to be translated")]
    UnnamedFunction,
    #[error("parameter {index} of function `{function}` is not a plain identifier")]
    PatternParameter { function: String, index: usize },
    #[error("variable declarator in function `{function}` contains a non-identifier")]
    PatternDeclarator { function: String },
    #[error("unsupported operator `{operator}`{detail}")]
    UnsupportedOperator { operator: String, detail: String },
    #[error("unknown property `{0}` (only `length` is supported)")]
    UnknownProperty(String),
    #[error("assignment target must be an identifier or a subscript")]
    InvalidAssignmentTarget,
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),
    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),
    #[error("function `{callee}` takes {expected} arguments but {found} were given")]
    CallArity {
        callee: String,
        expected: usize,
        found: usize,
    },

    // ─── Resolution ──────────────────────────────────────────────────────────
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("call to unknown function `{0}`")]
    UnknownFunction(String),
    #[error("couldn't find signature of function `{0}`")]
    MissingSignature(String),
    #[error("variable `{0}` has no storage slot")]
    UnresolvedSlot(String),
    #[error("duplicate parameter `{name}` in function `{function}`")]
    DuplicateParameter { function: String, name: String },

    // ─── Inference ───────────────────────────────────────────────────────────
    #[error("type of variable `{0}` could not be inferred")]
    UntypedVariable(String),
    #[error("signature of `{function}` declares {expected} parameters but the function has {found}")]
    SignatureArity {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("expression {0:?} has no inferred type")]
    MissingExpressionType(ExprId),
    #[error("cannot {access} a value of type {found}")]
    NotAnArray { access: String, found: ValueType },

    // ─── Internal / backend ─────────────────────────────────────────────────
    #[error("internal code generator error: {0}")]
    Internal(String),
    #[error("generated module failed validation: {0}")]
    InvalidModule(String),
    #[error("WASM engine rejected the module: {0}")]
    Engine(String),
}

impl CompileError {
    pub(crate) fn unsupported_operator(operator: impl ToString) -> Self {
        CompileError::UnsupportedOperator {
            operator: operator.to_string(),
            detail: String::new(),
        }
    }

    pub(crate) fn unsupported_operator_for(operator: impl ToString, detail: &str) -> Self {
        CompileError::UnsupportedOperator {
            operator: operator.to_string(),
            detail: format!(" {}", detail),
        }
    }
}
