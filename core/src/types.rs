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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use wasm_encoder::ValType;

use crate::error::CompileError;

/// The static type lattice of the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Int32,
    Float64,
    Boolean,
    Int32Array,
    Float64Array,
}

impl ValueType {
    pub fn is_array(self) -> bool {
        matches!(self, ValueType::Int32Array | ValueType::Float64Array)
    }

    pub fn is_float(self) -> bool {
        self == ValueType::Float64
    }

    /// The WASM value type a value of this type travels as.
    /// Booleans are 0/1 and arrays are payload pointers, so only floats leave i32.
    pub fn val_type(self) -> ValType {
        match self {
            ValueType::Float64 => ValType::F64,
            _ => ValType::I32,
        }
    }

    /// Element type read out of an array of this type. Anything that is not a
    /// float array is addressed as 4-byte integers.
    pub fn element_type(self) -> ValueType {
        match self {
            ValueType::Float64Array => ValueType::Float64,
            _ => ValueType::Int32,
        }
    }

    /// Width in bytes of one array element (and of the length header in memory).
    pub fn element_size(self) -> u32 {
        match self {
            ValueType::Float64Array => 8,
            _ => 4,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int32 => write!(f, "int"),
            ValueType::Float64 => write!(f, "double"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Int32Array => write!(f, "int[]"),
            ValueType::Float64Array => write!(f, "double[]"),
        }
    }
}

/// Parameter and return types of one compiled function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub parameters: Vec<ValueType>,
    pub return_type: ValueType,
}

impl FunctionSignature {
    pub fn new(parameters: Vec<ValueType>, return_type: ValueType) -> Self {
        FunctionSignature {
            parameters,
            return_type,
        }
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub fn has_array_parameter(&self) -> bool {
        self.parameters.iter().any(|ty| ty.is_array())
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

/// Signature table of one compilation unit, keyed by function name.
///
/// Built once and then only read: the inference engine resolves call return
/// types through it, the code generator checks call arity, and the call
/// wrapper validates host arguments against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionSignatures {
    entries: HashMap<String, FunctionSignature>,
}

impl FunctionSignatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for hand-written tables.
    pub fn with(mut self, name: impl Into<String>, signature: FunctionSignature) -> Self {
        self.insert(name, signature);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, signature: FunctionSignature) {
        self.entries.insert(name.into(), signature);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSignature> {
        self.entries.get(name)
    }

    /// Lookup that treats an unknown name as a hard error.
    pub fn require(&self, name: &str) -> Result<&FunctionSignature, CompileError> {
        self.get(name)
            .ok_or_else(|| CompileError::MissingSignature(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FunctionSignature)> {
        self.entries.iter()
    }
}
