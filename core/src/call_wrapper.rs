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

//! Call marshalling between host values and a compiled module.
//!
//! Array arguments are packed into a fresh linear memory, one after another:
//!
//! ```text
//!   offset (aligned to element width)
//!   ┌──────────────┬──────────┬──────────┬─────
//!   │ length       │ elem 0   │ elem 1   │ ...
//!   │ i32 | i64 LE │          │          │
//!   └──────────────┴──────────┴──────────┴─────
//!                  ^ pointer passed to the function
//! ```
//!
//! The function reads `arr.length` as the 4-byte word just before the
//! pointer, which is the low half of the i64 header for float arrays.

use std::collections::BTreeMap;

use thiserror::Error;
use wasmtime::Val;

use crate::hooks::{TranspilerHooks, NOOP_HOOKS};
use crate::types::{FunctionSignature, ValueType};
use crate::wasm_runner::{CompiledModule, ModuleInstance, WasmRunError};

pub const PAGE_SIZE: u32 = 65536;

// =============================================================================
// Host Values
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Float64(f64),
    Boolean(bool),
    Int32Array(Vec<i32>),
    Float64Array(Vec<f64>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int32(_) => ValueType::Int32,
            Value::Float64(_) => ValueType::Float64,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Int32Array(_) => ValueType::Int32Array,
            Value::Float64Array(_) => ValueType::Float64Array,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    fn len(&self) -> usize {
        match self {
            Value::Int32Array(items) => items.len(),
            Value::Float64Array(items) => items.len(),
            _ => 0,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::Int32Array(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Float64Array(v)
    }
}

/// Number-to-int32 conversion with wrapping: NaN and infinities become 0,
/// everything else is truncated and reduced modulo 2^32.
pub fn to_int32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    value.trunc().rem_euclid(4294967296.0) as u32 as i32
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    #[error("no function name set")]
    MissingFunctionName,
    #[error("module has no function `{0}`")]
    UnknownFunction(String),
    #[error("function `{function}` takes {expected} arguments but {found} were given")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("argument {index} should be {expected} but was {found}")]
    ArgumentType {
        index: usize,
        expected: ValueType,
        found: ValueType,
    },
    #[error("output argument {0} does not exist")]
    OutputNotFound(usize),
    #[error("output argument {0} is not an array")]
    OutputNotArray(usize),
    #[error("output arguments requested but the call has no array arguments")]
    OutputWithoutArrays,
    #[error("cannot convert {0} to boolean")]
    BooleanConversion(i32),
    #[error("instantiation failed: {0}")]
    Instantiation(WasmRunError),
    #[error("execution failed: {0}")]
    Execution(WasmRunError),
    #[error("array arguments do not fit in a 32-bit address space")]
    LayoutOverflow,
}

// =============================================================================
// Memory Layout
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    I32(i32),
    I64(i64),
    F64(f64),
}

impl Cell {
    pub fn width(self) -> u32 {
        match self {
            Cell::I32(_) => 4,
            Cell::I64(_) | Cell::F64(_) => 8,
        }
    }

    fn write_to(self, out: &mut [u8]) {
        match self {
            Cell::I32(v) => out.copy_from_slice(&v.to_le_bytes()),
            Cell::I64(v) => out.copy_from_slice(&v.to_le_bytes()),
            Cell::F64(v) => out.copy_from_slice(&v.to_le_bytes()),
        }
    }
}

/// Byte offset to scalar cell, for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryLayout {
    cells: BTreeMap<u32, Cell>,
}

impl MemoryLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, offset: u32, cell: Cell) {
        self.cells.insert(offset, cell);
    }

    pub fn get(&self, offset: u32) -> Option<Cell> {
        self.cells.get(&offset).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// One past the last byte written.
    pub fn end(&self) -> u64 {
        self.cells
            .iter()
            .next_back()
            .map(|(offset, cell)| *offset as u64 + cell.width() as u64)
            .unwrap_or(0)
    }

    /// Pages needed to hold every cell.
    pub fn pages(&self) -> u32 {
        self.end().div_ceil(PAGE_SIZE as u64) as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Cell)> + '_ {
        self.cells.iter().map(|(offset, cell)| (*offset, *cell))
    }

    /// The layout as a contiguous image starting at offset 0.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.end() as usize];
        for (offset, cell) in self.iter() {
            let start = offset as usize;
            cell.write_to(&mut bytes[start..start + cell.width() as usize]);
        }
        bytes
    }
}

fn align_up(offset: u64, align: u64) -> u64 {
    offset.div_ceil(align) * align
}

/// Lay out every array argument. Returns the layout and, per argument, the
/// payload offset of arrays (`None` for scalars).
pub fn build_layout(args: &[Value]) -> Result<(MemoryLayout, Vec<Option<u32>>), MarshalError> {
    let mut layout = MemoryLayout::new();
    let mut payloads = Vec::with_capacity(args.len());
    let mut offset: u64 = 0;

    for arg in args {
        let width: u64 = match arg {
            Value::Int32Array(_) => 4,
            Value::Float64Array(_) => 8,
            _ => {
                payloads.push(None);
                continue;
            }
        };
        let len = arg.len() as u64;
        let header = align_up(offset, width);
        let payload = header + width;
        let end = payload + len * width;
        if end > u32::MAX as u64 {
            return Err(MarshalError::LayoutOverflow);
        }
        let header_at = header as u32;
        let payload_at = payload as u32;

        match arg {
            Value::Int32Array(items) => {
                let count = i32::try_from(items.len()).map_err(|_| MarshalError::LayoutOverflow)?;
                layout.insert(header_at, Cell::I32(count));
                for (i, item) in items.iter().enumerate() {
                    layout.insert(payload_at + 4 * i as u32, Cell::I32(*item));
                }
            }
            Value::Float64Array(items) => {
                layout.insert(header_at, Cell::I64(items.len() as i64));
                for (i, item) in items.iter().enumerate() {
                    layout.insert(payload_at + 8 * i as u32, Cell::F64(*item));
                }
            }
            _ => {}
        }

        payloads.push(Some(payload_at));
        offset = end;
    }

    Ok((layout, payloads))
}

// =============================================================================
// Call Wrapper
// =============================================================================

/// Invokes one function of a compiled module with host values.
pub struct CallWrapper<'a> {
    module: &'a CompiledModule,
    hooks: &'a dyn TranspilerHooks,
    function_name: Option<String>,
    out_parameters: Vec<usize>,
}

impl<'a> CallWrapper<'a> {
    pub fn new(module: &'a CompiledModule) -> Self {
        CallWrapper {
            module,
            hooks: &NOOP_HOOKS,
            function_name: None,
            out_parameters: Vec::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: &'a dyn TranspilerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn set_function_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.function_name = Some(name.into());
        self
    }

    /// Mark arguments whose memory contents are copied back after the call.
    pub fn set_out_parameters(&mut self, indices: &[usize]) -> &mut Self {
        self.out_parameters = indices.to_vec();
        self
    }

    pub fn call(&self, args: &mut [Value]) -> Result<Value, MarshalError> {
        let name = self
            .function_name
            .as_deref()
            .ok_or(MarshalError::MissingFunctionName)?;
        let signature = self
            .module
            .signature(name)
            .filter(|_| self.module.exports().iter().any(|e| e == name))
            .ok_or_else(|| MarshalError::UnknownFunction(name.to_string()))?;

        let scalars = check_arguments(name, signature, args)?;
        self.check_out_parameters(args)?;

        // --- Import ---
        self.hooks.before_import();
        let prepared = prepare_memory(self.module, args, scalars);
        self.hooks.after_import();
        let (mut instance, call_args, payloads) = prepared?;

        // --- Execution ---
        self.hooks.before_execution();
        let raw = instance.call(name, &call_args);
        self.hooks.after_execution();
        let raw = raw.map_err(MarshalError::Execution)?;

        // --- Export ---
        self.hooks.before_export();
        let synced = if !self.out_parameters.is_empty() && instance.has_memory() {
            self.sync_outputs(&instance, args, &payloads)
        } else {
            Ok(())
        };
        self.hooks.after_export();
        synced?;

        convert_result(signature.return_type, raw)
    }

    fn check_out_parameters(&self, args: &[Value]) -> Result<(), MarshalError> {
        if self.out_parameters.is_empty() {
            return Ok(());
        }
        if !args.iter().any(|arg| arg.value_type().is_array()) {
            return Err(MarshalError::OutputWithoutArrays);
        }
        for &index in &self.out_parameters {
            let arg = args.get(index).ok_or(MarshalError::OutputNotFound(index))?;
            if !arg.value_type().is_array() {
                return Err(MarshalError::OutputNotArray(index));
            }
        }
        Ok(())
    }

    fn sync_outputs(
        &self,
        instance: &ModuleInstance,
        args: &mut [Value],
        payloads: &[Option<u32>],
    ) -> Result<(), MarshalError> {
        for &index in &self.out_parameters {
            let Some(payload) = payloads.get(index).copied().flatten() else {
                continue;
            };
            let offset = payload as usize;
            match &mut args[index] {
                Value::Int32Array(items) => {
                    let bytes = instance
                        .read(offset, items.len() * 4)
                        .map_err(MarshalError::Execution)?;
                    for (item, chunk) in items.iter_mut().zip(bytes.chunks_exact(4)) {
                        *item = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    }
                }
                Value::Float64Array(items) => {
                    let bytes = instance
                        .read(offset, items.len() * 8)
                        .map_err(MarshalError::Execution)?;
                    for (item, chunk) in items.iter_mut().zip(bytes.chunks_exact(8)) {
                        let mut word = [0u8; 8];
                        word.copy_from_slice(chunk);
                        *item = f64::from_le_bytes(word);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Check shapes and convert scalars. Array arguments get a placeholder that
/// is replaced by their payload pointer once the layout exists.
fn check_arguments(
    name: &str,
    signature: &FunctionSignature,
    args: &[Value],
) -> Result<Vec<Val>, MarshalError> {
    if args.len() != signature.arity() {
        return Err(MarshalError::ArgumentCount {
            function: name.to_string(),
            expected: signature.arity(),
            found: args.len(),
        });
    }

    signature
        .parameters
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (expected, arg))| {
            let mismatch = || MarshalError::ArgumentType {
                index,
                expected: *expected,
                found: arg.value_type(),
            };
            match (expected, arg) {
                (ValueType::Int32, Value::Int32(v)) => Ok(Val::I32(*v)),
                (ValueType::Int32, Value::Float64(v)) => Ok(Val::I32(to_int32(*v))),
                (ValueType::Float64, Value::Int32(v)) => Ok(Val::F64((*v as f64).to_bits())),
                (ValueType::Float64, Value::Float64(v)) => Ok(Val::F64(v.to_bits())),
                (ValueType::Boolean, Value::Boolean(v)) => Ok(Val::I32(*v as i32)),
                (ValueType::Int32Array, Value::Int32Array(_))
                | (ValueType::Float64Array, Value::Float64Array(_)) => Ok(Val::I32(0)),
                _ => Err(mismatch()),
            }
        })
        .collect()
}

type Prepared = (ModuleInstance, Vec<Val>, Vec<Option<u32>>);

fn prepare_memory(
    module: &CompiledModule,
    args: &[Value],
    mut call_args: Vec<Val>,
) -> Result<Prepared, MarshalError> {
    if !args.iter().any(|arg| arg.value_type().is_array()) {
        let instance = module.instantiate(0).map_err(MarshalError::Instantiation)?;
        return Ok((instance, call_args, vec![None; args.len()]));
    }

    let (layout, payloads) = build_layout(args)?;
    let mut instance = module
        .instantiate(layout.pages())
        .map_err(MarshalError::Instantiation)?;
    if instance.has_memory() {
        instance
            .write(0, &layout.to_bytes())
            .map_err(MarshalError::Instantiation)?;
    }
    for (arg, payload) in call_args.iter_mut().zip(&payloads) {
        if let Some(offset) = payload {
            *arg = Val::I32(*offset as i32);
        }
    }
    Ok((instance, call_args, payloads))
}

fn convert_result(return_type: ValueType, raw: Val) -> Result<Value, MarshalError> {
    match (return_type, raw) {
        (ValueType::Boolean, Val::I32(0)) => Ok(Value::Boolean(false)),
        (ValueType::Boolean, Val::I32(1)) => Ok(Value::Boolean(true)),
        (ValueType::Boolean, Val::I32(other)) => Err(MarshalError::BooleanConversion(other)),
        (ValueType::Float64, Val::F64(bits)) => Ok(Value::Float64(f64::from_bits(bits))),
        (_, Val::I32(v)) => Ok(Value::Int32(v)),
        (expected, other) => Err(MarshalError::Execution(WasmRunError::new(
            format!("expected a {} result, got {:?}", expected, other),
            "call::results",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(0.0), 0);
        assert_eq!(to_int32(-1.9), -1);
        assert_eq!(to_int32(2147483648.0), i32::MIN);
        assert_eq!(to_int32(4294967297.0), 1);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::NEG_INFINITY), 0);
    }

    #[test]
    fn test_layout_single_int_array() {
        let (layout, payloads) = build_layout(&[Value::Int32Array(vec![1, 2, 4, 8])]).unwrap();
        assert_eq!(payloads, vec![Some(4)]);
        assert_eq!(layout.get(0), Some(Cell::I32(4)));
        assert_eq!(layout.get(16), Some(Cell::I32(8)));
        assert_eq!(layout.end(), 20);
        assert_eq!(layout.pages(), 1);
    }

    #[test]
    fn test_layout_aligns_float_arrays() {
        let args = [
            Value::Int32(7),
            Value::Int32Array(vec![1]),
            Value::Float64Array(vec![0.5, 1.5]),
        ];
        let (layout, payloads) = build_layout(&args).unwrap();
        // int array: header 0, payload 4..8; float header aligned to 8
        assert_eq!(payloads, vec![None, Some(4), Some(16)]);
        assert_eq!(layout.get(8), Some(Cell::I64(2)));
        assert_eq!(layout.get(24), Some(Cell::F64(1.5)));
        assert_eq!(layout.end(), 32);

        let bytes = layout.to_bytes();
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes(), "low word of header is the length");
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_empty_array_still_has_header() {
        let (layout, payloads) = build_layout(&[Value::Int32Array(vec![])]).unwrap();
        assert_eq!(payloads, vec![Some(4)]);
        assert_eq!(layout.get(0), Some(Cell::I32(0)));
        assert_eq!(layout.pages(), 1);
    }

    #[test]
    fn test_pages_round_up() {
        let (layout, _) = build_layout(&[Value::Int32Array(vec![0; 16383])]).unwrap();
        assert_eq!(layout.end(), 65536);
        assert_eq!(layout.pages(), 1);
        let (layout, _) = build_layout(&[Value::Int32Array(vec![0; 16384])]).unwrap();
        assert_eq!(layout.pages(), 2);
    }

    #[test]
    fn test_scalar_only_layout_is_empty() {
        let (layout, payloads) = build_layout(&[Value::Int32(1), Value::Boolean(true)]).unwrap();
        assert!(layout.is_empty());
        assert_eq!(layout.pages(), 0);
        assert_eq!(payloads, vec![None, None]);
    }

    #[test]
    fn test_argument_conversion() {
        let sig = FunctionSignature::new(
            vec![ValueType::Int32, ValueType::Float64, ValueType::Boolean],
            ValueType::Int32,
        );
        let vals = check_arguments(
            "f",
            &sig,
            &[Value::Float64(3.7), Value::Int32(2), Value::Boolean(true)],
        )
        .unwrap();
        assert_eq!(vals[0].i32(), Some(3));
        assert_eq!(vals[1].f64(), Some(2.0));
        assert_eq!(vals[2].i32(), Some(1));
    }

    #[test]
    fn test_argument_shape_mismatch() {
        let sig = FunctionSignature::new(vec![ValueType::Int32Array], ValueType::Int32);
        let err = check_arguments("f", &sig, &[Value::Float64Array(vec![])]).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"argument 0 should be int[] but was double[]");

        let sig = FunctionSignature::new(vec![ValueType::Boolean], ValueType::Int32);
        let err = check_arguments("f", &sig, &[Value::Int32(1)]).unwrap_err();
        assert_eq!(
            err,
            MarshalError::ArgumentType {
                index: 0,
                expected: ValueType::Boolean,
                found: ValueType::Int32
            }
        );

        let err = check_arguments("f", &sig, &[]).unwrap_err();
        assert!(matches!(err, MarshalError::ArgumentCount { expected: 1, found: 0, .. }));
    }

    #[test]
    fn test_result_conversion() {
        assert_eq!(convert_result(ValueType::Boolean, Val::I32(1)), Ok(Value::Boolean(true)));
        assert_eq!(
            convert_result(ValueType::Boolean, Val::I32(2)),
            Err(MarshalError::BooleanConversion(2))
        );
        assert_eq!(
            convert_result(ValueType::Float64, Val::F64(2.5f64.to_bits())),
            Ok(Value::Float64(2.5))
        );
        assert_eq!(convert_result(ValueType::Int32, Val::I32(-3)), Ok(Value::Int32(-3)));
    }
}
