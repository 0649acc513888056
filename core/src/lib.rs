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

//! Compiles a typed subset of JavaScript function declarations to
//! WebAssembly and calls the result from Rust.
//!
//! ```no_run
//! use wasm_transpiler::{Transpiler, Value};
//!
//! let transpiler = Transpiler::new();
//! let module = transpiler.transpile("function sum(arr) { var s = 0; for (var i = 0; i < arr.length; i++) s += arr[i]; return s; }")?;
//! let mut call = transpiler.call_wrapper(&module);
//! call.set_function_name("sum");
//! assert_eq!(call.call(&mut [Value::Int32Array(vec![1, 2, 3])])?, Value::Int32(6));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ast;
pub mod call_wrapper;
pub mod declarations;
pub mod error;
pub mod hooks;
pub mod inference;
pub mod loader;
pub mod memory_access;
pub mod module_builder;
pub mod parser;
pub mod signatures;
pub mod transpiler;
pub mod types;
pub mod visitor;
pub mod wasm_codegen;
pub mod wasm_runner;

pub use call_wrapper::{CallWrapper, MarshalError, Value};
pub use error::CompileError;
pub use hooks::{NoopHooks, Timing, TimingHooks, TranspilerHooks};
pub use transpiler::{TranspileError, Transpiler};
pub use types::{FunctionSignature, FunctionSignatures, ValueType};
pub use wasm_runner::{CompiledModule, WasmRunError};
