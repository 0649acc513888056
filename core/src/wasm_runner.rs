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

//! Wasmtime Runtime Execution for transpiled modules.
//!
//! A `CompiledModule` owns the validated binary and its wasmtime compilation.
//! Every call gets a fresh Store, a fresh linear memory (when the module
//! imports one) and a fresh instance, so nothing is shared between calls.

use std::fmt;
use std::sync::Arc;
use wasmtime::{Engine, Instance, Linker, Memory, MemoryType, Module, Store, Val};

use crate::error::CompileError;
use crate::module_builder::{BuiltModule, MEMORY_IMPORT_MODULE, MEMORY_IMPORT_NAME};
use crate::types::{FunctionSignature, FunctionSignatures};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct WasmRunError {
    pub message: String,
    pub context: String,
}

impl WasmRunError {
    pub(crate) fn new(message: String, context: &str) -> Self {
        WasmRunError {
            message,
            context: context.to_string(),
        }
    }
}

impl fmt::Display for WasmRunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.context, self.message)
    }
}

impl std::error::Error for WasmRunError {}

// =============================================================================
// Compiled Module
// =============================================================================

/// Immutable result of transpiling one unit. Cheap to share across threads.
#[derive(Clone)]
pub struct CompiledModule {
    bytes: Arc<[u8]>,
    engine: Engine,
    module: Module,
    signatures: Arc<FunctionSignatures>,
    imports_memory: bool,
    exports: Vec<String>,
}

impl fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompiledModule")
            .field("bytes", &self.bytes.len())
            .field("imports_memory", &self.imports_memory)
            .field("exports", &self.exports)
            .finish()
    }
}

impl CompiledModule {
    /// Compile a validated binary with wasmtime.
    pub fn new(built: BuiltModule, signatures: Arc<FunctionSignatures>) -> Result<Self, CompileError> {
        let engine = Engine::default();
        let module = Module::from_binary(&engine, &built.bytes)
            .map_err(|e| CompileError::Engine(format!("{:#}", e)))?;
        Ok(CompiledModule {
            bytes: built.bytes.into(),
            engine,
            module,
            signatures,
            imports_memory: built.imports_memory,
            exports: built.exports,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn imports_memory(&self) -> bool {
        self.imports_memory
    }

    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    pub fn signatures(&self) -> &Arc<FunctionSignatures> {
        &self.signatures
    }

    pub fn signature(&self, name: &str) -> Option<&FunctionSignature> {
        self.signatures.get(name)
    }

    /// Instantiate against a fresh memory of `pages` pages. Modules that do
    /// not import memory ignore `pages`.
    pub fn instantiate(&self, pages: u32) -> Result<ModuleInstance, WasmRunError> {
        let mut store = Store::new(&self.engine, ());
        let mut linker = Linker::<()>::new(&self.engine);

        let memory = if self.imports_memory {
            let memory = Memory::new(&mut store, MemoryType::new(pages, None)).map_err(|e| {
                WasmRunError::new(
                    format!("Failed to allocate {} pages: {:#}", pages, e),
                    "instantiate::memory",
                )
            })?;
            linker
                .define(&store, MEMORY_IMPORT_MODULE, MEMORY_IMPORT_NAME, memory)
                .map_err(|e| {
                    WasmRunError::new(format!("Failed to link memory: {:#}", e), "instantiate::link")
                })?;
            Some(memory)
        } else {
            None
        };

        let instance = linker.instantiate(&mut store, &self.module).map_err(|e| {
            WasmRunError::new(format!("Failed to instantiate: {:#}", e), "instantiate")
        })?;

        Ok(ModuleInstance {
            store,
            instance,
            memory,
        })
    }
}

// =============================================================================
// Per-Call Instance
// =============================================================================

pub struct ModuleInstance {
    store: Store<()>,
    instance: Instance,
    memory: Option<Memory>,
}

impl ModuleInstance {
    pub fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    /// Current size of linear memory in bytes (0 without memory).
    pub fn memory_size(&self) -> usize {
        self.memory
            .map(|memory| memory.data(&self.store).len())
            .unwrap_or(0)
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), WasmRunError> {
        let memory = self.require_memory("write")?;
        let data = memory.data_mut(&mut self.store);
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                WasmRunError::new(
                    format!("Write of {} bytes at {} is out of bounds", bytes.len(), offset),
                    "write",
                )
            })?;
        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8], WasmRunError> {
        let memory = self.require_memory("read")?;
        let data = memory.data(&self.store);
        offset
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .map(|end| &data[offset..end])
            .ok_or_else(|| {
                WasmRunError::new(
                    format!("Read of {} bytes at {} is out of bounds", len, offset),
                    "read",
                )
            })
    }

    fn require_memory(&self, context: &str) -> Result<Memory, WasmRunError> {
        self.memory
            .ok_or_else(|| WasmRunError::new("Module has no linear memory".to_string(), context))
    }

    /// Call an exported function and return its single result.
    pub fn call(&mut self, name: &str, args: &[Val]) -> Result<Val, WasmRunError> {
        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| WasmRunError::new(format!("Export '{}' not found", name), "call::get_func"))?;

        let result_count = func.ty(&self.store).results().len();
        let mut results = vec![Val::I32(0); result_count];
        func.call(&mut self.store, args, &mut results).map_err(|e| {
            WasmRunError::new(format!("Call to '{}' trapped: {:#}", name, e), "call")
        })?;

        results.into_iter().next().ok_or_else(|| {
            WasmRunError::new(format!("'{}' returned no value", name), "call::results")
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_builder::ModuleBuilder;
    use crate::parser::parse_source;
    use crate::signatures::derive_signatures;

    fn compile(source: &str) -> CompiledModule {
        let program = parse_source(source, "test.js").unwrap();
        let signatures = derive_signatures(&program);
        let built = ModuleBuilder::new(&signatures).build(&program).unwrap();
        CompiledModule::new(built, Arc::new(signatures)).unwrap()
    }

    #[test]
    fn test_call_exported_function() {
        let module = compile("function add(a, b) { return a + b; }");
        let mut instance = module.instantiate(0).unwrap();
        assert!(!instance.has_memory());
        let result = instance.call("add", &[Val::I32(2), Val::I32(40)]).unwrap();
        assert_eq!(result.i32(), Some(42));
    }

    #[test]
    fn test_integer_wrapping() {
        let module = compile("function inc(a) { return a + 1; }");
        let mut instance = module.instantiate(0).unwrap();
        let result = instance.call("inc", &[Val::I32(i32::MAX)]).unwrap();
        assert_eq!(result.i32(), Some(i32::MIN));
    }

    #[test]
    fn test_memory_is_fresh_per_instance() {
        let module = compile("function first(a) { a[0] = a[0] + 1; return a[0]; }");
        assert!(module.imports_memory());

        let mut instance = module.instantiate(1).unwrap();
        assert_eq!(instance.memory_size(), 65536);
        instance.write(0, &1i32.to_le_bytes()).unwrap();
        instance.write(4, &41i32.to_le_bytes()).unwrap();
        let result = instance.call("first", &[Val::I32(4)]).unwrap();
        assert_eq!(result.i32(), Some(42));
        assert_eq!(instance.read(4, 4).unwrap(), &42i32.to_le_bytes());

        let again = module.instantiate(1).unwrap();
        assert_eq!(again.read(4, 4).unwrap(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_out_of_bounds_access_is_reported() {
        let module = compile("function first(a) { return a[0]; }");
        let mut instance = module.instantiate(0).unwrap();
        assert_eq!(instance.memory_size(), 0);
        assert!(instance.write(0, &[1]).is_err());
        let err = instance.call("first", &[Val::I32(0)]).unwrap_err();
        assert_eq!(err.context, "call");
    }

    #[test]
    fn test_missing_export() {
        let module = compile("function add(a, b) { return a + b; }");
        let mut instance = module.instantiate(0).unwrap();
        let err = instance.call("sub", &[]).unwrap_err();
        assert_eq!(err.to_string(), "[call::get_func] Export 'sub' not found");
    }

    #[test]
    fn test_compiled_module_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CompiledModule>();
    }

    #[test]
    fn test_engine_rejects_garbage() {
        let built = BuiltModule {
            bytes: b"\0asm\x02\0\0\0".to_vec(),
            imports_memory: false,
            exports: vec![],
        };
        let err = CompiledModule::new(built, Arc::new(FunctionSignatures::new())).unwrap_err();
        assert!(matches!(err, CompileError::Engine(_)), "got {:?}", err);
    }
}
