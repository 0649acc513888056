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

//! Module assembly.
//!
//! Runs the per-function pipeline (slots, inference, lowering) over every
//! top-level function and packs the results into one validated module:
//!
//! ```text
//! (module
//!   (type ...)                                      ;; one per function
//!   (import "transpilerImports" "memory" (memory 0)) ;; only if needed
//!   (func ...)
//!   (export "<name>" (func i)) ...
//!   (export "memory" (memory 0))                    ;; only if needed
//!   (@custom "name" ...))
//! ```

use std::collections::HashMap;

use wasm_encoder::{
    CodeSection, EntityType, ExportKind, ExportSection, FunctionSection, ImportSection,
    IndirectNameMap, MemoryType, Module, NameMap, NameSection, TypeSection,
};

use crate::ast::{FunctionDeclaration, Program, Statement};
use crate::declarations::resolve_declarations;
use crate::error::CompileError;
use crate::inference::infer_types;
use crate::memory_access::is_memory_dependent;
use crate::types::FunctionSignatures;
use crate::wasm_codegen::{generate_function, FunctionContext, GeneratedFunction};

pub const MEMORY_IMPORT_MODULE: &str = "transpilerImports";
pub const MEMORY_IMPORT_NAME: &str = "memory";
pub const MEMORY_EXPORT_NAME: &str = "memory";

/// A validated module binary plus what the runner needs to know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltModule {
    pub bytes: Vec<u8>,
    pub imports_memory: bool,
    /// Exported function names, in function index order.
    pub exports: Vec<String>,
}

pub struct ModuleBuilder<'a> {
    signatures: &'a FunctionSignatures,
}

impl<'a> ModuleBuilder<'a> {
    pub fn new(signatures: &'a FunctionSignatures) -> Self {
        Self { signatures }
    }

    pub fn build(&self, program: &Program) -> Result<BuiltModule, CompileError> {
        let functions = collect_functions(program)?;
        let function_indices: HashMap<String, u32> = functions
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.to_string(), i as u32))
            .collect();

        // Memory dependence has to be known before any body is generated.
        let mut imports_memory = false;
        for (name, func) in &functions {
            let signature = self.signatures.require(name)?;
            imports_memory |= is_memory_dependent(func, signature);
        }

        let mut generated = Vec::with_capacity(functions.len());
        for (name, func) in &functions {
            let signature = self.signatures.require(name)?;
            let variables = resolve_declarations(func)?.merged();
            let types = infer_types(func, signature, self.signatures)?;
            generated.push(generate_function(&FunctionContext {
                func,
                signature,
                signatures: self.signatures,
                variables: &variables,
                types: &types,
                function_indices: &function_indices,
            })?);
        }

        let bytes = emit_module(&generated, imports_memory);
        validate(&bytes)?;

        Ok(BuiltModule {
            bytes,
            imports_memory,
            exports: generated.into_iter().map(|f| f.name).collect(),
        })
    }
}

/// Top-level functions with their names; anything else at the top level is
/// an error.
fn collect_functions(program: &Program) -> Result<Vec<(&str, &FunctionDeclaration)>, CompileError> {
    program
        .body
        .iter()
        .enumerate()
        .map(|(index, stmt)| match stmt {
            Statement::Function(func) => match &func.name {
                Some(name) => Ok((name.as_str(), func)),
                None => Err(CompileError::UnnamedFunction),
            },
            _ => Err(CompileError::NonFunctionTopLevel(index)),
        })
        .collect()
}

fn emit_module(functions: &[GeneratedFunction], imports_memory: bool) -> Vec<u8> {
    let mut module = Module::new();

    // --- Type Section ---
    let mut types = TypeSection::new();
    for func in functions {
        types
            .ty()
            .function(func.params.iter().copied(), func.results.iter().copied());
    }
    module.section(&types);

    // --- Import Section ---
    if imports_memory {
        let mut imports = ImportSection::new();
        imports.import(
            MEMORY_IMPORT_MODULE,
            MEMORY_IMPORT_NAME,
            EntityType::Memory(MemoryType {
                minimum: 0,
                maximum: None,
                memory64: false,
                shared: false,
                page_size_log2: None,
            }),
        );
        module.section(&imports);
    }

    // --- Function Section ---
    let mut function_section = FunctionSection::new();
    for (type_index, _) in functions.iter().enumerate() {
        function_section.function(type_index as u32);
    }
    module.section(&function_section);

    // --- Export Section ---
    let mut exports = ExportSection::new();
    for (index, func) in functions.iter().enumerate() {
        exports.export(&func.name, ExportKind::Func, index as u32);
    }
    if imports_memory {
        exports.export(MEMORY_EXPORT_NAME, ExportKind::Memory, 0);
    }
    module.section(&exports);

    // --- Code Section ---
    let mut code = CodeSection::new();
    for func in functions {
        code.function(&func.encode_body());
    }
    module.section(&code);

    // --- Name Section ---
    let mut function_names = NameMap::new();
    let mut local_names = IndirectNameMap::new();
    for (index, func) in functions.iter().enumerate() {
        function_names.append(index as u32, &func.name);
        let mut locals = NameMap::new();
        for (local, name) in func.local_names.iter().enumerate() {
            locals.append(local as u32, name);
        }
        local_names.append(index as u32, &locals);
    }
    let mut names = NameSection::new();
    names.functions(&function_names);
    names.locals(&local_names);
    module.section(&names);

    module.finish()
}

fn validate(bytes: &[u8]) -> Result<(), CompileError> {
    wasmparser::Validator::new()
        .validate_all(bytes)
        .map(|_| ())
        .map_err(|e| CompileError::InvalidModule(e.to_string()))
}
