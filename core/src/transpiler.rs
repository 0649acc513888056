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

//! Entry point tying the pipeline together: source or AST in, a
//! `CompiledModule` out, and a `CallWrapper` to invoke it.

use std::sync::Arc;

use thiserror::Error;

use crate::ast::Program;
use crate::call_wrapper::CallWrapper;
use crate::error::CompileError;
use crate::hooks::{NoopHooks, TranspilerHooks};
use crate::loader::{load_unit, LoadError};
use crate::module_builder::ModuleBuilder;
use crate::parser::{parse_source, ParseError};
use crate::signatures::derive_signatures;
use crate::types::FunctionSignatures;
use crate::wasm_runner::CompiledModule;

#[derive(Error, Debug)]
pub enum TranspileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

#[derive(Clone)]
pub struct Transpiler {
    hooks: Arc<dyn TranspilerHooks>,
}

impl Default for Transpiler {
    fn default() -> Self {
        Transpiler {
            hooks: Arc::new(NoopHooks),
        }
    }
}

impl Transpiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(hooks: Arc<dyn TranspilerHooks>) -> Self {
        Transpiler { hooks }
    }

    pub fn hooks(&self) -> &dyn TranspilerHooks {
        &*self.hooks
    }

    /// Compile source text, deriving signatures from annotations and usage.
    pub fn transpile(&self, source: &str) -> Result<CompiledModule, TranspileError> {
        let program = parse_source(source, "<source>")?;
        let signatures = derive_signatures(&program);
        Ok(self.transpile_program(&program, signatures)?)
    }

    /// Compile source text against an explicit signature table.
    pub fn transpile_with_signatures(
        &self,
        source: &str,
        signatures: FunctionSignatures,
    ) -> Result<CompiledModule, TranspileError> {
        let program = parse_source(source, "<source>")?;
        Ok(self.transpile_program(&program, signatures)?)
    }

    /// Compile a JSON AST with its JSON signature table.
    pub fn transpile_json(
        &self,
        program_json: &str,
        signatures_json: &str,
    ) -> Result<CompiledModule, TranspileError> {
        let (program, signatures) = load_unit(program_json, signatures_json)?;
        Ok(self.transpile_program(&program, signatures)?)
    }

    pub fn transpile_program(
        &self,
        program: &Program,
        signatures: FunctionSignatures,
    ) -> Result<CompiledModule, CompileError> {
        self.hooks.before_compilation();
        let result = ModuleBuilder::new(&signatures)
            .build(program)
            .and_then(|built| CompiledModule::new(built, Arc::new(signatures)));
        self.hooks.after_compilation();
        result
    }

    /// A call wrapper reporting to this transpiler's hooks.
    pub fn call_wrapper<'a>(&'a self, module: &'a CompiledModule) -> CallWrapper<'a> {
        CallWrapper::new(module).with_hooks(&*self.hooks)
    }
}
