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

use crate::ast::Program;
use crate::types::FunctionSignatures;
use serde_json::from_str;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("JSON Parse Error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Signature table has no entry for function `{0}`")]
    MissingSignature(String),
}

/// Load a program AST from JSON. Expression ids in the input are ignored and
/// reassigned in pre-order.
pub fn load_program(json: &str) -> Result<Program, LoadError> {
    let mut program: Program = from_str(json)?;
    program.renumber();
    Ok(program)
}

pub fn load_signatures(json: &str) -> Result<FunctionSignatures, LoadError> {
    Ok(from_str(json)?)
}

/// Load a program together with its signature table, checking that every
/// named top-level function has a signature before anything is compiled.
pub fn load_unit(
    program_json: &str,
    signatures_json: &str,
) -> Result<(Program, FunctionSignatures), LoadError> {
    let program = load_program(program_json)?;
    let signatures = load_signatures(signatures_json)?;
    verify_signature_coverage(&program, &signatures)?;
    Ok((program, signatures))
}

fn verify_signature_coverage(
    program: &Program,
    signatures: &FunctionSignatures,
) -> Result<(), LoadError> {
    for func in program.functions() {
        if let Some(name) = &func.name {
            if !signatures.contains(name) {
                return Err(LoadError::MissingSignature(name.clone()));
            }
        }
    }
    Ok(())
}
