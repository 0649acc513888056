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

//! Instrumentation hooks.
//!
//! Four before/after pairs bracket the phases of a transpile-and-call round
//! trip. Hooks are a side channel: they see no data and cannot fail a call.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub trait TranspilerHooks: Send + Sync {
    fn before_compilation(&self) {}
    fn after_compilation(&self) {}

    /// Around building the memory layout and writing it into a fresh instance.
    fn before_import(&self) {}
    fn after_import(&self) {}

    fn before_execution(&self) {}
    fn after_execution(&self) {}

    /// Around copying output arrays back to the host.
    fn before_export(&self) {}
    fn after_export(&self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl TranspilerHooks for NoopHooks {}

pub(crate) static NOOP_HOOKS: NoopHooks = NoopHooks;

// =============================================================================
// Timing
// =============================================================================

/// Durations of the phases observed most recently. A phase that never
/// completed is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub compilation: Option<Duration>,
    pub import: Option<Duration>,
    pub execution: Option<Duration>,
    pub export: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Compilation,
    Import,
    Execution,
    Export,
}

#[derive(Debug, Default)]
struct TimingState {
    started: [Option<Instant>; 4],
    timing: Timing,
}

impl TimingState {
    fn start(&mut self, phase: Phase) {
        self.started[phase as usize] = Some(Instant::now());
    }

    fn stop(&mut self, phase: Phase) {
        let elapsed = self.started[phase as usize].take().map(|t| t.elapsed());
        let slot = match phase {
            Phase::Compilation => &mut self.timing.compilation,
            Phase::Import => &mut self.timing.import,
            Phase::Execution => &mut self.timing.execution,
            Phase::Export => &mut self.timing.export,
        };
        if elapsed.is_some() {
            *slot = elapsed;
        }
    }
}

/// Records how long each phase took. Concurrent calls overwrite each other's
/// numbers; use one recorder per thread for per-call figures.
#[derive(Debug, Default)]
pub struct TimingHooks {
    state: Mutex<TimingState>,
}

impl TimingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timing(&self) -> Timing {
        self.lock().timing
    }

    pub fn reset(&self) {
        *self.lock() = TimingState::default();
    }

    fn lock(&self) -> MutexGuard<'_, TimingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TranspilerHooks for TimingHooks {
    fn before_compilation(&self) {
        self.lock().start(Phase::Compilation);
    }
    fn after_compilation(&self) {
        self.lock().stop(Phase::Compilation);
    }
    fn before_import(&self) {
        self.lock().start(Phase::Import);
    }
    fn after_import(&self) {
        self.lock().stop(Phase::Import);
    }
    fn before_execution(&self) {
        self.lock().start(Phase::Execution);
    }
    fn after_execution(&self) {
        self.lock().stop(Phase::Execution);
    }
    fn before_export(&self) {
        self.lock().start(Phase::Export);
    }
    fn after_export(&self) {
        self.lock().stop(Phase::Export);
    }
}
