// This module tracks per-service compilation statistics. The service is shared across threads,
// so SessionStats is recorded through atomic counters in StatsRecorder and read back as a plain
// snapshot. Counters cover requests started, successful compilations split into instances and
// no-instance results, compile failures (bad scripts), post-compilation faults (unit loading
// and instantiation), interrupted requests, and other pipeline errors (staging, toolchain
// launch). The Display implementation prints a short human-readable summary.

//! Compilation statistics for a service instance.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::ScriptError;

/// Snapshot of a service's counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Requests that entered the pipeline.
    pub requests: usize,

    /// Successful compilations that returned an instance.
    pub instances: usize,

    /// Successful compilations whose unit exported no types.
    pub empty_units: usize,

    /// Requests rejected by the toolchain.
    pub compile_failures: usize,

    /// Units that compiled but could not be loaded or instantiated.
    pub runtime_failures: usize,

    /// Requests stopped by cancellation or timeout.
    pub interrupted: usize,

    /// Staging or toolchain I/O failures.
    pub other_failures: usize,
}

impl SessionStats {
    pub fn succeeded(&self) -> usize {
        self.instances + self.empty_units
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Script Compilation Statistics:")?;
        writeln!(f, "  Requests: {}", self.requests)?;
        writeln!(
            f,
            "  Succeeded: {} ({} instances, {} empty units)",
            self.succeeded(),
            self.instances,
            self.empty_units
        )?;
        writeln!(f, "  Compile failures: {}", self.compile_failures)?;
        writeln!(f, "  Runtime failures: {}", self.runtime_failures)?;
        writeln!(f, "  Interrupted: {}", self.interrupted)?;
        writeln!(f, "  Other failures: {}", self.other_failures)?;
        Ok(())
    }
}

/// Thread-safe recorder behind [`SessionStats`].
#[derive(Debug, Default)]
pub struct StatsRecorder {
    requests: AtomicUsize,
    instances: AtomicUsize,
    empty_units: AtomicUsize,
    compile_failures: AtomicUsize,
    runtime_failures: AtomicUsize,
    interrupted: AtomicUsize,
    other_failures: AtomicUsize,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, produced_instance: bool) {
        let counter = if produced_instance {
            &self.instances
        } else {
            &self.empty_units
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &ScriptError) {
        let counter = match error {
            ScriptError::CompileFailure { .. } => &self.compile_failures,
            ScriptError::InstantiationFailure { .. } | ScriptError::UnitLoad { .. } => &self.runtime_failures,
            ScriptError::Cancelled | ScriptError::TimedOut { .. } => &self.interrupted,
            ScriptError::Staging { .. } | ScriptError::Toolchain { .. } => &self.other_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            requests: self.requests.load(Ordering::Relaxed),
            instances: self.instances.load(Ordering::Relaxed),
            empty_units: self.empty_units.load(Ordering::Relaxed),
            compile_failures: self.compile_failures.load(Ordering::Relaxed),
            runtime_failures: self.runtime_failures.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            other_failures: self.other_failures.load(Ordering::Relaxed),
        }
    }
}
