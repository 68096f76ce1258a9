// This module defines the error taxonomy of the script compilation service using the
// thiserror crate. ScriptError separates "the script is bad" (CompileFailure, carrying the
// aggregated diagnostic report and the original script text) from "the script compiled but
// could not be turned into an object" (UnitLoad, InstantiationFailure). Staging and
// Toolchain wrap the I/O errors that stop the pipeline before a verdict exists, and
// Cancelled/TimedOut report a caller-triggered interrupt. Cleanup failures and missing
// references never appear here: they are absorbed by the stager and the reference merger.
// ScriptResult<T> is the convenience alias used throughout the crate.

//! Error types for the script compilation service.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type returned by [`crate::ScriptCompiler`].
#[derive(Error, Debug)]
pub enum ScriptError {
    /// The toolchain reported an error diagnostic, exited non-zero, or
    /// produced no unit.
    #[error("script compilation failed:\n{report}")]
    CompileFailure {
        report: String,
        /// Source text of the failed script, for correlation by the caller.
        script: String,
    },

    /// The unit compiled but its first exported type could not be constructed.
    #[error("failed to instantiate `{type_name}`: {reason}")]
    InstantiationFailure { type_name: String, reason: String },

    /// The unit compiled but could not be read or mapped by the host loader.
    #[error("failed to load compiled unit: {reason}")]
    UnitLoad { reason: String },

    #[error("failed to stage script source at {path:?}")]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run compiler toolchain `{program}`")]
    Toolchain {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("compilation cancelled")]
    Cancelled,

    #[error("compilation timed out after {timeout:?}")]
    TimedOut { timeout: Duration },
}

impl ScriptError {
    /// True for failures caused by the script text itself.
    pub fn is_compile_failure(&self) -> bool {
        matches!(self, ScriptError::CompileFailure { .. })
    }

    /// Diagnostic report of a compile failure.
    pub fn report(&self) -> Option<&str> {
        match self {
            ScriptError::CompileFailure { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Result type alias for compilation operations.
pub type ScriptResult<T> = Result<T, ScriptError>;
