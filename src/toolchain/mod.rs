// This module drives the external compiler toolchain. CompilerBackend is the capability the
// pipeline is parameterised by: it receives the ordered argument list for one job and reports
// back the diagnostics it emitted, its exit status and, on success, a UnitHandle. The handle
// hides whether the toolchain wrote the unit to the reserved output path (File) or kept it in
// memory (Image), so disk-writing and in-process toolchains share one pipeline. build_arguments
// lays out the flags in the order the toolchain expects: library target, optimisation and tail
// calls on, full paths, no implicit core library, non-deterministic builds, the target profile,
// the output path when the backend writes one, the staged source, and one reference flag per
// merged reference. CompilerInvoker pairs a backend with the profile and optionally serialises
// calls through a mutex when the backend is not reentrant.

//! Compiler toolchain invocation.
//!
//! # Backends
//!
//! - [`ProcessBackend`] runs a compiler executable and parses its output.
//! - [`InProcessBackend`] wraps a compiler entry point linked into the host.

pub mod in_process;
pub mod process;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::core::diagnostics::Diagnostic;
use crate::core::error::ScriptResult;
use crate::core::references::ReferenceSet;
use crate::core::request::Interrupt;
use crate::core::staging::StagedArtifacts;

pub use in_process::InProcessBackend;
pub use process::ProcessBackend;

/// Handle to a unit produced by the toolchain.
#[derive(Clone, PartialEq, Eq)]
pub enum UnitHandle {
    /// Written to disk at this path.
    File(PathBuf),
    /// Kept in memory by the toolchain.
    Image(Vec<u8>),
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitHandle::File(path) => f.debug_tuple("File").field(path).finish(),
            UnitHandle::Image(bytes) => write!(f, "Image({} bytes)", bytes.len()),
        }
    }
}

/// What one toolchain run reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Diagnostics in emission order.
    pub diagnostics: Vec<Diagnostic>,
    pub exit_status: i32,
    /// Present only when the toolchain produced a unit.
    pub unit: Option<UnitHandle>,
}

impl Invocation {
    pub fn succeeded(unit: UnitHandle, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            exit_status: 0,
            unit: Some(unit),
        }
    }

    pub fn failed(exit_status: i32, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            exit_status,
            unit: None,
        }
    }
}

/// One toolchain run: the full argument list and where output should land.
#[derive(Debug, Clone, Copy)]
pub struct CompileJob<'a> {
    pub arguments: &'a [String],
    /// Reserved output path, for backends that write to disk.
    pub output: Option<&'a Path>,
}

/// Capability to run the scripting language's compiler.
pub trait CompilerBackend: Send + Sync {
    /// Run the toolchain to completion. Implementations should poll
    /// `interrupt` where they can and return its error when it fires.
    fn invoke(&self, job: CompileJob<'_>, interrupt: &Interrupt) -> ScriptResult<Invocation>;

    /// Whether the toolchain writes its unit to the reserved output path.
    fn writes_output(&self) -> bool;

    /// Whether `invoke` may run concurrently with itself.
    fn is_reentrant(&self) -> bool {
        true
    }
}

/// Lay out the toolchain's argument list.
pub fn build_arguments(
    target_profile: &str,
    output: Option<&Path>,
    source: &Path,
    references: &ReferenceSet,
) -> Vec<String> {
    let mut args = vec![
        "--target:library".to_string(),
        "--optimize+".to_string(),
        "--tailcalls+".to_string(),
        "--fullpaths".to_string(),
        "--noframework".to_string(),
        "--deterministic-".to_string(),
        format!("--targetprofile:{}", target_profile),
    ];
    if let Some(output) = output {
        args.push(format!("-o:{}", output.display()));
    }
    args.push(source.display().to_string());
    args.extend(references.iter().map(|reference| format!("-r:{}", reference)));
    args
}

/// Shared entry point into a backend.
pub struct CompilerInvoker {
    backend: Arc<dyn CompilerBackend>,
    target_profile: String,
    gate: Option<Mutex<()>>,
}

impl CompilerInvoker {
    pub fn new(backend: Arc<dyn CompilerBackend>, target_profile: impl Into<String>) -> Self {
        let gate = (!backend.is_reentrant()).then(|| Mutex::new(()));
        Self {
            backend,
            target_profile: target_profile.into(),
            gate,
        }
    }

    pub fn writes_output(&self) -> bool {
        self.backend.writes_output()
    }

    /// Compile the staged source against `references`, blocking until the
    /// toolchain finishes.
    pub fn invoke(
        &self,
        staged: &StagedArtifacts,
        references: &ReferenceSet,
        interrupt: &Interrupt,
    ) -> ScriptResult<Invocation> {
        let output = staged.output_path().filter(|_| self.backend.writes_output());
        let arguments = build_arguments(&self.target_profile, output, staged.source_path(), references);
        log::trace!("Toolchain arguments: {:?}", arguments);

        let job = CompileJob {
            arguments: &arguments,
            output,
        };

        let invocation = match &self.gate {
            Some(gate) => {
                // Poisoning only means another compile panicked while holding the gate.
                let _guard = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                interrupt.check()?;
                self.backend.invoke(job, interrupt)?
            }
            None => self.backend.invoke(job, interrupt)?,
        };

        log::debug!(
            "Toolchain exited with status {} ({} diagnostics, unit: {})",
            invocation.exit_status,
            invocation.diagnostics.len(),
            invocation.unit.is_some()
        );
        Ok(invocation)
    }
}

impl fmt::Debug for CompilerInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerInvoker")
            .field("target_profile", &self.target_profile)
            .field("serialized", &self.gate.is_some())
            .finish()
    }
}
