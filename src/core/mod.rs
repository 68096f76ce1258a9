// This module is the hub for the pipeline stages that do not touch the toolchain or the host
// runtime directly: request and interrupt types, the reference catalog and merge, source
// staging with its RAII cleanup guard, diagnostic parsing and classification, the error type
// shared by every stage, and per-service statistics. The toolchain and host modules build on
// these types; nothing here depends on a particular compiler or unit format.

pub mod diagnostics;
pub mod error;
pub mod references;
pub mod request;
pub mod session;
pub mod staging;

pub use diagnostics::{classify, failure_report, parse_output, Classification, Diagnostic, Severity, SourcePosition};
pub use error::{ScriptError, ScriptResult};
pub use references::{resolve_reference, ReferenceCatalog, ReferenceSet};
pub use request::{CancellationToken, CompileOptions, CompileRequest, Interrupt};
pub use session::{SessionStats, StatsRecorder};
pub use staging::{sanitize_unit_name, CleanupHook, SourceStager, StagedArtifacts};
