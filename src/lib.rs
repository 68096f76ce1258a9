//! scriptc - runtime script compilation.
//!
//! Compiles script source text into a unit with an external compiler
//! toolchain, loads the unit into the host process, and returns a default
//! instance of its first exported type. Compilation errors come back as a
//! single human-readable report.
//!
//! # Primary Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use scriptc::{CompilerConfig, ProcessBackend, ScriptCompiler};
//!
//! let backend = ProcessBackend::from_env().expect("SCRIPTC_COMPILER is not set");
//! let compiler = ScriptCompiler::new(Arc::new(backend), CompilerConfig::from_env());
//!
//! match compiler.compile("type Greeter() = ...", &["/opt/libs/Helpers.dll"], "greeter") {
//!     Ok(Some(instance)) => println!("built {}", instance.type_name()),
//!     Ok(None) => println!("script exports no types"),
//!     Err(err) => eprintln!("{}", err),
//! }
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Requests, references, staging, diagnostics, errors and statistics
//! - [`toolchain`] - Compiler backends and argument construction
//! - [`host`] - Loaded-unit enumeration, unit loading and instantiation
//! - [`config`] - Scratch directory, extensions, target profile, runtime layout
//! - [`service`] - The [`ScriptCompiler`] pipeline

pub mod config;
pub mod core;
pub mod host;
pub mod service;
pub mod toolchain;

pub use config::{CompilerConfig, CoreDirectory, RuntimeLayout};
pub use self::core::{
    // Requests
    CancellationToken, CompileOptions, CompileRequest,
    // References
    ReferenceCatalog, ReferenceSet,
    // Staging
    CleanupHook, SourceStager, StagedArtifacts,
    // Diagnostics
    Classification, Diagnostic, Severity, SourcePosition,
    // Errors and statistics
    ScriptError, ScriptResult, SessionStats,
};
pub use host::{Instance, LoadedUnit, LoadedUnits, ModuleInfo, NativeObject, NativeUnitLoader, ProcessModules, UnitLoader};
pub use service::{ScriptCompiler, ScriptCompilerBuilder};
pub use toolchain::{CompilerBackend, CompilerInvoker, InProcessBackend, Invocation, ProcessBackend, UnitHandle};
