// This module wires the pipeline together. ScriptCompiler owns the read-only reference catalog
// (built once, when the service is constructed), a SourceStager for the scratch directory, a
// CompilerInvoker around the shared backend, and the host's UnitLoader. A compile request flows
// through reference merging, staging, toolchain invocation, classification and, on success,
// materialization. The StagedArtifacts guard is a local of run(), so the scratch files are
// removed after materialization on every exit path: success, compile failure, load or
// instantiation failure, interrupt, or panic. The service is Sync; concurrent callers share the
// catalog and the backend and own everything else.

//! The script compilation service.

use std::fmt;
use std::sync::Arc;

use crate::config::CompilerConfig;
use crate::core::diagnostics::{classify, Classification};
use crate::core::error::{ScriptError, ScriptResult};
use crate::core::references::ReferenceCatalog;
use crate::core::request::{CompileOptions, CompileRequest};
use crate::core::session::{SessionStats, StatsRecorder};
use crate::core::staging::{CleanupHook, SourceStager};
use crate::host::{materialize, Instance, LoadedUnits, NativeUnitLoader, ProcessModules, UnitLoader};
use crate::toolchain::{CompilerBackend, CompilerInvoker};

/// Compiles script source into instances.
pub struct ScriptCompiler {
    catalog: Arc<ReferenceCatalog>,
    stager: SourceStager,
    invoker: CompilerInvoker,
    loader: Arc<dyn UnitLoader>,
    stats: StatsRecorder,
}

impl ScriptCompiler {
    /// Service producing native units, with the catalog built from
    /// `config` and the current process's loaded units.
    pub fn new(backend: Arc<dyn CompilerBackend>, config: CompilerConfig) -> Self {
        Self::native(backend, config, None)
    }

    /// Like [`ScriptCompiler::new`], reporting scratch files that could not
    /// be removed to `cleanup_hook`.
    pub fn native(backend: Arc<dyn CompilerBackend>, config: CompilerConfig, cleanup_hook: Option<CleanupHook>) -> Self {
        let loader = Arc::new(NativeUnitLoader::new(&config.scratch_dir).with_cleanup_hook(cleanup_hook.clone()));
        let builder = Self::builder(backend, loader).config(config);
        match cleanup_hook {
            Some(hook) => builder.cleanup_hook(hook).build(),
            None => builder.build(),
        }
    }

    pub fn builder(backend: Arc<dyn CompilerBackend>, loader: Arc<dyn UnitLoader>) -> ScriptCompilerBuilder {
        ScriptCompilerBuilder {
            backend,
            loader,
            config: CompilerConfig::default(),
            catalog: None,
            loaded_units: None,
            cleanup_hook: None,
        }
    }

    pub fn catalog(&self) -> &ReferenceCatalog {
        &self.catalog
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.snapshot()
    }

    /// Compile `source` and instantiate its first exported type.
    ///
    /// Returns `Ok(None)` when the script compiles but exports no types.
    /// References that do not exist are ignored.
    pub fn compile<S: AsRef<str>>(
        &self,
        source: &str,
        additional_references: &[S],
        unit_name: &str,
    ) -> ScriptResult<Option<Instance>> {
        let request = CompileRequest::new(source, unit_name)
            .with_references(additional_references.iter().map(|reference| reference.as_ref()));
        self.compile_request(&request, &CompileOptions::default())
    }

    /// Like [`ScriptCompiler::compile`], with a timeout or cancellation token.
    pub fn compile_request(&self, request: &CompileRequest, options: &CompileOptions) -> ScriptResult<Option<Instance>> {
        self.stats.record_request();
        let result = self.run(request, options);
        match &result {
            Ok(instance) => self.stats.record_success(instance.is_some()),
            Err(err) => self.stats.record_failure(err),
        }
        result
    }

    fn run(&self, request: &CompileRequest, options: &CompileOptions) -> ScriptResult<Option<Instance>> {
        let interrupt = options.start();
        log::debug!(
            "Compiling script unit '{}' ({} bytes, {} extra references)",
            request.unit_name(),
            request.source().len(),
            request.additional_references().len()
        );

        let references = self.catalog.merge(request.additional_references());
        interrupt.check()?;

        let staged = self
            .stager
            .stage(request.unit_name(), request.source(), self.invoker.writes_output())?;
        let invocation = self.invoker.invoke(&staged, &references, &interrupt)?;

        match classify(invocation) {
            Classification::Failure { report } => {
                log::debug!("Script unit '{}' failed to compile", request.unit_name());
                Err(ScriptError::CompileFailure {
                    report,
                    script: request.source().to_string(),
                })
            }
            Classification::Success(unit) => {
                interrupt.check()?;
                let instance = materialize(self.loader.as_ref(), &unit)?;
                log::debug!(
                    "Script unit '{}' compiled ({})",
                    request.unit_name(),
                    instance.as_ref().map_or("no instance", Instance::type_name)
                );
                Ok(instance)
            }
        }
    }
}

impl fmt::Debug for ScriptCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptCompiler")
            .field("references", &self.catalog.baseline().len())
            .field("stager", &self.stager)
            .field("invoker", &self.invoker)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ScriptCompiler`].
pub struct ScriptCompilerBuilder {
    backend: Arc<dyn CompilerBackend>,
    loader: Arc<dyn UnitLoader>,
    config: CompilerConfig,
    catalog: Option<Arc<ReferenceCatalog>>,
    loaded_units: Option<Box<dyn LoadedUnits>>,
    cleanup_hook: Option<CleanupHook>,
}

impl ScriptCompilerBuilder {
    pub fn config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a prebuilt catalog instead of building one from the config.
    pub fn catalog(mut self, catalog: Arc<ReferenceCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Source of the loaded-unit snapshot. Defaults to [`ProcessModules`].
    pub fn loaded_units(mut self, loaded_units: impl LoadedUnits + 'static) -> Self {
        self.loaded_units = Some(Box::new(loaded_units));
        self
    }

    /// Observer for scratch files that could not be removed.
    pub fn cleanup_hook(mut self, hook: CleanupHook) -> Self {
        self.cleanup_hook = Some(hook);
        self
    }

    pub fn build(self) -> ScriptCompiler {
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => {
                let loaded_units = self.loaded_units.unwrap_or_else(|| Box::new(ProcessModules));
                Arc::new(ReferenceCatalog::build(&self.config.runtime_layout, loaded_units.as_ref()))
            }
        };

        let stager = SourceStager::new(
            &self.config.scratch_dir,
            &self.config.source_extension,
            &self.config.unit_extension,
        )
        .with_cleanup_hook(self.cleanup_hook);

        ScriptCompiler {
            catalog,
            stager,
            invoker: CompilerInvoker::new(self.backend, &self.config.target_profile),
            loader: self.loader,
            stats: StatsRecorder::new(),
        }
    }
}
