//! Service configuration.
//!
//! [`CompilerConfig`] controls where scripts are staged, which file
//! extensions the toolchain expects, and which runtime libraries make up the
//! baseline reference catalog. Defaults suit a toolchain that compiles `.fsx`
//! scripts into platform shared libraries; [`CompilerConfig::from_env`]
//! overlays the `SCRIPTC_*` environment variables.

use std::env;
use std::path::PathBuf;

/// Overrides [`CompilerConfig::scratch_dir`].
pub const SCRATCH_DIR_ENV: &str = "SCRIPTC_SCRATCH_DIR";

/// Overrides [`CompilerConfig::target_profile`].
pub const TARGET_PROFILE_ENV: &str = "SCRIPTC_TARGET_PROFILE";

/// Directory holding the runtime's separately shipped core libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreDirectory {
    pub path: PathBuf,
    /// File name of the core runtime library inside `path`.
    pub core_library: String,
    /// File name of the metadata standard library inside `path`.
    pub metadata_library: String,
}

/// Location of the libraries every script may reference.
///
/// Every entry is optional; entries that do not exist on disk are skipped
/// when the catalog is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    /// Base runtime library.
    pub runtime_library: Option<PathBuf>,
    /// Collection and query algorithms library.
    pub collections_library: Option<PathBuf>,
    /// The host application's own unit, so scripts can call back into it.
    pub host_unit: Option<PathBuf>,
    /// The scripting language's runtime support library.
    pub support_library: Option<PathBuf>,
    pub core_directory: Option<CoreDirectory>,
}

impl RuntimeLayout {
    /// Candidate paths in catalog order.
    pub(crate) fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = [
            &self.runtime_library,
            &self.collections_library,
            &self.host_unit,
            &self.support_library,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect();

        if let Some(core) = &self.core_directory {
            candidates.push(core.path.join(&core.core_library));
            candidates.push(core.path.join(&core.metadata_library));
        }

        candidates
    }
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self {
            runtime_library: None,
            collections_library: None,
            host_unit: env::current_exe().ok(),
            support_library: None,
            core_directory: None,
        }
    }
}

/// Configuration of a [`crate::ScriptCompiler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Directory receiving staged sources and output units.
    pub scratch_dir: PathBuf,
    /// Extension of staged source files, without the dot.
    pub source_extension: String,
    /// Extension of produced units, without the dot.
    pub unit_extension: String,
    /// Value of the toolchain's target profile flag.
    pub target_profile: String,
    pub runtime_layout: RuntimeLayout,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            scratch_dir: env::temp_dir(),
            source_extension: "fsx".to_string(),
            unit_extension: env::consts::DLL_EXTENSION.to_string(),
            target_profile: "netcore".to_string(),
            runtime_layout: RuntimeLayout::default(),
        }
    }
}

impl CompilerConfig {
    /// Default configuration with the `SCRIPTC_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value_of = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = value_of(SCRATCH_DIR_ENV) {
            self.scratch_dir = PathBuf::from(dir);
        }
        if let Some(profile) = value_of(TARGET_PROFILE_ENV) {
            self.target_profile = profile;
        }
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_source_extension(mut self, extension: impl Into<String>) -> Self {
        self.source_extension = extension.into();
        self
    }

    pub fn with_unit_extension(mut self, extension: impl Into<String>) -> Self {
        self.unit_extension = extension.into();
        self
    }

    pub fn with_target_profile(mut self, profile: impl Into<String>) -> Self {
        self.target_profile = profile.into();
        self
    }

    pub fn with_runtime_layout(mut self, layout: RuntimeLayout) -> Self {
        self.runtime_layout = layout;
        self
    }
}
