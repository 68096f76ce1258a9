// This module stages script source for the compiler toolchain. SourceStager writes the source
// text, UTF-8 encoded and byte for byte, to `{unit}-{token}.{ext}` in the scratch directory,
// where the token is a fresh v4 UUID so concurrent requests reusing a unit name never collide.
// When the backend writes its output to disk the stager also reserves the matching output path
// with the same token. The returned StagedArtifacts guard owns both paths and deletes them in
// Drop, which runs on success, on every error path, and while unwinding from a panic. Deletion
// failures never propagate: a missing file is ignored and anything else is handed to the
// optional CleanupHook and then dropped.

//! Scoped scratch files for one compilation.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::error::{ScriptError, ScriptResult};

/// Observer for scratch files that could not be removed.
#[derive(Clone)]
pub struct CleanupHook(Arc<dyn Fn(&Path, &io::Error) + Send + Sync>);

impl CleanupHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&Path, &io::Error) + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    pub(crate) fn notify(&self, path: &Path, error: &io::Error) {
        (self.0)(path, error)
    }
}

impl fmt::Debug for CleanupHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CleanupHook(..)")
    }
}

/// Creates uniquely named scratch files in one directory.
#[derive(Debug, Clone)]
pub struct SourceStager {
    scratch_dir: PathBuf,
    source_extension: String,
    unit_extension: String,
    cleanup_hook: Option<CleanupHook>,
}

impl SourceStager {
    pub fn new(
        scratch_dir: impl Into<PathBuf>,
        source_extension: impl Into<String>,
        unit_extension: impl Into<String>,
    ) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            source_extension: source_extension.into(),
            unit_extension: unit_extension.into(),
            cleanup_hook: None,
        }
    }

    pub fn with_cleanup_hook(mut self, hook: Option<CleanupHook>) -> Self {
        self.cleanup_hook = hook;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Write `source` to a fresh scratch file, reserving an output path as
    /// well when `with_output` is set.
    pub fn stage(&self, unit_name: &str, source: &str, with_output: bool) -> ScriptResult<StagedArtifacts> {
        let stem = format!("{}-{}", sanitize_unit_name(unit_name), Uuid::new_v4().simple());
        let source_path = self.scratch_dir.join(format!("{}.{}", stem, self.source_extension));

        // Build the guard before writing so a partial write is removed as well.
        let staged = StagedArtifacts {
            source_path: source_path.clone(),
            output_path: with_output
                .then(|| self.scratch_dir.join(format!("{}.{}", stem, self.unit_extension))),
            cleanup_hook: self.cleanup_hook.clone(),
        };

        fs::write(&source_path, source.as_bytes()).map_err(|err| ScriptError::Staging {
            path: source_path.clone(),
            source: err,
        })?;
        log::trace!("Staged {} bytes of source at {}", source.len(), source_path.display());

        Ok(staged)
    }
}

/// Longest unit-name stem used in a staged file name. With the token and
/// extension appended this stays well under the usual 255-byte limit.
pub const MAX_UNIT_NAME_LEN: usize = 128;

/// Replace characters that are unsafe in a file name with `_` and cap the
/// result at [`MAX_UNIT_NAME_LEN`].
///
/// An empty name becomes `script`.
pub fn sanitize_unit_name(unit_name: &str) -> String {
    let sanitized: String = unit_name
        .chars()
        .take(MAX_UNIT_NAME_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "script".to_string()
    } else {
        sanitized
    }
}

/// Scratch files of one compilation, removed on drop.
#[derive(Debug)]
pub struct StagedArtifacts {
    source_path: PathBuf,
    output_path: Option<PathBuf>,
    cleanup_hook: Option<CleanupHook>,
}

impl StagedArtifacts {
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Reserved output path, present only for disk-writing backends.
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    fn remove(&self, path: &Path) {
        remove_scratch_file(path, self.cleanup_hook.as_ref());
    }
}

/// Delete a scratch file. A missing file is ignored; other failures go to
/// `hook` and are otherwise dropped.
pub(crate) fn remove_scratch_file(path: &Path, hook: Option<&CleanupHook>) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            if let Some(hook) = hook {
                hook.notify(path, &err);
            }
        }
    }
}

impl Drop for StagedArtifacts {
    fn drop(&mut self) {
        self.remove(&self.source_path);
        if let Some(output) = &self.output_path {
            self.remove(output);
        }
    }
}
