//! Enumeration of the units currently loaded into the host process.
//!
//! On Linux [`ProcessModules`] reads `/proc/self/maps` and reports each
//! file-backed mapping once, in address order. Mappings of deleted files and
//! `memfd:` objects are reported as dynamic: they were generated at runtime
//! and cannot be handed to a compiler as a reference.

use std::env;
use std::path::PathBuf;

use hashbrown::HashSet;

/// A unit loaded into the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub path: PathBuf,
    /// Generated at runtime rather than loaded from a file.
    pub dynamic: bool,
}

/// Capability to list the host's loaded units.
pub trait LoadedUnits: Send + Sync {
    fn loaded_units(&self) -> Vec<ModuleInfo>;
}

/// A fixed list, for hosts that track their own units.
impl LoadedUnits for Vec<ModuleInfo> {
    fn loaded_units(&self) -> Vec<ModuleInfo> {
        self.clone()
    }
}

/// Loaded units of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessModules;

impl LoadedUnits for ProcessModules {
    #[cfg(target_os = "linux")]
    fn loaded_units(&self) -> Vec<ModuleInfo> {
        match std::fs::read_to_string("/proc/self/maps") {
            Ok(maps) => parse_maps(&maps),
            Err(err) => {
                log::debug!("Cannot read /proc/self/maps: {}", err);
                current_exe_only()
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn loaded_units(&self) -> Vec<ModuleInfo> {
        current_exe_only()
    }
}

fn current_exe_only() -> Vec<ModuleInfo> {
    env::current_exe()
        .map(|path| vec![ModuleInfo { path, dynamic: false }])
        .unwrap_or_default()
}

const DELETED_SUFFIX: &str = " (deleted)";

/// Parse the `/proc/<pid>/maps` format.
pub fn parse_maps(maps: &str) -> Vec<ModuleInfo> {
    let mut seen = HashSet::new();
    let mut modules = Vec::new();

    for line in maps.lines() {
        // address perms offset dev inode pathname
        let Some(pathname) = line.splitn(6, char::is_whitespace).nth(5).map(str::trim) else {
            continue;
        };

        let (path, dynamic) = if let Some(path) = pathname.strip_suffix(DELETED_SUFFIX) {
            (path, true)
        } else if pathname.starts_with("/memfd:") {
            (pathname, true)
        } else if pathname.starts_with('/') {
            (pathname, false)
        } else {
            // [heap], [stack], [vdso], anonymous mappings
            continue;
        };

        if seen.insert(path.to_string()) {
            modules.push(ModuleInfo {
                path: PathBuf::from(path),
                dynamic,
            });
        }
    }

    modules
}
