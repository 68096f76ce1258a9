// This module builds the reference sets handed to the compiler toolchain. ReferenceSet is an
// insertion-ordered set of unit paths whose uniqueness is case-insensitive (the first spelling
// wins), backed by a hashbrown set of case-folded keys. ReferenceCatalog is the baseline every
// script sees: the runtime libraries named by the RuntimeLayout, the host executable, the
// scripting support library, the optional core directory, and a snapshot of every non-dynamic
// unit the host has loaded when the catalog is built. The catalog is immutable once built;
// merge() clones the baseline and extends the clone with the request's own references, so
// concurrent requests never observe each other's additions. Candidates that do not resolve to
// an existing file are skipped without error at both stages.

//! Baseline reference catalog and per-request reference merging.
//!
//! The catalog is a snapshot: units loaded into the host after
//! [`ReferenceCatalog::build`] returns are not visible to later compilations
//! unless a caller passes them as additional references.

use std::fs;
use std::path::Path;

use hashbrown::HashSet;

use crate::config::RuntimeLayout;
use crate::host::LoadedUnits;

/// Ordered set of unit paths, unique ignoring case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    entries: Vec<String>,
    keys: HashSet<String>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a reference. Returns false when a case-insensitive duplicate
    /// is already present; the earlier spelling is kept.
    pub fn insert(&mut self, reference: impl Into<String>) -> bool {
        let reference = reference.into();
        if self.keys.insert(fold_case(&reference)) {
            self.entries.push(reference);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.keys.contains(&fold_case(reference))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// References in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ReferenceSet::new();
        for reference in iter {
            set.insert(reference);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ReferenceSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn fold_case(reference: &str) -> String {
    reference.to_lowercase()
}

/// Resolve a candidate to the full path of an existing file.
///
/// Returns `None` for anything that does not exist, is not a regular file,
/// or whose resolved path is not valid UTF-8.
pub fn resolve_reference(candidate: &Path) -> Option<String> {
    let resolved = fs::canonicalize(candidate).ok()?;
    if !resolved.is_file() {
        return None;
    }
    resolved.into_os_string().into_string().ok()
}

/// Read-only baseline of references available to every script.
#[derive(Debug, Clone)]
pub struct ReferenceCatalog {
    baseline: ReferenceSet,
}

impl ReferenceCatalog {
    /// Build the baseline from the runtime layout and the host's currently
    /// loaded units.
    pub fn build(layout: &RuntimeLayout, loaded: &dyn LoadedUnits) -> Self {
        let mut baseline = ReferenceSet::new();

        for candidate in layout.candidates() {
            add_resolved(&mut baseline, &candidate);
        }

        let mut snapshot = 0usize;
        for module in loaded.loaded_units() {
            if module.dynamic {
                continue;
            }
            if add_resolved(&mut baseline, &module.path) {
                snapshot += 1;
            }
        }

        if baseline.is_empty() {
            log::warn!("Reference catalog is empty; scripts will compile without references");
        }
        log::info!(
            "Built reference catalog with {} references ({} from loaded units)",
            baseline.len(),
            snapshot
        );

        Self { baseline }
    }

    /// Catalog made of exactly the given references.
    ///
    /// Entries are deduplicated but not resolved, so callers can inject
    /// references that only their backend understands.
    pub fn from_references<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            baseline: references.into_iter().collect(),
        }
    }

    pub fn baseline(&self) -> &ReferenceSet {
        &self.baseline
    }

    /// Baseline extended with the request's references that resolve to
    /// existing files. The baseline itself is left untouched.
    pub fn merge<S: AsRef<str>>(&self, additional: &[S]) -> ReferenceSet {
        let mut merged = self.baseline.clone();
        for reference in additional {
            let reference = reference.as_ref();
            match resolve_reference(Path::new(reference)) {
                Some(resolved) => {
                    merged.insert(resolved);
                }
                None => log::debug!("Dropping unresolvable reference: {}", reference),
            }
        }
        merged
    }
}

fn add_resolved(set: &mut ReferenceSet, candidate: &Path) -> bool {
    match resolve_reference(candidate) {
        Some(resolved) => set.insert(resolved),
        None => false,
    }
}
