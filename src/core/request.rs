//! Compile requests and the caller's interrupt controls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashSet;

use super::error::{ScriptError, ScriptResult};

/// One script to compile. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    source: String,
    additional_references: Vec<String>,
    unit_name: String,
}

impl CompileRequest {
    pub fn new(source: impl Into<String>, unit_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            additional_references: Vec::new(),
            unit_name: unit_name.into(),
        }
    }

    /// Attach extra references. Duplicates differing only in case are
    /// collapsed, keeping the first spelling.
    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen: HashSet<String> = self
            .additional_references
            .iter()
            .map(|r| r.to_lowercase())
            .collect();
        for reference in references {
            let reference = reference.into();
            if seen.insert(reference.to_lowercase()) {
                self.additional_references.push(reference);
            }
        }
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn additional_references(&self) -> &[String] {
        &self.additional_references
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }
}

/// Shared flag a caller flips to abandon an in-flight compilation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-call options. The default has no timeout and no cancellation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

impl CompileOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Start the clock for one compilation.
    pub fn start(&self) -> Interrupt {
        Interrupt {
            deadline: self.timeout.map(|timeout| (Instant::now() + timeout, timeout)),
            token: self.cancellation.clone(),
        }
    }
}

/// Running interrupt state of one compilation, polled by backends.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    deadline: Option<(Instant, Duration)>,
    token: Option<CancellationToken>,
}

impl Interrupt {
    /// An interrupt that never fires.
    pub fn none() -> Self {
        Self::default()
    }

    /// True when neither a deadline nor a token is attached, so backends
    /// may block without polling.
    pub fn is_inert(&self) -> bool {
        self.deadline.is_none() && self.token.is_none()
    }

    /// Error out once the token is cancelled or the deadline has passed.
    /// Cancellation is checked first.
    pub fn check(&self) -> ScriptResult<()> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(ScriptError::Cancelled);
        }
        if let Some((deadline, timeout)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ScriptError::TimedOut { timeout });
            }
        }
        Ok(())
    }
}
