//! Backend for a compiler entry point linked into the host process.
//!
//! The entry point keeps the unit in memory and hands it back as
//! [`UnitHandle::Image`], so no output path is reserved and no `-o:` flag is
//! passed. Interrupts are checked before and after the call only; an entry
//! point cannot be stopped part way through.

use std::fmt;
use std::io;

use crate::core::error::{ScriptError, ScriptResult};
use crate::core::request::Interrupt;

use super::{CompileJob, CompilerBackend, Invocation};

pub struct InProcessBackend<F> {
    name: String,
    entry: F,
    reentrant: bool,
}

impl<F> InProcessBackend<F>
where
    F: Fn(&[String]) -> io::Result<Invocation> + Send + Sync,
{
    /// Wrap `entry`. It is assumed reentrant until told otherwise.
    pub fn new(name: impl Into<String>, entry: F) -> Self {
        Self {
            name: name.into(),
            entry,
            reentrant: true,
        }
    }

    /// Mark the entry point as unsafe to call concurrently; the invoker then
    /// serialises calls.
    pub fn non_reentrant(mut self) -> Self {
        self.reentrant = false;
        self
    }
}

impl<F> CompilerBackend for InProcessBackend<F>
where
    F: Fn(&[String]) -> io::Result<Invocation> + Send + Sync,
{
    fn invoke(&self, job: CompileJob<'_>, interrupt: &Interrupt) -> ScriptResult<Invocation> {
        interrupt.check()?;
        let invocation = (self.entry)(job.arguments).map_err(|err| ScriptError::Toolchain {
            program: self.name.clone(),
            source: err,
        })?;
        interrupt.check()?;
        Ok(invocation)
    }

    fn writes_output(&self) -> bool {
        false
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
    }
}

impl<F> fmt::Debug for InProcessBackend<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessBackend")
            .field("name", &self.name)
            .field("reentrant", &self.reentrant)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request::{CancellationToken, CompileOptions};
    use crate::toolchain::UnitHandle;

    #[test]
    fn test_entry_receives_arguments() {
        let backend = InProcessBackend::new("echo", |args: &[String]| {
            Ok(Invocation::succeeded(UnitHandle::Image(args.join(" ").into_bytes()), Vec::new()))
        });
        let args = vec!["--target:library".to_string(), "s.fsx".to_string()];

        let invocation = backend
            .invoke(CompileJob { arguments: &args, output: None }, &Interrupt::none())
            .unwrap();
        assert_eq!(
            invocation.unit,
            Some(UnitHandle::Image(b"--target:library s.fsx".to_vec()))
        );
        assert!(!backend.writes_output());
        assert!(backend.is_reentrant());
    }

    #[test]
    fn test_entry_error_maps_to_toolchain() {
        let backend = InProcessBackend::new("broken", |_: &[String]| {
            Err(io::Error::new(io::ErrorKind::Other, "compiler crashed"))
        })
        .non_reentrant();

        let err = backend
            .invoke(CompileJob { arguments: &[], output: None }, &Interrupt::none())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Toolchain { ref program, .. } if program == "broken"));
        assert!(!backend.is_reentrant());
    }

    #[test]
    fn test_cancelled_before_call_skips_entry() {
        let token = CancellationToken::new();
        token.cancel();
        let interrupt = CompileOptions::default().with_cancellation(token).start();
        let backend = InProcessBackend::new("unreachable", |_: &[String]| -> io::Result<Invocation> {
            panic!("entry point must not run")
        });

        let err = backend
            .invoke(CompileJob { arguments: &[], output: None }, &interrupt)
            .unwrap_err();
        assert!(matches!(err, ScriptError::Cancelled));
    }
}
