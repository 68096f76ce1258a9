//! Backend that runs the compiler as a child process.
//!
//! The child's stdout and stderr are drained on worker threads so a chatty
//! compiler cannot block on a full pipe, then parsed into diagnostics
//! (stdout first, then stderr). When an interrupt is attached the child is
//! polled and killed as soon as the interrupt fires. On Unix the child leads
//! its own process group, and the whole group is killed, so helpers it
//! started (build servers, shell pipelines) go down with it. An interrupted
//! invocation returns without waiting for the output readers.

use std::env;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::core::diagnostics::parse_output;
use crate::core::error::{ScriptError, ScriptResult};
use crate::core::request::Interrupt;

use super::{CompileJob, CompilerBackend, Invocation, UnitHandle};

/// Compiler executable, e.g. `fsc` or `dotnet`.
pub const COMPILER_ENV: &str = "SCRIPTC_COMPILER";

/// Whitespace-separated arguments placed before the generated ones,
/// e.g. `/usr/lib/dotnet/sdk/fsc.dll --nologo`.
pub const COMPILER_ARGS_ENV: &str = "SCRIPTC_COMPILER_ARGS";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exit status reported for a child terminated by a signal.
const SIGNALLED_EXIT_STATUS: i32 = -1;

#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: PathBuf,
    leading_args: Vec<String>,
    poll_interval: Duration,
}

impl ProcessBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Backend configured from `SCRIPTC_COMPILER` and `SCRIPTC_COMPILER_ARGS`,
    /// or `None` when no compiler is configured.
    pub fn from_env() -> Option<Self> {
        let program = env::var_os(COMPILER_ENV).filter(|program| !program.is_empty())?;
        let args = env::var(COMPILER_ARGS_ENV).unwrap_or_default();
        Some(Self::new(program).with_args(args.split_whitespace()))
    }

    /// Arguments passed ahead of the generated argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn toolchain_error(&self, err: io::Error) -> ScriptError {
        ScriptError::Toolchain {
            program: self.program.display().to_string(),
            source: err,
        }
    }

    fn wait(&self, child: &mut Child, interrupt: &Interrupt) -> ScriptResult<ExitStatus> {
        if interrupt.is_inert() {
            return child.wait().map_err(|err| self.toolchain_error(err));
        }

        loop {
            let interrupted = match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => interrupt.check().err(),
                Err(err) => Some(self.toolchain_error(err)),
            };

            if let Some(err) = interrupted {
                log::debug!("Stopping toolchain process {}: {}", child.id(), err);
                terminate(child);
                return Err(err);
            }
            thread::sleep(self.poll_interval);
        }
    }
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: a negative pid signals exactly the process group the child leads.
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

impl CompilerBackend for ProcessBackend {
    fn invoke(&self, job: CompileJob<'_>, interrupt: &Interrupt) -> ScriptResult<Invocation> {
        log::debug!("Running {} with {} arguments", self.program.display(), job.arguments.len());

        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(job.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|err| self.toolchain_error(err))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // Dropping the reader handles detaches them; they end once the pipes close.
        let status = self.wait(&mut child, interrupt)?;

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        let mut diagnostics = parse_output(&stdout);
        diagnostics.extend(parse_output(&stderr));

        let exit_status = status.code().unwrap_or(SIGNALLED_EXIT_STATUS);
        let unit = job
            .output
            .filter(|output| exit_status == 0 && output.is_file())
            .map(|output| UnitHandle::File(output.to_path_buf()));

        Ok(Invocation {
            diagnostics,
            exit_status,
            unit,
        })
    }

    fn writes_output(&self) -> bool {
        true
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::request::CompileOptions;
    use std::fs;
    use std::time::Instant;

    fn shell(script: &str) -> ProcessBackend {
        ProcessBackend::new("/bin/sh").with_args(["-c", script, "fake-compiler"])
    }

    #[test]
    fn test_collects_diagnostics_and_exit_code() {
        let backend = shell("echo 'banner'; echo 'x.fsx(2,4): error FS0001: type mismatch' >&2; exit 2");
        let invocation = backend
            .invoke(CompileJob { arguments: &[], output: None }, &Interrupt::none())
            .unwrap();

        assert_eq!(invocation.exit_status, 2);
        assert!(invocation.unit.is_none());
        assert_eq!(invocation.diagnostics.len(), 2);
        assert_eq!(invocation.diagnostics[0].message, "banner");
        assert_eq!(invocation.diagnostics[1].code.as_deref(), Some("FS0001"));
    }

    #[test]
    fn test_unit_reported_only_when_output_exists() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("unit.so");
        let args = vec![output.display().to_string()];

        let backend = shell("printf unit > \"$1\"");
        let invocation = backend
            .invoke(CompileJob { arguments: &args, output: Some(&output) }, &Interrupt::none())
            .unwrap();
        assert_eq!(invocation.unit, Some(UnitHandle::File(output.clone())));

        fs::remove_file(&output).unwrap();
        let silent = shell("exit 0");
        let invocation = silent
            .invoke(CompileJob { arguments: &args, output: Some(&output) }, &Interrupt::none())
            .unwrap();
        assert_eq!(invocation.unit, None);
    }

    #[test]
    fn test_missing_program_is_toolchain_error() {
        let backend = ProcessBackend::new("/definitely/not/a/compiler");
        let err = backend
            .invoke(CompileJob { arguments: &[], output: None }, &Interrupt::none())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Toolchain { .. }));
    }

    #[test]
    fn test_timeout_kills_child() {
        let backend = shell("exec sleep 10");
        let interrupt = CompileOptions::default()
            .with_timeout(Duration::from_millis(50))
            .start();

        let started = Instant::now();
        let err = backend
            .invoke(CompileJob { arguments: &[], output: None }, &interrupt)
            .unwrap_err();

        assert!(matches!(err, ScriptError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_does_not_wait_for_grandchildren() {
        // Without exec the shell forks `sleep`, which inherits the output pipes.
        let backend = shell("sleep 4; true");
        let interrupt = CompileOptions::default()
            .with_timeout(Duration::from_millis(100))
            .start();

        let started = Instant::now();
        let err = backend
            .invoke(CompileJob { arguments: &[], output: None }, &interrupt)
            .unwrap_err();

        assert!(matches!(err, ScriptError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(2), "returned after {:?}", started.elapsed());
    }

    #[test]
    fn test_cancel_kills_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("late");
        let args = vec![marker.display().to_string()];
        let backend = shell("(sleep 1; touch \"$1\") & wait");

        let token = crate::core::request::CancellationToken::new();
        let interrupt = CompileOptions::default().with_cancellation(token.clone()).start();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            token.cancel();
        });

        let err = backend
            .invoke(CompileJob { arguments: &args, output: None }, &interrupt)
            .unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, ScriptError::Cancelled));

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }
}
