//! Exec channel backed by a child process.
//!
//! Both shipped sessions run commands through a local child: the system
//! shell for [`LocalSession`](super::LocalSession) and the `ssh` client for
//! [`OpenSshSession`](super::OpenSshSession). The channel owns the
//! delivery threads that move bytes between the child's pipes and the
//! bindings set by the executor.

use std::fmt;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use tracing::{debug, trace};

use super::ExecChannel;

/// Builds the child process for a command line and environment overlay.
pub type Launcher = Box<dyn Fn(&str, &[(String, String)]) -> Command + Send>;

/// Extra validation of one environment entry; an error rejects the entry.
pub type EnvCheck = fn(&str, &str) -> io::Result<()>;

/// [`ExecChannel`] that spawns a child process on connect.
pub struct ProcessChannel {
    launcher: Launcher,
    env_check: Option<EnvCheck>,
    client_failure_status: Option<i32>,
    env: Vec<(String, String)>,
    command_line: Option<String>,
    input: Option<Box<dyn Read + Send>>,
    output: Option<Box<dyn Write + Send>>,
    error: Option<Box<dyn Write + Send>>,
    child: Option<Child>,
    exit_status: Option<i32>,
}

impl fmt::Debug for ProcessChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessChannel")
            .field("command_line", &self.command_line)
            .field("env", &self.env)
            .field("pid", &self.child.as_ref().map(Child::id))
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

impl ProcessChannel {
    /// Create a channel that launches its command with `launcher`.
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            env_check: None,
            client_failure_status: None,
            env: Vec::new(),
            command_line: None,
            input: None,
            output: None,
            error: None,
            child: None,
            exit_status: None,
        }
    }

    /// Validate environment entries with `check` before accepting them.
    pub fn with_env_check(mut self, check: EnvCheck) -> Self {
        self.env_check = Some(check);
        self
    }

    /// Treat `status` as a failure of the launched client rather than of the
    /// command; [`exit_status`](ExecChannel::exit_status) then errors.
    pub fn with_client_failure_status(mut self, status: i32) -> Self {
        self.client_failure_status = Some(status);
        self
    }

    /// Process ID of the running child, once connected.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

impl ExecChannel for ProcessChannel {
    fn set_env(&mut self, name: &str, value: &str) -> io::Result<()> {
        if name.is_empty() || name.contains('=') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid environment variable name: {name:?}"),
            ));
        }
        if let Some(check) = self.env_check {
            check(name, value)?;
        }
        self.env.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn set_input(&mut self, input: Box<dyn Read + Send>) {
        self.input = Some(input);
    }

    fn set_output(&mut self, output: Box<dyn Write + Send>) {
        self.output = Some(output);
    }

    fn set_error(&mut self, error: Box<dyn Write + Send>) {
        self.error = Some(error);
    }

    fn set_command(&mut self, command_line: &str) {
        self.command_line = Some(command_line.to_string());
    }

    fn connect(&mut self) -> io::Result<()> {
        if self.child.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "channel already connected",
            ));
        }
        let command_line = self
            .command_line
            .as_deref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no command set"))?;

        let mut cmd = (self.launcher)(command_line, &self.env);
        cmd.stdin(if self.input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(if self.output.is_some() { Stdio::piped() } else { Stdio::null() })
            .stderr(if self.error.is_some() { Stdio::piped() } else { Stdio::null() });

        // tracked before the delivery threads start, so a failed thread
        // spawn still leaves the child for disconnect to kill and reap
        let child = self.child.insert(cmd.spawn()?);
        debug!("process channel spawned pid {}", child.id());

        if let (Some(mut input), Some(mut stdin)) = (self.input.take(), child.stdin.take()) {
            spawn_delivery("remote-exec-stdin", move || {
                if let Err(e) = io::copy(&mut input, &mut stdin) {
                    trace!("stdin delivery ended: {}", e);
                }
            })?;
        }

        if let (Some(mut output), Some(mut stdout)) = (self.output.take(), child.stdout.take()) {
            spawn_delivery("remote-exec-stdout", move || {
                if let Err(e) = io::copy(&mut stdout, &mut output) {
                    trace!("stdout delivery ended: {}", e);
                }
            })?;
        }

        if let (Some(mut error), Some(mut stderr)) = (self.error.take(), child.stderr.take()) {
            spawn_delivery("remote-exec-stderr", move || {
                if let Err(e) = io::copy(&mut stderr, &mut error) {
                    trace!("stderr delivery ended: {}", e);
                }
            })?;
        }

        Ok(())
    }

    fn exit_status(&mut self) -> io::Result<Option<i32>> {
        if self.exit_status.is_none() {
            if let Some(child) = self.child.as_mut() {
                self.exit_status = status_code(child.wait()?);
            }
        }
        match (self.exit_status, self.client_failure_status) {
            (Some(status), Some(failure)) if status == failure => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("client exited with status {status} before reporting a command status"),
            )),
            (status, _) => Ok(status),
        }
    }

    fn disconnect(&mut self) -> io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if child.try_wait()?.is_none() {
            debug!("killing still running pid {}", child.id());
            if let Err(e) = child.kill() {
                // already exited between try_wait and kill
                if e.kind() != io::ErrorKind::InvalidInput {
                    return Err(e);
                }
            }
        }
        let status = child.wait()?;
        if self.exit_status.is_none() {
            self.exit_status = status_code(status);
        }
        Ok(())
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            debug!("process channel cleanup failed: {}", e);
        }
    }
}

/// Spawn a named delivery thread. The output writer it owns is dropped
/// when the copy finishes, which is what signals stream completion.
fn spawn_delivery<F>(name: &str, f: F) -> io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(f).map(|_| ())
}

/// Exit code, or `128 + signal` for a child killed by a signal.
fn status_code(status: ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|s| 128 + s))
    }
    #[cfg(not(unix))]
    {
        status.code()
    }
}
