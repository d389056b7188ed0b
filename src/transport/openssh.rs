//! Session over an established OpenSSH control master.
//!
//! The caller authenticates and starts the master connection, e.g.
//! `ssh -M -S /tmp/ctl -fN user@host`. Every channel then multiplexes a
//! new command over that socket without authenticating again.
//!
//! The ssh client exits with 255 when it fails itself (lost master,
//! refused option). That status is reported as a transport error, so a
//! remote command exiting 255 is indistinguishable from a client failure.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use super::{ExecChannel, ProcessChannel, RemoteSession};

/// Default ssh client binary.
pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

/// Exit status the ssh client uses for its own errors.
pub const SSH_CLIENT_FAILURE: i32 = 255;

/// Session bound to an OpenSSH control socket.
#[derive(Debug, Clone)]
pub struct OpenSshSession {
    program: PathBuf,
    control_path: PathBuf,
    destination: String,
    options: Vec<String>,
}

impl OpenSshSession {
    /// Create a session for `destination` (`user@host`) using the master
    /// listening on `control_path`.
    pub fn new(destination: impl Into<String>, control_path: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from(DEFAULT_SSH_PROGRAM),
            control_path: control_path.into(),
            destination: destination.into(),
            options: Vec::new(),
        }
    }

    /// Use a different ssh client binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Add an `-o` option passed to every invocation.
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Destination host.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Control socket path.
    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    fn base_args(&self) -> Vec<OsString> {
        let mut args = vec![OsString::from("-S"), self.control_path.clone().into_os_string()];
        for option in &self.options {
            args.push(OsString::from("-o"));
            args.push(OsString::from(option));
        }
        args
    }

    /// Arguments for running `command_line` with the environment overlay.
    ///
    /// Variables are forwarded with `SetEnv`; the server must accept them
    /// (`AcceptEnv`), otherwise they are silently dropped remotely. Values
    /// containing whitespace are double-quoted.
    pub fn exec_args(&self, command_line: &str, env: &[(String, String)]) -> Vec<OsString> {
        let mut args = self.base_args();
        args.push(OsString::from("-T"));
        for (name, value) in env {
            args.push(OsString::from("-o"));
            args.push(OsString::from(set_env_option(name, value)));
        }
        args.push(OsString::from(&self.destination));
        args.push(OsString::from(command_line));
        args
    }
}

impl RemoteSession for OpenSshSession {
    fn is_connected(&self) -> bool {
        let mut args = self.base_args();
        args.extend([
            OsString::from("-O"),
            OsString::from("check"),
            OsString::from(&self.destination),
        ]);

        match Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("ssh control check failed to run: {}", e);
                false
            }
        }
    }

    fn open_exec_channel(&self) -> io::Result<Box<dyn ExecChannel>> {
        let session = self.clone();
        let channel = ProcessChannel::new(Box::new(move |line, env| {
            let mut cmd = Command::new(&session.program);
            cmd.args(session.exec_args(line, env));
            cmd
        }))
        .with_env_check(check_set_env)
        .with_client_failure_status(SSH_CLIENT_FAILURE);
        Ok(Box::new(channel))
    }
}

fn set_env_option(name: &str, value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("SetEnv={name}=\"{value}\"")
    } else {
        format!("SetEnv={name}={value}")
    }
}

/// Rejects entries `SetEnv` cannot carry even when quoted.
fn check_set_env(name: &str, value: &str) -> io::Result<()> {
    let invalid = |c: char| c == '"' || c == '\\' || c == '\'' || c.is_control();
    if name.chars().any(|c| c.is_whitespace() || invalid(c)) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("environment name {name:?} cannot be forwarded with SetEnv"),
        ));
    }
    if value.chars().any(invalid) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("value of {name} cannot be forwarded with SetEnv"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> OpenSshSession {
        OpenSshSession::new("deploy@build-01", "/tmp/ctl.sock")
    }

    #[test]
    fn test_exec_args_layout() {
        let args = session()
            .with_option("BatchMode=yes")
            .exec_args("/bin/echo 'hi there'", &[("LANG".into(), "C".into())]);

        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-S",
                "/tmp/ctl.sock",
                "-o",
                "BatchMode=yes",
                "-T",
                "-o",
                "SetEnv=LANG=C",
                "deploy@build-01",
                "/bin/echo 'hi there'",
            ]
        );
    }

    #[test]
    fn test_exec_args_quotes_spaced_value() {
        let args = session().exec_args(
            "env",
            &[
                ("GREETING".into(), "hi there".into()),
                ("PADDED".into(), "  x ".into()),
            ],
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"SetEnv=GREETING=\"hi there\"".to_string()));
        assert!(args.contains(&"SetEnv=PADDED=\"  x \"".to_string()));
    }

    #[test]
    fn test_check_set_env() {
        assert!(check_set_env("GREETING", "hi there").is_ok());
        assert!(check_set_env("EMPTY", "").is_ok());
        assert!(check_set_env("QUOTED", "say \"hi\"").is_err());
        assert!(check_set_env("SINGLE", "it's").is_err());
        assert!(check_set_env("SLASHED", "a\\b").is_err());
        assert!(check_set_env("LINES", "a\nb").is_err());
        assert!(check_set_env("BAD NAME", "x").is_err());
    }

    #[test]
    fn test_rejected_env_does_not_reach_client() {
        let mut channel = session().open_exec_channel().unwrap();
        assert!(channel.set_env("LANG", "C").is_ok());
        let err = channel.set_env("QUOTED", "say \"hi\"").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[cfg(unix)]
    #[test]
    fn test_client_failure_is_not_a_command_status() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let client = dir.path().join("ssh");
        std::fs::write(&client, "#!/bin/sh\nexit 255\n").unwrap();
        std::fs::set_permissions(&client, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut channel = session()
            .with_program(&client)
            .open_exec_channel()
            .unwrap();
        channel.set_command("true");
        channel.connect().unwrap();
        assert!(channel.exit_status().is_err());
        channel.disconnect().unwrap();
    }

    #[test]
    fn test_accessors() {
        let s = session().with_program("/usr/local/bin/ssh");
        assert_eq!(s.destination(), "deploy@build-01");
        assert_eq!(s.control_path(), Path::new("/tmp/ctl.sock"));
    }

    #[test]
    fn test_missing_program_is_disconnected() {
        let s = session().with_program("/nonexistent/ssh-client");
        assert!(!s.is_connected());
    }
}
