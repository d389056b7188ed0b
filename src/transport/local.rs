//! Same-host session running commands through the system shell.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{ExecChannel, ProcessChannel, RemoteSession};

/// Default shell for the current platform.
pub fn default_shell() -> PathBuf {
    #[cfg(unix)]
    {
        PathBuf::from("/bin/sh")
    }
    #[cfg(windows)]
    {
        PathBuf::from("cmd.exe")
    }
}

/// Session that runs every command on this host.
///
/// Always connected. Each channel passes the command line to the shell
/// (`sh -c` on Unix, `cmd /C` on Windows) with the environment overlay
/// applied on top of the inherited environment.
#[derive(Debug, Clone)]
pub struct LocalSession {
    shell: PathBuf,
    working_dir: Option<PathBuf>,
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSession {
    /// Create a session using the platform default shell.
    pub fn new() -> Self {
        Self {
            shell: default_shell(),
            working_dir: None,
        }
    }

    /// Use a different shell binary.
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Run commands in `dir` instead of the current directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The shell used to run command lines.
    pub fn shell(&self) -> &Path {
        &self.shell
    }
}

impl RemoteSession for LocalSession {
    fn is_connected(&self) -> bool {
        true
    }

    fn open_exec_channel(&self) -> io::Result<Box<dyn ExecChannel>> {
        let shell = self.shell.clone();
        let working_dir = self.working_dir.clone();

        Ok(Box::new(ProcessChannel::new(Box::new(move |line, env| {
            let mut cmd = Command::new(&shell);
            if cfg!(windows) {
                cmd.arg("/C");
            } else {
                cmd.arg("-c");
            }
            cmd.arg(line);
            cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            if let Some(ref dir) = working_dir {
                cmd.current_dir(dir);
            }
            cmd
        }))))
    }
}
