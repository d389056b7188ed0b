//! Transport abstraction: sessions and their exec channels.
//!
//! A [`RemoteSession`] is an established, authenticated connection owned by
//! the caller. The executor borrows it to open one [`ExecChannel`] per
//! command and never closes the session itself.
//!
//! Two implementations ship with the crate:
//! - [`LocalSession`]: runs commands on this host through the system shell
//! - [`OpenSshSession`]: runs commands through an OpenSSH control socket

mod local;
mod openssh;
mod process;

pub use local::LocalSession;
pub use openssh::{OpenSshSession, DEFAULT_SSH_PROGRAM, SSH_CLIENT_FAILURE};
pub use process::{EnvCheck, Launcher, ProcessChannel};

use std::io::{self, Read, Write};

/// An established connection that can open command channels.
pub trait RemoteSession: Send + Sync {
    /// Whether the session is still usable.
    fn is_connected(&self) -> bool;

    /// Open a new channel for running one command.
    fn open_exec_channel(&self) -> io::Result<Box<dyn ExecChannel>>;
}

/// A per-command channel carrying three streams and an exit status.
///
/// Writers handed to [`set_output`](Self::set_output) and
/// [`set_error`](Self::set_error) must be dropped by the channel once the
/// corresponding remote stream reaches EOF; the executor treats both drops
/// as the completion signal.
pub trait ExecChannel: Send {
    /// Set one environment variable. Transports may refuse.
    fn set_env(&mut self, name: &str, value: &str) -> io::Result<()>;

    /// Bind the remote standard input.
    fn set_input(&mut self, input: Box<dyn Read + Send>);

    /// Bind the remote standard output.
    fn set_output(&mut self, output: Box<dyn Write + Send>);

    /// Bind the remote standard error.
    fn set_error(&mut self, error: Box<dyn Write + Send>);

    /// Set the command line to run.
    fn set_command(&mut self, command_line: &str);

    /// Start the remote command.
    fn connect(&mut self) -> io::Result<()>;

    /// Exit status of the remote command, if reported.
    fn exit_status(&mut self) -> io::Result<Option<i32>>;

    /// Tear the channel down. Must be safe to call more than once.
    fn disconnect(&mut self) -> io::Result<()>;
}

impl<S: RemoteSession + ?Sized> RemoteSession for std::sync::Arc<S> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn open_exec_channel(&self) -> io::Result<Box<dyn ExecChannel>> {
        (**self).open_exec_channel()
    }
}
