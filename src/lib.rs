//! # remote-exec
//!
//! Command execution engine for running processes over established
//! sessions.
//!
//! A [`CommandSpec`] describes one invocation: command, arguments,
//! environment, timeout, stream bindings and accepted exit statuses. A
//! [`CommandExecutor`] runs it over a [`RemoteSession`], bridging the three
//! standard streams, waiting until both output streams are closed, and
//! validating the exit status. [`PathResolver`] locates executables on a
//! search path.
//!
//! ## Features
//!
//! - **Transport-agnostic**: any type implementing [`RemoteSession`] works;
//!   a local shell session and an OpenSSH control-socket session ship with
//!   the crate
//! - **Reliable completion**: exit status is read only after both output
//!   streams closed
//! - **Guaranteed cleanup**: channels are disconnected on every path, and
//!   the delivery thread reading input is woken and aborted
//! - **Deadlines and cancellation**: per-command timeouts and a
//!   [`Canceller`] handle
//!
//! ## Quick Start
//!
//! ```no_run
//! use remote_exec::{CommandExecutor, CommandSpec, OpenSshSession};
//!
//! fn main() -> remote_exec::Result<()> {
//!     remote_exec::logging::try_init().ok();
//!
//!     // Master connection started by the caller:
//!     //   ssh -M -S /tmp/build.sock -fN deploy@build-01
//!     let session = OpenSshSession::new("deploy@build-01", "/tmp/build.sock");
//!
//!     let spec = CommandSpec::builder("/bin/echo")
//!         .arg("hi there")
//!         .exit_values([0, 2])
//!         .capture_output()
//!         .build()?;
//!
//!     let result = CommandExecutor::new(&session).execute(spec)?;
//!     println!("exit {}: {}", result.exit_status(), result.output_trimmed());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod resolve;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use error::{ExecError, Result, TransportError};
pub use execution::{
    execute_async, Canceller, CommandExecutor, CommandSpec, CommandSpecBuilder, ExecResult,
    ExecutorOptions, Input, Output, PollRead,
};
pub use resolve::{which, PathResolver};
pub use transport::{ExecChannel, LocalSession, OpenSshSession, RemoteSession};
