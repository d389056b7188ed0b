//! Command execution engine.
//!
//! This module provides:
//! - [`CommandSpec`]: an immutable command description built fluently
//! - [`CommandExecutor`]: runs a spec over a [`RemoteSession`](crate::RemoteSession)
//! - [`ExecResult`]: the accepted exit status plus any captured output
//!
//! # Example
//!
//! ```no_run
//! use remote_exec::execution::{CommandExecutor, CommandSpec, Input};
//! use remote_exec::transport::LocalSession;
//!
//! let session = LocalSession::new();
//! let spec = CommandSpec::builder("/bin/echo")
//!     .arg("hi there")
//!     .pipe_input(Input::Null)
//!     .capture_output()
//!     .build()?;
//!
//! let result = CommandExecutor::new(&session).execute(spec)?;
//! assert_eq!(result.output_trimmed(), "hi there");
//! # Ok::<(), remote_exec::ExecError>(())
//! ```

mod command;
mod executor;
mod latch;
mod result;
mod streams;

pub use command::{CommandSpec, CommandSpecBuilder, DEFAULT_EXIT_VALUES};
pub use executor::{execute_async, Canceller, CommandExecutor, ExecutorOptions};
pub use latch::CompletionLatch;
pub use result::ExecResult;
#[cfg(unix)]
pub use streams::FdReader;
pub use streams::{
    CaptureBuffer, Input, InterruptibleInput, LatchedWriter, Output, PollRead, ReadInterrupter,
    SharedSink, Streams, DEFAULT_POLL_INTERVAL,
};
