//! Command execution over a remote session.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::command::CommandSpec;
use super::latch::CompletionLatch;
use super::result::ExecResult;
use super::streams::{LatchedWriter, ReadInterrupter, Streams, DEFAULT_POLL_INTERVAL};
use crate::error::{ExecError, TransportError};
use crate::transport::{ExecChannel, RemoteSession};
use crate::Result;

/// Number of stream-close signals that mark a command as finished:
/// output and error.
const COMPLETION_SIGNALS: usize = 2;

/// Executor tuning shared by all runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// How long the input adapter parks when no bytes are available.
    pub poll_interval: Duration,
    /// Deadline applied when a spec has no timeout of its own.
    pub default_timeout: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_timeout: None,
        }
    }
}

/// Cooperative cancellation for running commands.
///
/// Cancelling aborts the completion wait of every run registered with this
/// handle; those runs fail with [`TransportError::Interrupted`] and go
/// through normal cleanup. A run registered after cancellation fails as
/// soon as it starts waiting.
#[derive(Debug, Clone, Default)]
pub struct Canceller {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    latches: Mutex<Vec<Weak<CompletionLatch>>>,
}

impl Canceller {
    /// Create a handle that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel all registered and future runs.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Ok(latches) = self.inner.latches.lock() {
            for latch in latches.iter().filter_map(Weak::upgrade) {
                latch.abort();
            }
        }
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn register(&self, latch: &Arc<CompletionLatch>) -> std::result::Result<(), TransportError> {
        let mut latches = self
            .inner
            .latches
            .lock()
            .map_err(|_| TransportError::LockPoisoned)?;
        latches.retain(|l| l.strong_count() > 0);
        latches.push(Arc::downgrade(latch));
        drop(latches);

        if self.is_cancelled() {
            latch.abort();
        }
        Ok(())
    }
}

/// Runs command specs over a borrowed session.
///
/// The session is never closed by the executor; each run opens and closes
/// its own channel.
pub struct CommandExecutor<'s, S: RemoteSession + ?Sized> {
    session: &'s S,
    options: ExecutorOptions,
}

impl<'s, S: RemoteSession + ?Sized> CommandExecutor<'s, S> {
    /// Create an executor with default options.
    pub fn new(session: &'s S) -> Self {
        Self::with_options(session, ExecutorOptions::default())
    }

    /// Create an executor with explicit options.
    pub fn with_options(session: &'s S, options: ExecutorOptions) -> Self {
        Self { session, options }
    }

    /// Options in effect.
    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Execute a command, blocking until it completes.
    ///
    /// Completion means both the output and the error stream were closed by
    /// the channel; only then is the exit status read and checked against
    /// the spec's accepted values.
    pub fn execute(&self, spec: CommandSpec) -> Result<ExecResult> {
        self.run(spec, None)
    }

    /// Execute a command that can be aborted through `canceller`.
    pub fn execute_cancellable(
        &self,
        spec: CommandSpec,
        canceller: &Canceller,
    ) -> Result<ExecResult> {
        self.run(spec, Some(canceller))
    }

    fn run(&self, mut spec: CommandSpec, canceller: Option<&Canceller>) -> Result<ExecResult> {
        if !self.session.is_connected() {
            return Err(ExecError::config("session must be established first"));
        }

        let streams = spec.take_streams();
        let interrupter = Arc::new(ReadInterrupter::new());
        let channel = self
            .session
            .open_exec_channel()
            .map_err(TransportError::Open)?;
        let mut channel = ChannelGuard {
            channel,
            interrupter: Arc::clone(&interrupter),
        };

        let completed = self.drive(&mut channel, &spec, streams, interrupter, canceller)?;
        drop(channel);

        let exit_status = completed.exit_status;
        if !spec.accepts(exit_status) {
            return Err(ExecError::UnexpectedExitStatus {
                expected: spec.exit_values().to_vec(),
                actual: exit_status,
            });
        }

        Ok(ExecResult::new(
            spec,
            exit_status,
            completed.output,
            completed.error_output,
        ))
    }

    fn drive(
        &self,
        channel: &mut ChannelGuard,
        spec: &CommandSpec,
        streams: Streams,
        interrupter: Arc<ReadInterrupter>,
        canceller: Option<&Canceller>,
    ) -> std::result::Result<Completed, TransportError> {
        for (name, value) in spec.env() {
            debug!("Adding env {}={}", name, value);
            if let Err(e) = channel.set_env(name, value) {
                warn!("transport rejected env {}: {}", name, e);
            }
        }

        let input = streams
            .input
            .into_interruptible(interrupter, self.options.poll_interval);
        channel.set_input(Box::new(input));

        let latch = Arc::new(CompletionLatch::new(COMPLETION_SIGNALS));

        let (output_sink, output_capture) = streams.output.into_sink();
        let (error_sink, error_capture) = if spec.merge_stderr() {
            (output_sink.clone(), None)
        } else {
            streams.error.into_sink()
        };
        channel.set_output(Box::new(LatchedWriter::new(
            output_sink,
            Arc::clone(&latch),
            "output",
        )));
        channel.set_error(Box::new(LatchedWriter::new(
            error_sink,
            Arc::clone(&latch),
            "error",
        )));

        if let Some(canceller) = canceller {
            canceller.register(&latch)?;
        }

        let command_line = spec.command_line();
        debug!("remote-exec [{}]", command_line);
        channel.set_command(&command_line);
        channel.connect().map_err(TransportError::Connect)?;

        latch.wait(spec.timeout().or(self.options.default_timeout))?;

        let exit_status = channel
            .exit_status()?
            .ok_or(TransportError::MissingExitStatus)?;
        trace!("remote-exec exit status {}", exit_status);

        Ok(Completed {
            exit_status,
            output: output_capture.map(|b| b.contents()),
            error_output: error_capture.map(|b| b.contents()),
        })
    }
}

struct Completed {
    exit_status: i32,
    output: Option<Vec<u8>>,
    error_output: Option<Vec<u8>>,
}

/// Disconnects the channel and interrupts the captured delivery thread
/// when dropped, on every exit path.
struct ChannelGuard {
    channel: Box<dyn ExecChannel>,
    interrupter: Arc<ReadInterrupter>,
}

impl Deref for ChannelGuard {
    type Target = dyn ExecChannel;

    fn deref(&self) -> &Self::Target {
        self.channel.as_ref()
    }
}

impl DerefMut for ChannelGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.channel.as_mut()
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.channel.disconnect() {
            warn!("failed to disconnect exec channel: {}", e);
        }
        self.interrupter.interrupt();
    }
}

/// Execute a command on a blocking thread of the tokio runtime.
///
/// The protocol is the same as [`CommandExecutor::execute`]; only the
/// caller's task is freed while it runs.
pub async fn execute_async<S>(
    session: Arc<S>,
    options: ExecutorOptions,
    spec: CommandSpec,
) -> Result<ExecResult>
where
    S: RemoteSession + ?Sized + 'static,
{
    tokio::task::spawn_blocking(move || {
        CommandExecutor::with_options(session.as_ref(), options).execute(spec)
    })
    .await
    .map_err(TransportError::from)?
}
