//! Stream bindings and the adapters handed to exec channels.
//!
//! Channels receive plain `Read`/`Write` trait objects. The executor wraps
//! the caller's bindings so that:
//! - the input is only read once it reports bytes ready, so no thread is
//!   left inside a blocking read when a run ends,
//! - dropping an output or error writer signals the completion latch.

use std::fmt;
use std::io::{self, Read, Write};
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, Thread};
use std::time::Duration;

use tracing::{debug, trace};

use super::latch::CompletionLatch;

/// Default interval between polls of the input for available bytes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A reader that can tell whether the next read returns without blocking.
///
/// The executor only calls [`Read::read`] after `read_ready` returned
/// `true`, so bytes arriving after a run ended stay in the source.
pub trait PollRead: Read + Send {
    /// `true` when data is available, or the source reached EOF or failed.
    fn read_ready(&mut self) -> io::Result<bool>;
}

impl<T: AsRef<[u8]> + Send> PollRead for io::Cursor<T> {
    fn read_ready(&mut self) -> io::Result<bool> {
        Ok(true)
    }
}

impl PollRead for io::Empty {
    fn read_ready(&mut self) -> io::Result<bool> {
        Ok(true)
    }
}

/// Unbuffered file-descriptor reader polled with `poll(2)`.
///
/// Wrap pipes, sockets and terminals. A reader with its own user-space
/// buffer must not be wrapped: `poll` cannot see the buffered bytes.
#[cfg(unix)]
#[derive(Debug)]
pub struct FdReader<R> {
    inner: R,
}

#[cfg(unix)]
impl<R: Read + AsRawFd + Send> FdReader<R> {
    /// Wrap `inner`.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(unix)]
impl<R: Read + AsRawFd + Send> Read for FdReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

#[cfg(unix)]
impl<R: Read + AsRawFd + Send> PollRead for FdReader<R> {
    fn read_ready(&mut self) -> io::Result<bool> {
        poll_readable(self.inner.as_raw_fd())
    }
}

/// Zero-timeout readiness check of one descriptor.
#[cfg(unix)]
fn poll_readable(fd: RawFd) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: a single valid pollfd and a zero timeout.
    let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    let ready = libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;
    Ok(rc > 0 && pfd.revents & ready != 0)
}

/// The process's standard input.
///
/// On Unix descriptor 0 is polled and read directly, at most the requested
/// length per read; bytes already sitting in `std::io::stdin()`'s buffer
/// are not seen. Elsewhere one reader thread per process feeds a shared
/// queue; bytes it reads after a run are kept for the next one.
struct StdinSource;

#[cfg(unix)]
impl Read for StdinSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
        let n = unsafe { libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}

#[cfg(unix)]
impl PollRead for StdinSource {
    fn read_ready(&mut self) -> io::Result<bool> {
        poll_readable(libc::STDIN_FILENO)
    }
}

#[cfg(not(unix))]
mod shared_stdin {
    use std::io::{self, Read};
    use std::sync::{Mutex, OnceLock};
    use std::thread;

    use tokio::sync::mpsc;
    use tokio::sync::mpsc::error::TryRecvError;
    use tracing::{debug, warn};

    const READ_BUFFER_SIZE: usize = 4096;
    const QUEUE_CAPACITY: usize = 16;

    pub(super) struct SharedStdin {
        rx: mpsc::Receiver<Vec<u8>>,
        pending: Vec<u8>,
        pos: usize,
        eof: bool,
    }

    impl SharedStdin {
        fn fill(&mut self) {
            if self.pos < self.pending.len() || self.eof {
                return;
            }
            match self.rx.try_recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.eof = true,
            }
        }

        pub(super) fn ready(&mut self) -> bool {
            self.fill();
            self.eof || self.pos < self.pending.len()
        }

        pub(super) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.fill();
            if self.pos < self.pending.len() {
                let n = buf.len().min(self.pending.len() - self.pos);
                buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.eof {
                return Ok(0);
            }
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no stdin bytes ready"))
        }
    }

    pub(super) fn get() -> &'static Mutex<SharedStdin> {
        static STDIN: OnceLock<Mutex<SharedStdin>> = OnceLock::new();
        STDIN.get_or_init(|| {
            let (tx, rx) = mpsc::channel::<Vec<u8>>(QUEUE_CAPACITY);
            let spawned = thread::Builder::new()
                .name("remote-exec-stdin".into())
                .spawn(move || {
                    let mut stdin = io::stdin();
                    let mut buf = vec![0u8; READ_BUFFER_SIZE];
                    loop {
                        match stdin.read(&mut buf) {
                            Ok(0) => break,
                            Ok(n) => {
                                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                                    break;
                                }
                            }
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                            Err(e) => {
                                debug!("stdin reader stopped: {}", e);
                                break;
                            }
                        }
                    }
                });
            if let Err(e) = spawned {
                warn!("failed to start stdin reader, stdin reads as empty: {}", e);
            }
            Mutex::new(SharedStdin {
                rx,
                pending: Vec::new(),
                pos: 0,
                eof: false,
            })
        })
    }
}

#[cfg(not(unix))]
impl Read for StdinSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        shared_stdin::get()
            .lock()
            .map_err(|_| poisoned())?
            .read(buf)
    }
}

#[cfg(not(unix))]
impl PollRead for StdinSource {
    fn read_ready(&mut self) -> io::Result<bool> {
        Ok(shared_stdin::get().lock().map_err(|_| poisoned())?.ready())
    }
}

/// Source bound to the remote process's standard input.
pub enum Input {
    /// The current process's standard input.
    Stdin,
    /// No input; the remote side sees EOF immediately.
    Null,
    /// A fixed buffer.
    Bytes(Vec<u8>),
    /// Any reader that can report readiness.
    Reader(Box<dyn PollRead>),
}

impl Default for Input {
    fn default() -> Self {
        Self::Stdin
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("Stdin"),
            Self::Null => f.write_str("Null"),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl Input {
    /// Bind any [`PollRead`] source.
    pub fn reader(source: impl PollRead + 'static) -> Self {
        Self::Reader(Box::new(source))
    }

    /// Bind an unbuffered descriptor-backed reader, such as a pipe or a
    /// socket.
    #[cfg(unix)]
    pub fn fd(reader: impl Read + AsRawFd + Send + 'static) -> Self {
        Self::reader(FdReader::new(reader))
    }

    /// Turn this binding into an interruptible reader.
    pub(crate) fn into_interruptible(
        self,
        interrupter: Arc<ReadInterrupter>,
        poll_interval: Duration,
    ) -> InterruptibleInput {
        let source: Box<dyn PollRead> = match self {
            Self::Null => Box::new(io::empty()),
            Self::Bytes(bytes) => Box::new(io::Cursor::new(bytes)),
            Self::Stdin => Box::new(StdinSource),
            Self::Reader(reader) => reader,
        };

        InterruptibleInput {
            source,
            interrupter,
            poll_interval,
        }
    }
}

/// Sink bound to the remote process's output or error stream.
pub enum Output {
    /// The current process's standard output.
    Stdout,
    /// The current process's standard error.
    Stderr,
    /// Discard everything.
    Null,
    /// Collect into memory; returned with the execution result.
    Capture,
    /// Any writer.
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stdout"),
            Self::Stderr => f.write_str("Stderr"),
            Self::Null => f.write_str("Null"),
            Self::Capture => f.write_str("Capture"),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl Output {
    /// Resolve this binding into a shareable sink.
    ///
    /// For [`Output::Capture`] the capture buffer is returned too.
    pub(crate) fn into_sink(self) -> (SharedSink, Option<CaptureBuffer>) {
        match self {
            Self::Stdout => (SharedSink::new(io::stdout()), None),
            Self::Stderr => (SharedSink::new(io::stderr()), None),
            Self::Null => (SharedSink::new(io::sink()), None),
            Self::Writer(writer) => (SharedSink::from_boxed(writer), None),
            Self::Capture => {
                let buffer = CaptureBuffer::default();
                (SharedSink::new(buffer.clone()), Some(buffer))
            }
        }
    }
}

/// The three stream bindings of a command.
#[derive(Debug, Default)]
pub struct Streams {
    /// Standard input source.
    pub input: Input,
    /// Standard output sink.
    pub output: Output,
    /// Standard error sink.
    pub error: Output,
}

impl Default for Output {
    fn default() -> Self {
        Self::Stdout
    }
}

impl Streams {
    /// Bindings left behind in a spec whose streams were handed to a run.
    pub(crate) fn consumed() -> Self {
        Self {
            input: Input::Null,
            output: Output::Null,
            error: Output::Null,
        }
    }

    /// Default bindings: process stdin, stdout and stderr.
    pub fn standard() -> Self {
        Self {
            input: Input::Stdin,
            output: Output::Stdout,
            error: Output::Stderr,
        }
    }
}

/// In-memory buffer shared between a capturing sink and the executor.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(|_| poisoned())?.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Cloneable writer; clones write to the same underlying sink.
///
/// Used when stderr is merged into stdout so both channel streams feed
/// one destination.
#[derive(Clone)]
pub struct SharedSink(Arc<Mutex<Box<dyn Write + Send>>>);

impl SharedSink {
    /// Wrap a writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self::from_boxed(Box::new(writer))
    }

    fn from_boxed(writer: Box<dyn Write + Send>) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }
}

impl fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSink(..)")
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(|_| poisoned())?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().map_err(|_| poisoned())?.flush()
    }
}

/// Writer handed to a channel; closing it counts the latch down.
///
/// Closing flushes but never closes the underlying sink, which may be
/// the caller's stdout or shared with the other stream.
#[derive(Debug)]
pub struct LatchedWriter {
    sink: SharedSink,
    latch: Arc<CompletionLatch>,
    label: &'static str,
    closed: bool,
}

impl LatchedWriter {
    pub(crate) fn new(sink: SharedSink, latch: Arc<CompletionLatch>, label: &'static str) -> Self {
        Self {
            sink,
            latch,
            label,
            closed: false,
        }
    }

    /// Flush and signal completion. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.sink.flush() {
            debug!("{} sink flush failed on close: {}", self.label, e);
        }
        trace!("{} stream closed", self.label);
        self.latch.count_down();
    }
}

impl Write for LatchedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} stream already closed", self.label),
            ));
        }
        self.sink.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl Drop for LatchedWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Captures the transport's delivery thread and interrupts it on cleanup.
///
/// The first thread that reads from an [`InterruptibleInput`] is recorded.
/// Interrupting sets a flag observed on every poll and unparks that thread
/// so it wakes immediately instead of finishing its poll interval.
#[derive(Debug, Default)]
pub struct ReadInterrupter {
    thread: OnceLock<Thread>,
    interrupted: AtomicBool,
    interrupts: AtomicUsize,
}

impl ReadInterrupter {
    /// Create an interrupter with no captured thread.
    pub fn new() -> Self {
        Self::default()
    }

    fn capture_current(&self) {
        self.thread.get_or_init(thread::current);
    }

    /// The captured delivery thread, if any read happened.
    pub fn captured(&self) -> Option<&Thread> {
        self.thread.get()
    }

    /// Whether [`interrupt`](Self::interrupt) has been called.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Number of times a captured thread was interrupted.
    pub fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    /// Abort pending and future reads.
    ///
    /// Returns `true` when a captured delivery thread was woken.
    pub fn interrupt(&self) -> bool {
        self.interrupted.store(true, Ordering::SeqCst);
        match self.thread.get() {
            Some(thread) => {
                trace!("Interrupting thread [{}]", thread.name().unwrap_or("<unnamed>"));
                self.interrupts.fetch_add(1, Ordering::SeqCst);
                thread.unpark();
                true
            }
            None => false,
        }
    }
}

/// Input adapter that never blocks inside the underlying read.
///
/// The source is read only once it reports ready; otherwise the reading
/// thread parks for the poll interval and checks again, so an interrupt
/// aborts the read with [`io::ErrorKind::ConnectionAborted`].
pub struct InterruptibleInput {
    source: Box<dyn PollRead>,
    interrupter: Arc<ReadInterrupter>,
    poll_interval: Duration,
}

impl fmt::Debug for InterruptibleInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptibleInput")
            .field("poll_interval", &self.poll_interval)
            .field("interrupted", &self.interrupter.is_interrupted())
            .finish()
    }
}

impl InterruptibleInput {
    fn aborted() -> io::Error {
        io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "interrupted while waiting for input",
        )
    }
}

impl Read for InterruptibleInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.interrupter.capture_current();

        loop {
            if self.interrupter.is_interrupted() {
                return Err(Self::aborted());
            }
            if buf.is_empty() {
                return Ok(0);
            }

            if self.source.read_ready()? {
                // the run may have ended while polling
                if self.interrupter.is_interrupted() {
                    return Err(Self::aborted());
                }
                return self.source.read(buf);
            }
            thread::park_timeout(self.poll_interval);
        }
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "stream lock poisoned")
}
