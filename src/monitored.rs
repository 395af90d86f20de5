//! Pipe-backed output streams drained in the background.
//!
//! A [`MonitoredStream`] owns one OS pipe. The write end is handed to the
//! child; the read end is drained on a blocking task that fans every chunk
//! out to the stream's sinks. Sink failures are recorded, never raised on the
//! drain task, and become visible after [`MonitoredStream::close`].

use crate::error::StreamName;
use crate::sink::{Destination, Sink};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::OwnedFd;
use std::process::Stdio;
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 16 * 1024;

/// Lifecycle of a monitored stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Pipe allocated, drain task not started.
    Open,
    /// Drain task running.
    Draining,
    /// Drain task joined and both pipe ends closed.
    Closed,
}

/// What the drain task hands back when it finishes.
struct DrainOutcome {
    sinks: Vec<Sink>,
    bytes: u64,
    error: Option<io::Error>,
}

/// One child output stream, drained concurrently into its sinks.
#[derive(Debug)]
pub struct MonitoredStream {
    name: StreamName,
    writer: Option<OwnedFd>,
    task: Option<JoinHandle<DrainOutcome>>,
    state: StreamState,
    sinks: Vec<Sink>,
    bytes: u64,
    error: Option<io::Error>,
}

impl std::fmt::Debug for DrainOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainOutcome")
            .field("bytes", &self.bytes)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl MonitoredStream {
    /// Allocate a pipe and start draining it into `destination`.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime; the drain runs on the
    /// runtime's blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the pipe cannot be created.
    pub fn open(name: StreamName, destination: Destination) -> io::Result<Self> {
        let (reader, writer) = cloexec_pipe()?;
        let mut stream = Self {
            name,
            writer: Some(writer),
            task: None,
            state: StreamState::Open,
            sinks: Vec::new(),
            bytes: 0,
            error: None,
        };
        stream.start(File::from(reader), destination.into_sinks());
        Ok(stream)
    }

    fn start(&mut self, reader: File, sinks: Vec<Sink>) {
        let name = self.name;
        self.task = Some(tokio::task::spawn_blocking(move || {
            drain(name, reader, sinks)
        }));
        self.state = StreamState::Draining;
    }

    /// A `Stdio` for the child that writes into this stream's pipe.
    ///
    /// Each call duplicates the write end, so stdout and stderr can share one
    /// stream. The duplicate is close-on-exec in the parent and is closed
    /// when the `Stdio` (or the command holding it) is dropped.
    pub fn child_stdio(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.clone_writer()?))
    }

    pub(crate) fn clone_writer(&self) -> io::Result<OwnedFd> {
        match &self.writer {
            Some(fd) => fd.try_clone(),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} write end already closed", self.name),
            )),
        }
    }

    /// Close the write end and wait for the drain task to finish.
    ///
    /// Returns once every byte the child wrote has been delivered, or the
    /// first sink failure stopped the drain. Calling it again is a no-op.
    ///
    /// Cancel safe: if the future is dropped before the drain finishes, a
    /// later call picks up the same drain task.
    pub async fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }

        // EOF only arrives once every copy of the write end is gone.
        self.writer.take();

        if let Some(task) = self.task.as_mut() {
            let joined = task.await;
            self.task = None;
            match joined {
                Ok(outcome) => {
                    self.sinks = outcome.sinks;
                    self.bytes = outcome.bytes;
                    self.error = outcome.error;
                }
                Err(err) => {
                    tracing::warn!(stream = %self.name, error = %err, "drain task did not complete");
                    self.error = Some(io::Error::other(format!("drain task failed: {}", err)));
                }
            }
        }

        self.state = StreamState::Closed;
    }

    /// Which child stream this is.
    pub fn name(&self) -> StreamName {
        self.name
    }

    /// Current lifecycle state. `Closed` only after [`close`](Self::close)
    /// has returned.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Bytes read from the pipe. Final only once closed.
    pub fn bytes_drained(&self) -> u64 {
        self.bytes
    }

    /// The first sink (or pipe read) failure, available once closed.
    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    pub(crate) fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// The sinks, handed back by the drain task once closed.
    pub fn sinks(&self) -> &[Sink] {
        &self.sinks
    }

    pub fn into_sinks(self) -> Vec<Sink> {
        self.sinks
    }
}

/// Read `reader` to EOF, writing each chunk to every sink in order.
fn drain(name: StreamName, mut reader: File, mut sinks: Vec<Sink>) -> DrainOutcome {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes = 0u64;
    let mut error = None;

    'read: loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(stream = %name, error = %e, "pipe read failed");
                error = Some(e);
                break;
            }
        };
        bytes += n as u64;

        for sink in sinks.iter_mut() {
            if let Err(e) = sink.write_chunk(&buf[..n]) {
                tracing::warn!(stream = %name, sink = ?sink, error = %e, "sink write failed, stopping drain");
                error = Some(e);
                break 'read;
            }
        }
    }

    if error.is_none() {
        error = sinks.iter_mut().find_map(|sink| sink.flush().err());
    }

    // Closing the read end early makes further child writes fail with EPIPE
    // instead of blocking on a full pipe.
    drop(reader);

    tracing::debug!(stream = %name, bytes, failed = error.is_some(), "drain finished");

    DrainOutcome { sinks, bytes, error }
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
))]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::OFlag;

    nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(io::Error::from)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris"
)))]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::os::fd::AsRawFd;

    let (reader, writer) = nix::unistd::pipe()?;
    for fd in [&reader, &writer] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((reader, writer))
}
