//! How and when a child process ended.

use nix::sys::signal::Signal;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

/// Signal used to force-terminate a child after its deadline.
pub const KILL_SIGNAL: Signal = Signal::SIGKILL;

/// Termination facts of a finished child.
///
/// Exactly one of `exit_code` and `signal` is set. When `timed_out` is true,
/// `signal` is [`KILL_SIGNAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationFacts {
    exit_code: Option<i32>,
    signal: Option<i32>,
    timed_out: bool,
    elapsed: Duration,
}

impl TerminationFacts {
    pub(crate) fn from_status(status: ExitStatus, timed_out: bool, elapsed: Duration) -> Self {
        let signal = status.signal();
        Self {
            exit_code: status.code(),
            signal,
            timed_out: timed_out && signal == Some(KILL_SIGNAL as i32),
            elapsed,
        }
    }

    /// Exit code, `None` if the child was killed by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Raw number of the terminating signal.
    pub fn signal(&self) -> Option<i32> {
        self.signal
    }

    /// Symbolic name of the terminating signal, e.g. `SIGKILL`.
    pub fn signal_name(&self) -> Option<&'static str> {
        self.signal
            .and_then(|raw| Signal::try_from(raw).ok())
            .map(Signal::as_str)
    }

    /// True if the child was killed because its deadline elapsed.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// True if a signal ended the child, including deadline kills.
    pub fn signaled(&self) -> bool {
        self.signal.is_some()
    }

    /// Wall-clock time from just before spawn to reaping.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Exited on its own with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl fmt::Display for TerminationFacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.exit_code, self.signal) {
            (Some(code), _) => write!(f, "exited with code {}", code)?,
            (None, Some(raw)) => {
                if self.timed_out {
                    write!(f, "timed out and was killed")?;
                } else {
                    write!(f, "was terminated by signal")?;
                }
                match self.signal_name() {
                    Some(name) => write!(f, " {} ({})", name, raw)?,
                    None => write!(f, " {}", raw)?,
                }
            }
            (None, None) => write!(f, "ended with unknown status")?,
        }
        write!(f, " after {:.3}s", self.elapsed.as_secs_f64())
    }
}
