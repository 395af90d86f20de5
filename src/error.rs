//! Error types for proc_tee.
//!
//! This module defines two main error categories:
//! - [`ConfigError`]: Invalid commands or options detected while building a run - nothing is spawned
//! - [`RunError`]: Failures during a run - the process could not be run, its output could not be
//!   delivered, or the command itself did not succeed

use crate::result::RunResult;
use crate::termination::TerminationFacts;
use std::time::Duration;
use thiserror::Error;

/// Which of the child's output streams an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamName {
    /// Standard output (also carries standard error when merged).
    Stdout,
    /// Standard error.
    Stderr,
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamName::Stdout => write!(f, "stdout"),
            StreamName::Stderr => write!(f, "stderr"),
        }
    }
}

/// Invalid command or options, detected before any process is created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The command has no program to execute
    #[error("command is empty")]
    EmptyCommand,

    /// A program, argument or environment entry contains an interior NUL byte
    #[error("{what} contains a NUL byte: {value:?}")]
    NulByte { what: &'static str, value: String },

    /// Merging stderr into stdout and redirecting stderr are mutually exclusive
    #[error("merge_stderr cannot be combined with an explicit stderr destination")]
    MergeConflict,

    /// The deadline is not a positive duration
    #[error("timeout must be positive, got {timeout:?}")]
    InvalidTimeout { timeout: Duration },

    /// Environment variable name cannot be passed to a child
    #[error("invalid environment variable name {key:?}: {reason}")]
    InvalidEnvKey { key: String, reason: &'static str },

    /// Working directory does not exist or is not a directory
    #[error("invalid working directory {path}: {reason}")]
    WorkingDirectory { path: String, reason: String },
}

/// Failure of a run.
///
/// `SpawnFailure`, `Io` and `Wait` mean the run could not be completed and are
/// always returned. The command-outcome variants carry the finished
/// [`RunResult`] and are only returned when `raise_on_failure` is enabled.
#[derive(Debug, Error)]
pub enum RunError {
    /// The process could not be created
    #[error("failed to spawn `{command}`: {reason}")]
    SpawnFailure { command: String, reason: String },

    /// A destination sink failed while output was being drained
    ///
    /// `termination` is how the child ended, when it was reaped.
    #[error("failed to deliver {stream} of `{command}`: {source}{}", termination_suffix(.termination))]
    Io {
        command: String,
        stream: StreamName,
        termination: Option<TerminationFacts>,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the spawned child failed
    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The child exited with a non-zero status
    #[error("{}", outcome_message(.0))]
    CommandFailed(Box<RunResult>),

    /// The child was terminated by a signal it did not handle
    #[error("{}", outcome_message(.0))]
    CommandSignaled(Box<RunResult>),

    /// The child was killed after exceeding its deadline
    #[error("{} (timeout: {timeout:?})", outcome_message(.result))]
    CommandTimedOut {
        result: Box<RunResult>,
        timeout: Duration,
    },
}

impl RunError {
    /// The run result carried by command-outcome failures.
    pub fn result(&self) -> Option<&RunResult> {
        match self {
            RunError::CommandFailed(result) | RunError::CommandSignaled(result) => Some(result),
            RunError::CommandTimedOut { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Take ownership of the carried run result.
    pub fn into_result(self) -> Option<RunResult> {
        match self {
            RunError::CommandFailed(result) | RunError::CommandSignaled(result) => Some(*result),
            RunError::CommandTimedOut { result, .. } => Some(*result),
            _ => None,
        }
    }

    /// True for signal terminations, including deadline kills.
    pub fn is_signaled(&self) -> bool {
        matches!(
            self,
            RunError::CommandSignaled(_) | RunError::CommandTimedOut { .. }
        )
    }

    /// True when the deadline elapsed and the child was killed.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, RunError::CommandTimedOut { .. })
    }
}

fn termination_suffix(termination: &Option<TerminationFacts>) -> String {
    match termination {
        Some(facts) => format!(" (process {})", facts),
        None => String::new(),
    }
}

fn outcome_message(result: &RunResult) -> String {
    let mut message = format!("`{}` {}", result.command(), result.termination());
    let stderr = result.stderr_string();
    let stderr = stderr.trim_end();
    if !stderr.is_empty() {
        message.push_str("\nstderr:\n");
        message.push_str(stderr);
    }
    message
}

/// Combined error type for the build-and-run flow.
#[derive(Debug, Error)]
pub enum ProcError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Run(#[from] RunError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    #[test]
    fn test_io_message_includes_termination() {
        let facts = TerminationFacts::from_status(
            ExitStatus::from_raw(1 << 8),
            false,
            Duration::from_millis(5),
        );
        let err = RunError::Io {
            command: "make all".to_string(),
            stream: StreamName::Stderr,
            termination: Some(facts),
            source: io::Error::other("disk full"),
        };

        assert_eq!(
            err.to_string(),
            "failed to deliver stderr of `make all`: disk full (process exited with code 1 after 0.005s)"
        );
        assert!(err.result().is_none());
        assert!(!err.is_signaled());
    }

    #[test]
    fn test_io_message_without_termination() {
        let err = RunError::Io {
            command: "cat".to_string(),
            stream: StreamName::Stdout,
            termination: None,
            source: io::Error::other("disk full"),
        };
        assert_eq!(err.to_string(), "failed to deliver stdout of `cat`: disk full");
    }

    #[test]
    fn test_wait_failure_carries_no_result() {
        let err = RunError::Wait {
            command: "sleep 1".to_string(),
            source: io::Error::from(io::ErrorKind::Interrupted),
        };

        assert!(err.to_string().starts_with("failed to wait for `sleep 1`: "));
        assert!(err.result().is_none());
        assert!(!err.is_signaled());
        assert!(!err.is_timed_out());
        let source = std::error::Error::source(&err).expect("io source");
        assert!(source.is::<io::Error>());
        assert!(matches!(ProcError::from(err), ProcError::Run(RunError::Wait { .. })));
    }
}
