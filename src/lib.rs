//! # proc_tee
//!
//! Run child processes with a deadline while their output streams to any
//! number of sinks.
//!
//! `proc_tee` spawns a command with each output stream redirected into a pipe
//! it owns, drains those pipes in the background while the child runs, and
//! kills the child if it outlives its deadline. The result is only built once
//! every pipe has been drained to EOF, so captured output is always complete.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use proc_tee::{CommandLine, Destination, RunOptions, Sink};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let command = CommandLine::new("/bin/sh", ["-c", "echo HELLO; echo ERR >&2"])?;
//!
//! // Capture both streams into memory
//! let options = RunOptions::builder()
//!     .timeout(Duration::from_secs(30))
//!     .build()?;
//! let result = proc_tee::capture(&command, options).await?;
//! assert_eq!(result.stdout_string(), "HELLO\n");
//! assert_eq!(result.stderr_string(), "ERR\n");
//!
//! // Tee stdout to a log file and a buffer, merge stderr into it
//! let log = std::fs::File::create("/tmp/run.log")?;
//! let options = RunOptions::builder()
//!     .stdout(Destination::from(log).tee(Sink::memory()))
//!     .merge_stderr(true)
//!     .build()?;
//! let result = proc_tee::run(&command, options).await?;
//! let (stdout_sinks, _) = result.into_sinks();
//! println!("{:?}", stdout_sinks[1].as_bytes());
//! # Ok(())
//! # }
//! ```
//!
//! ## Outcomes
//!
//! - Configuration problems are [`ConfigError`]s, returned before anything
//!   is spawned.
//! - Spawn failures and sink failures are always returned as [`RunError`]s.
//!   A sink failure wins over whatever the exit status was.
//! - A non-zero exit, a signal, or a deadline kill is returned as a
//!   [`RunError`] carrying the [`RunResult`] unless `raise_on_failure(false)`
//!   is set, in which case the result is returned and can be inspected.
//!
//! ## Platform Support
//!
//! Unix only (Linux, macOS). Deadline kills are delivered with `SIGKILL`,
//! to the child's whole process group by default.

#[cfg(windows)]
compile_error!(
    "proc_tee does not support Windows. \
     Deadline enforcement relies on Unix signals and process groups."
);

mod command;
mod engine;
mod env_policy;
mod error;
mod logger;
mod monitored;
mod options;
mod result;
mod runner;
mod sink;
mod termination;

// Public API
pub use command::CommandLine;
pub use env_policy::{EnvPolicy, Environment};
pub use error::{ConfigError, ProcError, RunError, StreamName};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use monitored::{MonitoredStream, StreamState};
pub use options::{RunOptions, RunOptionsBuilder, RunSettings, StdinMode};
pub use result::RunResult;
pub use runner::{capture, run, spawn_with_timeout, Runner};
pub use sink::{Destination, Sink};
pub use termination::{TerminationFacts, KILL_SIGNAL};
