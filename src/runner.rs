//! Run orchestration.
//!
//! `Runner` ties the pieces together for one invocation: it opens a
//! monitored stream per output, hands their write ends to the spawn engine,
//! closes every stream whatever the engine reported, and only then builds the
//! [`RunResult`].

use crate::command::CommandLine;
use crate::engine::{spawn_and_wait, Reaped};
use crate::error::{ProcError, RunError, StreamName};
use crate::logger::{Logger, NoopLogger};
use crate::monitored::MonitoredStream;
use crate::options::{RunOptions, RunSettings};
use crate::result::RunResult;
use crate::sink::{Destination, Sink};
use crate::termination::{TerminationFacts, KILL_SIGNAL};
use nix::sys::signal::killpg;
use nix::unistd::Pid;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout_at;
use tracing::Level;

/// What a stream without a caller-supplied destination is drained into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    Discard,
    Capture,
}

/// Destination for one stream, remembering who supplied it.
struct Plan {
    destination: Destination,
    captured: bool,
}

impl Plan {
    fn resolve(explicit: Option<Destination>, fallback: Fallback) -> Self {
        match (explicit, fallback) {
            (Some(destination), _) => Plan {
                destination,
                captured: false,
            },
            (None, Fallback::Capture) => Plan {
                destination: Destination::memory(),
                captured: true,
            },
            (None, Fallback::Discard) => Plan {
                destination: Destination::discard(),
                captured: false,
            },
        }
    }
}

/// Split drained sinks into captured bytes and the caller's own sinks.
fn collect(captured: bool, sinks: Vec<Sink>) -> (Vec<u8>, Vec<Sink>) {
    if !captured {
        return (Vec::new(), sinks);
    }
    let bytes = sinks
        .into_iter()
        .find_map(|sink| match sink {
            Sink::Memory(buf) => Some(buf),
            _ => None,
        })
        .unwrap_or_default();
    (bytes, Vec::new())
}

/// Runs commands and reports each finished run to its logger.
#[derive(Clone)]
pub struct Runner {
    logger: Arc<dyn Logger>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner").finish_non_exhaustive()
    }
}

impl Runner {
    /// A runner that logs nothing.
    pub fn new() -> Self {
        Self::with_logger(NoopLogger)
    }

    pub fn with_logger(logger: impl Logger + 'static) -> Self {
        Self {
            logger: Arc::new(logger),
        }
    }

    /// Spawn `command` with the parent's stdio and wait for it, killing it
    /// if `timeout` elapses first.
    ///
    /// The child stays in the caller's process group so it can keep using an
    /// inherited terminal. A deadline kill therefore reaches the child only,
    /// not its descendants.
    ///
    /// # Errors
    ///
    /// - `ProcError::Config` if the timeout is zero
    /// - `ProcError::Run` if the process couldn't be spawned or waited on
    pub async fn spawn_with_timeout(
        &self,
        command: &CommandLine,
        timeout: Option<Duration>,
    ) -> Result<TerminationFacts, ProcError> {
        let settings = RunSettings::inherited_stdio(timeout)?;
        let facts = spawn_and_wait(command, &settings, Stdio::inherit(), Stdio::inherit())
            .await?
            .facts;
        self.logger
            .log(Level::INFO, &format!("`{}` {}", command, facts));
        Ok(facts)
    }

    /// Run `command`, streaming output to the destinations in `options`.
    ///
    /// Streams without a destination are drained and discarded.
    ///
    /// # Errors
    ///
    /// - `RunError::SpawnFailure` if the process couldn't be started
    /// - `RunError::Io` if a sink failed; takes precedence over the exit status
    /// - `RunError::Wait` if waiting on the process failed
    /// - `RunError::CommandTimedOut`, `CommandSignaled` or `CommandFailed` if
    ///   the command did not succeed and `raise_on_failure` is enabled
    pub async fn run(
        &self,
        command: &CommandLine,
        options: RunOptions,
    ) -> Result<RunResult, RunError> {
        self.execute(command, options, Fallback::Discard).await
    }

    /// Like [`run`](Self::run), but streams without a destination are
    /// captured and exposed through `RunResult::stdout`/`stderr`.
    ///
    /// A stream with an explicit destination goes only there; its captured
    /// field stays empty.
    pub async fn capture(
        &self,
        command: &CommandLine,
        options: RunOptions,
    ) -> Result<RunResult, RunError> {
        self.execute(command, options, Fallback::Capture).await
    }

    /// Blocking [`spawn_with_timeout`](Self::spawn_with_timeout).
    pub fn spawn_with_timeout_sync(
        &self,
        command: &CommandLine,
        timeout: Option<Duration>,
    ) -> Result<TerminationFacts, ProcError> {
        block_on(command, self.spawn_with_timeout(command, timeout))
    }

    /// Blocking [`run`](Self::run).
    pub fn run_sync(
        &self,
        command: &CommandLine,
        options: RunOptions,
    ) -> Result<RunResult, RunError> {
        block_on(command, self.run(command, options))
    }

    /// Blocking [`capture`](Self::capture).
    pub fn capture_sync(
        &self,
        command: &CommandLine,
        options: RunOptions,
    ) -> Result<RunResult, RunError> {
        block_on(command, self.capture(command, options))
    }

    async fn execute(
        &self,
        command: &CommandLine,
        options: RunOptions,
        fallback: Fallback,
    ) -> Result<RunResult, RunError> {
        let RunOptions {
            stdout,
            stderr,
            settings,
        } = options;

        let stdout_plan = Plan::resolve(stdout, fallback);
        let stderr_plan = if settings.merge_stderr() {
            None
        } else {
            Some(Plan::resolve(stderr, fallback))
        };
        let stdout_captured = stdout_plan.captured;
        let stderr_captured = stderr_plan.as_ref().is_some_and(|plan| plan.captured);

        let mut out = open_stream(command, StreamName::Stdout, stdout_plan.destination)?;
        let mut err = match stderr_plan {
            Some(plan) => match open_stream(command, StreamName::Stderr, plan.destination) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    out.close().await;
                    return Err(e);
                }
            },
            None => None,
        };

        let outcome = match child_stdio(&out, err.as_ref()) {
            Ok((child_out, child_err)) => {
                spawn_and_wait(command, &settings, child_out, child_err).await
            }
            Err(e) => Err(RunError::SpawnFailure {
                command: command.to_string(),
                reason: format!("failed to attach output pipes: {}", e),
            }),
        };

        // Every stream is closed before anything is inspected, whatever the
        // engine reported.
        let linger = outcome.as_ref().ok().and_then(Reaped::linger_limit);
        close_streams(&mut out, err.as_mut(), linger).await;

        for stream in std::iter::once(&mut out).chain(err.as_mut()) {
            if let Some(source) = stream.take_error() {
                return Err(RunError::Io {
                    command: command.to_string(),
                    stream: stream.name(),
                    termination: outcome.as_ref().ok().map(|reaped| reaped.facts),
                    source,
                });
            }
        }

        let termination = outcome?.facts;

        let (stdout, stdout_sinks) = collect(stdout_captured, out.into_sinks());
        let (stderr, stderr_sinks) = match err {
            Some(stream) => collect(stderr_captured, stream.into_sinks()),
            None => (Vec::new(), Vec::new()),
        };

        let result = RunResult {
            termination,
            command: command.clone(),
            settings,
            stdout,
            stderr,
            stdout_sinks,
            stderr_sinks,
        };
        self.log(&result);

        if result.settings.raise_on_failure() {
            return check_outcome(result);
        }
        Ok(result)
    }

    fn log(&self, result: &RunResult) {
        self.logger.log(
            Level::INFO,
            &format!("`{}` {}", result.command(), result.termination()),
        );
        self.logger.log(
            Level::DEBUG,
            &format!(
                "`{}` output\nstdout:\n{}\nstderr:\n{}",
                result.command(),
                result.stdout_string(),
                result.stderr_string()
            ),
        );
    }
}

fn open_stream(
    command: &CommandLine,
    name: StreamName,
    destination: Destination,
) -> Result<MonitoredStream, RunError> {
    MonitoredStream::open(name, destination).map_err(|e| RunError::SpawnFailure {
        command: command.to_string(),
        reason: format!("failed to create {} pipe: {}", name, e),
    })
}

/// Close both streams.
///
/// With a deadline and a process group the wait is bounded by the deadline.
/// Descendants that outlived the child may still hold the write ends, so once
/// the deadline passes the group is killed and the drains run to EOF.
async fn close_streams(
    out: &mut MonitoredStream,
    mut err: Option<&mut MonitoredStream>,
    linger: Option<(Instant, Pid)>,
) {
    if let Some((deadline, group)) = linger {
        let closing = async {
            out.close().await;
            if let Some(stream) = err.as_deref_mut() {
                stream.close().await;
            }
        };
        if timeout_at(deadline.into(), closing).await.is_err() {
            tracing::warn!(
                pgid = group.as_raw(),
                "deadline elapsed while output was still open, killing process group"
            );
            if let Err(e) = killpg(group, KILL_SIGNAL) {
                tracing::debug!(pgid = group.as_raw(), error = %e, "process group kill failed");
            }
        }
    }

    out.close().await;
    if let Some(stream) = err {
        stream.close().await;
    }
}

/// Child stdio for both streams; stderr shares stdout's pipe when merged.
fn child_stdio(
    out: &MonitoredStream,
    err: Option<&MonitoredStream>,
) -> std::io::Result<(Stdio, Stdio)> {
    let child_out = out.child_stdio()?;
    let child_err = err.unwrap_or(out).child_stdio()?;
    Ok((child_out, child_err))
}

/// Turn an unsuccessful result into the matching command-outcome error.
fn check_outcome(result: RunResult) -> Result<RunResult, RunError> {
    let termination = *result.termination();
    if termination.timed_out() {
        let timeout = result.settings().timeout().unwrap_or_default();
        Err(RunError::CommandTimedOut {
            result: Box::new(result),
            timeout,
        })
    } else if termination.signaled() {
        Err(RunError::CommandSignaled(Box::new(result)))
    } else if !termination.success() {
        Err(RunError::CommandFailed(Box::new(result)))
    } else {
        Ok(result)
    }
}

/// Drive a run to completion from synchronous code.
fn block_on<T, E, F>(command: &CommandLine, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: From<RunError> + Send,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        // Blocking inside a runtime panics; give the run a runtime of its own.
        std::thread::scope(|s| {
            s.spawn(|| block_on_fresh(command, fut))
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })
    } else {
        block_on_fresh(command, fut)
    }
}

fn block_on_fresh<T, E, F>(command: &CommandLine, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<RunError>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| RunError::SpawnFailure {
            command: command.to_string(),
            reason: format!("failed to create runtime: {}", e),
        })?;
    rt.block_on(fut)
}

/// [`Runner::spawn_with_timeout`] with the default runner.
pub async fn spawn_with_timeout(
    command: &CommandLine,
    timeout: Option<Duration>,
) -> Result<TerminationFacts, ProcError> {
    Runner::new().spawn_with_timeout(command, timeout).await
}

/// [`Runner::run`] with the default runner.
pub async fn run(command: &CommandLine, options: RunOptions) -> Result<RunResult, RunError> {
    Runner::new().run(command, options).await
}

/// [`Runner::capture`] with the default runner.
pub async fn capture(command: &CommandLine, options: RunOptions) -> Result<RunResult, RunError> {
    Runner::new().capture(command, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("/bin/sh", ["-c", script]).unwrap()
    }

    #[derive(Clone, Default)]
    struct Recorded(Arc<Mutex<Vec<(Level, String)>>>);

    impl Logger for Recorded {
        fn log(&self, level: Level, message: &str) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_plan_explicit_destination_wins() {
        let plan = Plan::resolve(Some(Destination::discard()), Fallback::Capture);
        assert!(!plan.captured);
        assert!(plan.destination.is_empty());

        let plan = Plan::resolve(None, Fallback::Capture);
        assert!(plan.captured);
        assert_eq!(plan.destination.len(), 1);

        let plan = Plan::resolve(None, Fallback::Discard);
        assert!(!plan.captured);
        assert!(plan.destination.is_empty());
    }

    #[test]
    fn test_collect_splits_captured_and_caller_sinks() {
        let (bytes, sinks) = collect(true, vec![Sink::Memory(b"hi".to_vec())]);
        assert_eq!(bytes, b"hi");
        assert!(sinks.is_empty());

        let (bytes, sinks) = collect(false, vec![Sink::Memory(b"hi".to_vec())]);
        assert!(bytes.is_empty());
        assert_eq!(sinks.len(), 1);
    }

    #[tokio::test]
    async fn test_logger_receives_summary_and_output() {
        let recorded = Recorded::default();
        let runner = Runner::with_logger(recorded.clone());

        runner
            .capture(&sh("echo logged"), RunOptions::default())
            .await
            .unwrap();

        let events = recorded.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, Level::INFO);
        assert!(events[0].1.contains("exited with code 0"));
        assert_eq!(events[1].0, Level::DEBUG);
        assert!(events[1].1.contains("logged"));
    }

    #[tokio::test]
    async fn test_failure_classification() {
        let err = capture(&sh("echo nope >&2; exit 4"), RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::CommandFailed(_)));
        let message = err.to_string();
        assert!(message.contains("exited with code 4"));
        assert!(message.contains("nope"));

        let err = capture(&sh("kill -TERM $$"), RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::CommandSignaled(_)));
        assert!(err.is_signaled());
        assert!(!err.is_timed_out());
        assert_eq!(err.result().unwrap().signal_name(), Some("SIGTERM"));
    }

    #[test]
    fn test_sync_run_outside_runtime() {
        let result = Runner::new()
            .capture_sync(&sh("printf sync"), RunOptions::default())
            .unwrap();
        assert_eq!(result.stdout(), b"sync");
    }

    #[tokio::test]
    async fn test_sync_run_inside_runtime() {
        let options = RunOptions::builder()
            .timeout(Duration::from_millis(50))
            .raise_on_failure(false)
            .build()
            .unwrap();
        let result = Runner::new()
            .run_sync(&CommandLine::new("sleep", ["5"]).unwrap(), options)
            .unwrap();
        assert!(result.timed_out());
    }
}
