//! Spawn engine.
//!
//! Spawns the child with its output bound to caller-provided `Stdio`s, races
//! its exit against the deadline, and on expiry kills and reaps it. The
//! engine never reads output itself; `Reaped` carries what the runner needs
//! to keep bounding the drain once the child is gone.

use crate::command::CommandLine;
use crate::error::RunError;
use crate::options::{RunSettings, StdinMode};
use crate::termination::{TerminationFacts, KILL_SIGNAL};
use nix::sys::signal::killpg;
use nix::unistd::Pid;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::process::Child;
use tokio::time::timeout;

/// A reaped child.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reaped {
    pub(crate) facts: TerminationFacts,
    /// Process group the child led. Descendants stay in it after the child
    /// is reaped.
    pub(crate) group: Option<Pid>,
    /// When the configured timeout runs out, measured from spawn.
    pub(crate) deadline: Option<Instant>,
}

impl Reaped {
    /// The group to kill once `deadline` passes, if both are known. `None`
    /// after a deadline kill, which already took the group down.
    pub(crate) fn linger_limit(&self) -> Option<(Instant, Pid)> {
        if self.facts.timed_out() {
            return None;
        }
        Some((self.deadline?, self.group?))
    }
}

/// Spawn `command`, wait for it within the configured deadline, and report
/// how it ended.
///
/// # Errors
///
/// - `RunError::SpawnFailure` if the process couldn't be started
/// - `RunError::Wait` if waiting on the started process failed
pub(crate) async fn spawn_and_wait(
    command: &CommandLine,
    settings: &RunSettings,
    stdout: Stdio,
    stderr: Stdio,
) -> Result<Reaped, RunError> {
    let mut cmd = command.to_tokio();
    cmd.stdout(stdout)
        .stderr(stderr)
        .stdin(match settings.stdin() {
            StdinMode::Null => Stdio::null(),
            StdinMode::Inherit => Stdio::inherit(),
        })
        .kill_on_drop(true);
    settings.env().apply(&mut cmd);
    if let Some(dir) = settings.current_dir() {
        cmd.current_dir(dir);
    }
    if settings.kill_process_group() {
        cmd.process_group(0);
    }

    let start = Instant::now();
    let spawned = cmd.spawn();
    // The command still owns the parent's copies of the child's stdio.
    drop(cmd);

    let mut child = spawned.map_err(|e| RunError::SpawnFailure {
        command: command.to_string(),
        reason: e.to_string(),
    })?;
    let pid = child.id();
    tracing::debug!(pid, command = %command, "process spawned");
    let group = match pid {
        Some(pid) if settings.kill_process_group() => Some(Pid::from_raw(pid as i32)),
        _ => None,
    };
    let deadline = settings.timeout().map(|limit| start + limit);

    let (status, killed) = match settings.timeout() {
        None => (wait(&mut child, command).await?, false),
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => (status.map_err(|e| wait_error(command, e))?, false),
            Err(_) => {
                tracing::warn!(pid, timeout = ?limit, command = %command, "deadline elapsed, killing process");
                let killed = force_kill(&mut child, settings.kill_process_group());
                // SIGKILL cannot be caught, so this wait is not bounded.
                (wait(&mut child, command).await?, killed)
            }
        },
    };
    let elapsed = start.elapsed();

    let facts = TerminationFacts::from_status(status, killed, elapsed);
    tracing::debug!(pid, facts = %facts, "process reaped");
    Ok(Reaped {
        facts,
        group,
        deadline,
    })
}

async fn wait(child: &mut Child, command: &CommandLine) -> Result<ExitStatus, RunError> {
    child.wait().await.map_err(|e| wait_error(command, e))
}

fn wait_error(command: &CommandLine, source: std::io::Error) -> RunError {
    RunError::Wait {
        command: command.to_string(),
        source,
    }
}

/// Deliver the kill signal. Returns false if nothing was signalled because
/// the child had already been reaped.
fn force_kill(child: &mut Child, group: bool) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };

    if group {
        match killpg(Pid::from_raw(pid as i32), KILL_SIGNAL) {
            Ok(()) => return true,
            Err(e) => {
                tracing::debug!(pid, error = %e, "process group kill failed, killing child only");
            }
        }
    }

    match child.start_kill() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(pid, error = %e, "failed to kill process");
            false
        }
    }
}
