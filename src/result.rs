//! Result of a finished run.

use crate::command::CommandLine;
use crate::options::RunSettings;
use crate::sink::Sink;
use crate::termination::TerminationFacts;
use std::time::Duration;

/// Everything known about a finished run.
///
/// Built once, after both output streams have been fully drained.
#[derive(Debug)]
pub struct RunResult {
    pub(crate) termination: TerminationFacts,
    pub(crate) command: CommandLine,
    pub(crate) settings: RunSettings,

    /// Captured stdout, empty unless the run captured it itself.
    pub(crate) stdout: Vec<u8>,

    /// Captured stderr, empty unless the run captured it itself.
    pub(crate) stderr: Vec<u8>,

    /// Caller-supplied stdout sinks, handed back after draining.
    pub(crate) stdout_sinks: Vec<Sink>,

    /// Caller-supplied stderr sinks, handed back after draining.
    pub(crate) stderr_sinks: Vec<Sink>,
}

impl RunResult {
    /// How the child ended.
    pub fn termination(&self) -> &TerminationFacts {
        &self.termination
    }

    /// The command that was run.
    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    /// Settings the run used.
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Check if the process exited successfully (code 0).
    pub fn success(&self) -> bool {
        self.termination.success()
    }

    /// Get the exit code if available.
    pub fn exit_code(&self) -> Option<i32> {
        self.termination.exit_code()
    }

    /// Get the terminating signal number, if the child was killed by one.
    pub fn signal(&self) -> Option<i32> {
        self.termination.signal()
    }

    /// Name of the terminating signal, e.g. `"SIGKILL"`.
    pub fn signal_name(&self) -> Option<&'static str> {
        self.termination.signal_name()
    }

    /// Check if the process was terminated by a signal. Deadline kills count.
    pub fn signaled(&self) -> bool {
        self.termination.signaled()
    }

    /// Check if the deadline elapsed and the child was killed for it.
    ///
    /// A child that exits on its own is never reported as timed out, even
    /// when descendants it left behind were killed at the deadline.
    pub fn timed_out(&self) -> bool {
        self.termination.timed_out()
    }

    /// Wall time from spawn to reap.
    pub fn elapsed(&self) -> Duration {
        self.termination.elapsed()
    }

    /// Captured stdout bytes.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Captured stderr bytes.
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Get stdout as a string (lossy UTF-8 conversion).
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Get stderr as a string (lossy UTF-8 conversion).
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// The caller's stdout sinks, after every chunk was written to them.
    /// Empty when stdout was captured or discarded.
    pub fn stdout_sinks(&self) -> &[Sink] {
        &self.stdout_sinks
    }

    /// The caller's stderr sinks.
    pub fn stderr_sinks(&self) -> &[Sink] {
        &self.stderr_sinks
    }

    /// Take back the caller's `(stdout, stderr)` sinks.
    pub fn into_sinks(self) -> (Vec<Sink>, Vec<Sink>) {
        (self.stdout_sinks, self.stderr_sinks)
    }
}
