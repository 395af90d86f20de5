//! Run options.
//!
//! `RunOptions` is the resolved, validated configuration of one run. Build it
//! with `RunOptions::builder()`; every check happens in `build()`, before any
//! process exists.

use crate::env_policy::{EnvPolicy, Environment};
use crate::error::ConfigError;
use crate::sink::Destination;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What the child sees on its standard input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StdinMode {
    /// `/dev/null` (default).
    #[default]
    Null,
    /// The parent's standard input.
    Inherit,
}

/// Immutable settings of a run, kept on the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    timeout: Option<Duration>,
    merge_stderr: bool,
    raise_on_failure: bool,
    env: Environment,
    current_dir: Option<PathBuf>,
    stdin: StdinMode,
    kill_process_group: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            merge_stderr: false,
            raise_on_failure: true,
            env: Environment::default(),
            current_dir: None,
            stdin: StdinMode::default(),
            kill_process_group: true,
        }
    }
}

impl RunSettings {
    /// Deadline after which the child is killed. `None` waits forever.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether stderr is redirected into the stdout stream.
    pub fn merge_stderr(&self) -> bool {
        self.merge_stderr
    }

    /// Whether unsuccessful commands are returned as errors.
    pub fn raise_on_failure(&self) -> bool {
        self.raise_on_failure
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Canonicalized working directory, `None` to use the parent's.
    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn stdin(&self) -> StdinMode {
        self.stdin
    }

    /// Whether the child leads its own process group and the deadline kill
    /// is delivered to the whole group.
    pub fn kill_process_group(&self) -> bool {
        self.kill_process_group
    }

    /// Settings for a child sharing the parent's stdio. It is not moved into
    /// a group of its own: a background process group writing to the
    /// controlling terminal would be stopped by `SIGTTOU`.
    pub(crate) fn inherited_stdio(timeout: Option<Duration>) -> Result<Self, ConfigError> {
        Ok(Self {
            timeout: check_timeout(timeout)?,
            kill_process_group: false,
            ..Self::default()
        })
    }
}

/// Validated options for one run.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub(crate) stdout: Option<Destination>,
    pub(crate) stderr: Option<Destination>,
    pub(crate) settings: RunSettings,
}

impl RunOptions {
    /// Create a new options builder.
    pub fn builder() -> RunOptionsBuilder {
        RunOptionsBuilder::new()
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// True if the caller supplied a stdout destination.
    pub fn has_stdout(&self) -> bool {
        self.stdout.is_some()
    }

    /// True if the caller supplied a stderr destination.
    pub fn has_stderr(&self) -> bool {
        self.stderr.is_some()
    }
}

/// Builder for `RunOptions`.
#[derive(Debug)]
pub struct RunOptionsBuilder {
    stdout: Option<Destination>,
    stderr: Option<Destination>,
    timeout: Option<Duration>,
    merge_stderr: bool,
    raise_on_failure: bool,
    env_policy: EnvPolicy,
    env: BTreeMap<String, String>,
    env_remove: Vec<String>,
    current_dir: Option<PathBuf>,
    stdin: StdinMode,
    kill_process_group: bool,
}

impl RunOptionsBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        let defaults = RunSettings::default();
        Self {
            stdout: None,
            stderr: None,
            timeout: defaults.timeout,
            merge_stderr: defaults.merge_stderr,
            raise_on_failure: defaults.raise_on_failure,
            env_policy: EnvPolicy::default(),
            env: BTreeMap::new(),
            env_remove: Vec::new(),
            current_dir: None,
            stdin: defaults.stdin,
            kill_process_group: defaults.kill_process_group,
        }
    }

    /// Send stdout to `destination`.
    pub fn stdout(mut self, destination: impl Into<Destination>) -> Self {
        self.stdout = Some(destination.into());
        self
    }

    /// Send stderr to `destination`. Conflicts with `merge_stderr(true)`.
    pub fn stderr(mut self, destination: impl Into<Destination>) -> Self {
        self.stderr = Some(destination.into());
        self
    }

    /// Kill the child if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Redirect stderr into the stdout stream.
    pub fn merge_stderr(mut self, merge: bool) -> Self {
        self.merge_stderr = merge;
        self
    }

    /// Return command failures as errors (default: true).
    pub fn raise_on_failure(mut self, raise: bool) -> Self {
        self.raise_on_failure = raise;
        self
    }

    /// Set the base environment policy.
    pub fn env_policy(mut self, policy: EnvPolicy) -> Self {
        self.env_policy = policy;
        self
    }

    /// Set a single environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Remove a variable from the inherited environment.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn stdin(mut self, mode: StdinMode) -> Self {
        self.stdin = mode;
        self
    }

    /// Run the child in its own process group (default: true).
    pub fn kill_process_group(mut self, enabled: bool) -> Self {
        self.kill_process_group = enabled;
        self
    }

    /// Build the options.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Both `merge_stderr` and a stderr destination are set
    /// - The timeout is zero
    /// - An environment name or value cannot be passed to a child
    /// - The working directory does not exist or is not a directory
    pub fn build(self) -> Result<RunOptions, ConfigError> {
        if self.merge_stderr && self.stderr.is_some() {
            return Err(ConfigError::MergeConflict);
        }

        let timeout = check_timeout(self.timeout)?;
        let env = Environment::new(self.env_policy, self.env, self.env_remove)?;
        let current_dir = self
            .current_dir
            .as_deref()
            .map(resolve_dir)
            .transpose()?;

        Ok(RunOptions {
            stdout: self.stdout,
            stderr: self.stderr,
            settings: RunSettings {
                timeout,
                merge_stderr: self.merge_stderr,
                raise_on_failure: self.raise_on_failure,
                env,
                current_dir,
                stdin: self.stdin,
                kill_process_group: self.kill_process_group,
            },
        })
    }
}

impl Default for RunOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_timeout(timeout: Option<Duration>) -> Result<Option<Duration>, ConfigError> {
    match timeout {
        Some(t) if t.is_zero() => Err(ConfigError::InvalidTimeout { timeout: t }),
        other => Ok(other),
    }
}

/// Canonicalize a working directory and make sure it is a directory.
fn resolve_dir(dir: &Path) -> Result<PathBuf, ConfigError> {
    let canonical = std::fs::canonicalize(dir).map_err(|e| ConfigError::WorkingDirectory {
        path: dir.display().to_string(),
        reason: format!("failed to canonicalize: {}", e),
    })?;

    if !canonical.is_dir() {
        return Err(ConfigError::WorkingDirectory {
            path: dir.display().to_string(),
            reason: "not a directory".to_string(),
        });
    }

    Ok(canonical)
}
