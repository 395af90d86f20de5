//! Per-run logging hook.
//!
//! A [`Runner`](crate::Runner) reports each finished run to its logger: one
//! INFO summary and one DEBUG dump of captured output.

use tracing::Level;

/// Receives the log events of finished runs.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Drops every event. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _message: &str) {}
}

/// Forwards events to `tracing` under the `proc_tee::run` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "proc_tee::run", "{}", message),
            Level::WARN => tracing::warn!(target: "proc_tee::run", "{}", message),
            Level::INFO => tracing::info!(target: "proc_tee::run", "{}", message),
            Level::DEBUG => tracing::debug!(target: "proc_tee::run", "{}", message),
            _ => tracing::trace!(target: "proc_tee::run", "{}", message),
        }
    }
}

impl<F> Logger for F
where
    F: Fn(Level, &str) + Send + Sync,
{
    fn log(&self, level: Level, message: &str) {
        self(level, message)
    }
}
