//! Adversarial tests for proc_tee.
//!
//! These tests run children that misbehave: they flood their pipes, fork
//! descendants that keep the pipes open, ignore polite signals, or close
//! their output early. Every run must still finish with complete output and
//! no stuck drain.

use proc_tee::{
    CommandLine, ConfigError, Destination, MonitoredStream, RunError, RunOptions, Sink,
    StreamName, StreamState,
};
use std::time::{Duration, Instant};

// =============================================================================
// Test Helpers
// =============================================================================

fn sh(script: &str) -> CommandLine {
    CommandLine::new("/bin/sh", ["-c", script]).expect("valid command")
}

fn deadline(ms: u64) -> RunOptions {
    RunOptions::builder()
        .timeout(Duration::from_millis(ms))
        .raise_on_failure(false)
        .build()
        .expect("valid options")
}

// =============================================================================
// OUTPUT FLOODING
// =============================================================================

#[tokio::test]
async fn test_flood_larger_than_pipe_buffer_is_fully_captured() {
    // 1 MiB on each stream; a child blocked on a full pipe would never exit.
    let script = "head -c 1048576 /dev/zero; head -c 1048576 /dev/zero >&2";
    let result = proc_tee::capture(&sh(script), RunOptions::default())
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(result.stdout().len(), 1 << 20);
    assert_eq!(result.stderr().len(), 1 << 20);
}

#[tokio::test]
async fn test_flood_into_discard_still_drains() {
    let result = proc_tee::run(&sh("head -c 4194304 /dev/zero"), RunOptions::default())
        .await
        .unwrap();

    assert!(result.success());
    assert!(result.stdout().is_empty());
}

#[tokio::test]
async fn test_repeated_runs_never_see_partial_output() {
    let expected: String = (1..=200).map(|i| format!("line {}\n", i)).collect();
    for _ in 0..20 {
        let result = proc_tee::capture(
            &sh("i=1; while [ $i -le 200 ]; do echo \"line $i\"; i=$((i+1)); done"),
            RunOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.stdout_string(), expected);
    }
}

// =============================================================================
// DESCENDANTS HOLDING THE PIPE
// =============================================================================

#[tokio::test]
async fn test_backgrounded_grandchild_is_killed_with_group() {
    // The grandchild inherits stdout; only a group kill lets the drain see EOF.
    let start = Instant::now();
    let result = proc_tee::capture(&sh("sleep 10 & echo spawned; wait"), deadline(100))
        .await
        .unwrap();

    assert!(result.timed_out());
    assert_eq!(result.stdout(), b"spawned\n");
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_deadline_bounds_drain_after_child_exits() {
    // The shell exits at once; the backgrounded sleep keeps stdout open.
    let start = Instant::now();
    let result = proc_tee::capture(&sh("sleep 3 & echo hi"), deadline(100))
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(result.stdout(), b"hi\n");
    // The child itself exited normally before the deadline.
    assert!(result.success());
    assert!(!result.timed_out());
}

#[tokio::test]
async fn test_drain_without_deadline_waits_for_descendants() {
    let start = Instant::now();
    let result = proc_tee::capture(&sh("(sleep 0.3; echo late) & echo early"), RunOptions::default())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(result.stdout(), b"early\nlate\n");
}

#[tokio::test]
async fn test_sigterm_ignoring_child_is_still_killed() {
    let result = proc_tee::run(&sh("trap '' TERM; sleep 10"), deadline(100))
        .await
        .unwrap();

    assert!(result.timed_out());
    assert_eq!(result.signal_name(), Some("SIGKILL"));
}

// =============================================================================
// SLOW SINKS
// =============================================================================

/// Writer that blocks the calling thread on every write.
struct SlowSink;

impl std::io::Write for SlowSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::thread::sleep(Duration::from_secs(1));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_blocking_sink_does_not_delay_deadline() {
    // Single-threaded runtime: a sink blocking the runtime thread would hold
    // back the deadline timer too.
    let options = RunOptions::builder()
        .stdout(Destination::writer(SlowSink))
        .timeout(Duration::from_millis(100))
        .raise_on_failure(false)
        .build()
        .unwrap();

    let result = proc_tee::run(&sh("echo x; sleep 10"), options).await.unwrap();

    assert!(result.timed_out());
    assert!(result.elapsed() < Duration::from_millis(900));
}

// =============================================================================
// EARLY CLOSE AND SELF-SIGNALLING
// =============================================================================

#[tokio::test]
async fn test_child_closing_stdout_early() {
    let result = proc_tee::capture(
        &sh("echo before; exec 1>&-; sleep 0.1; echo after >&2"),
        RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.stdout(), b"before\n");
    assert_eq!(result.stderr(), b"after\n");
}

#[tokio::test]
async fn test_self_kill_is_signaled_not_timed_out() {
    let err = proc_tee::capture(&sh("echo dying >&2; kill -KILL $$"), RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::CommandSignaled(_)));
    assert!(!err.is_timed_out());
    let result = err.into_result().unwrap();
    assert!(!result.timed_out());
    assert_eq!(result.stderr(), b"dying\n");
}

// =============================================================================
// HOSTILE INPUT
// =============================================================================

#[test]
fn test_null_byte_in_program() {
    let result = CommandLine::new("/bin/sh\0/bin/bash", Vec::<String>::new());
    assert!(matches!(result, Err(ConfigError::NulByte { what: "program", .. })));
}

#[test]
fn test_null_byte_in_env_value() {
    let result = RunOptions::builder().env("KEY", "a\0b").build();
    assert!(matches!(result, Err(ConfigError::NulByte { .. })));
}

#[tokio::test]
async fn test_shell_metacharacters_are_literal() {
    let result = proc_tee::capture(
        &CommandLine::new("printf", ["%s", "$(echo pwned); `id` | cat"]).unwrap(),
        RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.stdout_string(), "$(echo pwned); `id` | cat");
}

// =============================================================================
// MONITORED STREAM DIRECTLY
// =============================================================================

#[tokio::test]
async fn test_stream_shared_by_stdout_and_stderr() {
    let mut stream = MonitoredStream::open(StreamName::Stdout, Destination::memory()).unwrap();

    let mut child = tokio::process::Command::new("/bin/sh")
        .args(["-c", "echo one; echo two >&2"])
        .stdout(stream.child_stdio().unwrap())
        .stderr(stream.child_stdio().unwrap())
        .spawn()
        .unwrap();
    child.wait().await.unwrap();
    drop(child);

    stream.close().await;
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(stream.bytes_drained(), 8);

    let sinks: Vec<Sink> = stream.into_sinks();
    let captured = String::from_utf8(sinks[0].as_bytes().unwrap().to_vec()).unwrap();
    assert!(captured.contains("one\n"));
    assert!(captured.contains("two\n"));
}
