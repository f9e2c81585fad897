use std::time::{Duration, Instant};

use execbox::{DiagnosticKind, ExecutionRequest, Executor, Language};

use super::shell_config;

#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    let state = stat
        .rfind(')')
        .and_then(|i| stat[i + 1..].trim_start().chars().next());
    !matches!(state, Some('Z') | Some('X') | None)
}

#[cfg(target_os = "linux")]
async fn wait_until_gone(pid: u32) -> bool {
    for _ in 0..50 {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_infinite_loop_is_terminated_within_timeout() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 1_000));
    let started = Instant::now();

    let result = executor
        .execute(ExecutionRequest::new(Language::Python, "while :; do :; done"))
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(result.timed_out);
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
    assert_eq!(
        result.stderr,
        "Execution timed out (1 seconds). Your program may have an infinite loop or is taking too long to process."
    );
    assert_eq!(
        result.diagnostic.map(|d| d.kind),
        Some(DiagnosticKind::Timeout)
    );
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_leaves_no_descendants() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 500));

    let result = executor
        .execute(ExecutionRequest::new(
            Language::Python,
            "sleep 60 & echo $!; sh -c 'sleep 60' & echo $!; wait",
        ))
        .await
        .unwrap();

    assert!(result.timed_out);
    let pids: Vec<u32> = result
        .stdout
        .lines()
        .map(|line| line.trim().parse().unwrap())
        .collect();
    assert_eq!(pids.len(), 2);
    for pid in pids {
        assert!(wait_until_gone(pid).await, "pid {pid} survived");
    }
}

#[tokio::test]
async fn test_stdin_fully_visible() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 5_000));
    let input: String = (0..2_000).map(|i| format!("line {i}\n")).collect();

    let result = executor
        .execute(ExecutionRequest::new(Language::Python, "cat").with_stdin(input.clone()))
        .await
        .unwrap();

    assert_eq!(result.stdout, input.trim());
    assert!(!result.timed_out);
}

#[tokio::test]
async fn test_program_reading_until_eof_terminates() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 5_000));

    // with no stdin the stream is already closed, so `wc` sees EOF at once
    let result = executor
        .execute(ExecutionRequest::new(Language::Python, "wc -l"))
        .await
        .unwrap();

    assert!(!result.timed_out);
    assert_eq!(result.stdout, "0");
}

#[tokio::test]
async fn test_streams_are_captured_separately() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 5_000));

    let result = executor
        .execute(ExecutionRequest::new(
            Language::Python,
            "for i in 1 2 3; do echo out$i; echo err$i >&2; done",
        ))
        .await
        .unwrap();

    assert_eq!(result.stdout, "out1\nout2\nout3");
    assert_eq!(result.stderr, "err1\nerr2\nerr3");
}

#[tokio::test]
async fn test_signal_death_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 5_000));

    let result = executor
        .execute(ExecutionRequest::new(Language::Python, "kill -KILL $$"))
        .await
        .unwrap();

    assert_eq!(result.signal, Some(9));
    assert_eq!(result.exit_status, None);
    assert!(!result.timed_out);
}

#[tokio::test]
async fn test_output_is_capped() {
    let root = tempfile::tempdir().unwrap();
    let mut config = shell_config(root.path(), 5_000);
    config.max_output_bytes = 1024;
    let executor = Executor::new(config);

    let result = executor
        .execute(ExecutionRequest::new(
            Language::Python,
            "i=0; while [ $i -lt 5000 ]; do echo 0123456789; i=$((i+1)); done",
        ))
        .await
        .unwrap();

    assert!(!result.timed_out);
    assert!(result.stdout.ends_with("[output truncated]"));
    assert!(result.stdout.len() < 1100);
}

#[tokio::test]
async fn test_background_child_does_not_hold_result_open() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 2_000));
    let started = Instant::now();

    let result = executor
        .execute(ExecutionRequest::new(Language::Python, "sleep 30 & echo done"))
        .await
        .unwrap();

    assert!(!result.timed_out);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.stdout, "done");
    assert_eq!(result.stderr, "");
    assert_eq!(result.exit_status, Some(0));
    assert!(result.diagnostic.is_none());
}
