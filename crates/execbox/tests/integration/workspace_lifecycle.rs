use execbox::{DiagnosticKind, ExecutionRequest, Executor, Language, WorkspaceManager};

use super::{entries, shell_config, test_config};

#[tokio::test]
async fn test_workspace_removed_after_success() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 5_000));

    let result = executor
        .execute(ExecutionRequest::new(
            Language::Python,
            "echo data > out.txt; cat out.txt",
        ))
        .await
        .unwrap();

    assert_eq!(result.stdout, "data");
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn test_workspace_removed_after_runtime_failure() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 5_000));

    let result = executor
        .execute(ExecutionRequest::new(Language::Python, "exit 7"))
        .await
        .unwrap();

    assert_eq!(result.exit_status, Some(7));
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn test_workspace_removed_after_compile_error() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.toolchains.native.compiler = "false".into();
    let executor = Executor::new(config);

    let result = executor
        .execute(ExecutionRequest::new(Language::Cpp, "int main() {"))
        .await
        .unwrap();

    assert_eq!(
        result.diagnostic.map(|d| d.kind),
        Some(DiagnosticKind::CompileError)
    );
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn test_workspace_removed_after_timeout() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 200));

    let result = executor
        .execute(ExecutionRequest::new(
            Language::Python,
            "touch marker; while :; do :; done",
        ))
        .await
        .unwrap();

    assert!(result.timed_out);
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn test_program_runs_inside_its_workspace() {
    let root = tempfile::tempdir().unwrap();
    let executor = Executor::new(shell_config(root.path(), 5_000));

    let result = executor
        .execute(ExecutionRequest::new(Language::Python, "pwd; ls"))
        .await
        .unwrap();

    let mut lines = result.stdout.lines();
    let cwd = std::path::PathBuf::from(lines.next().unwrap());
    // the workspace itself is gone by now, so compare its parent
    let parent = std::fs::canonicalize(cwd.parent().unwrap()).unwrap();
    assert_eq!(parent, std::fs::canonicalize(root.path()).unwrap());
    assert_eq!(lines.collect::<Vec<_>>(), vec!["script.sh"]);
}

#[tokio::test]
async fn test_released_workspace_can_be_reacquired_under_limit() {
    let root = tempfile::tempdir().unwrap();
    let manager = WorkspaceManager::new(root.path()).with_limit(1);

    for _ in 0..3 {
        let workspace = manager.acquire().await.unwrap();
        workspace.write_file("script.py", b"print(1)").await.unwrap();
        manager.release(workspace).await.unwrap();
    }
    assert_eq!(manager.available(), Some(1));
    assert_eq!(entries(root.path()), 0);
}
