use std::sync::Arc;
use std::time::{Duration, Instant};

use execbox::{
    ArtifactCache, DiagnosticKind, DiskArtifactCache, ExecutionRequest, Executor, Language,
};

use super::{entries, fixture_source, test_config};

fn executor(root: &std::path::Path) -> Executor {
    Executor::new(test_config(root))
}

#[tokio::test]
async fn test_cpp_prints_42() {
    let root = tempfile::tempdir().unwrap();
    let result = executor(root.path())
        .execute(ExecutionRequest::new(
            Language::Cpp,
            fixture_source("hello.cpp"),
        ))
        .await
        .expect("execution failed");

    assert_eq!(result.stdout, "42");
    assert_eq!(result.stderr, "");
    assert!(result.is_success());
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn test_cpp_echoes_stdin() {
    let root = tempfile::tempdir().unwrap();
    let request = ExecutionRequest::new(Language::Cpp, fixture_source("echo.cpp"))
        .with_stdin("first\nsecond\n");
    let result = executor(root.path()).execute(request).await.unwrap();

    assert_eq!(result.stdout, "first\nsecond");
}

#[tokio::test]
async fn test_cpp_syntax_error_is_not_run() {
    let root = tempfile::tempdir().unwrap();
    let result = executor(root.path())
        .execute(ExecutionRequest::new(
            Language::Cpp,
            fixture_source("syntax_error.cpp"),
        ))
        .await
        .unwrap();

    assert_eq!(result.stdout, "");
    assert!(!result.stderr.is_empty());
    assert_eq!(result.exit_status, None);
    assert_eq!(
        result.diagnostic.map(|d| d.kind),
        Some(DiagnosticKind::CompileError)
    );
}

#[tokio::test]
async fn test_cpp_infinite_loop_times_out() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.toolchains.native.timeout_ms = Some(1_000);
    let started = Instant::now();

    let result = Executor::new(config)
        .execute(ExecutionRequest::new(
            Language::Cpp,
            fixture_source("infinite_loop.cpp"),
        ))
        .await
        .unwrap();

    assert!(result.timed_out);
    assert!(result.stderr.starts_with("Execution timed out (1 seconds)."));
    // compilation happens before the clock starts, so allow for it
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn test_cpp_cache_reuses_binary() {
    let root = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let cache: Arc<dyn ArtifactCache> = Arc::new(DiskArtifactCache::new(
        cache_dir.path(),
        Duration::from_secs(600),
    ));
    let executor = executor(root.path()).with_cache(Some(cache));
    let source = fixture_source("hello.cpp");

    let first = executor
        .execute(ExecutionRequest::new(Language::Cpp, source.clone()))
        .await
        .unwrap();
    let second = executor
        .execute(ExecutionRequest::new(Language::Cpp, source))
        .await
        .unwrap();

    assert_eq!(first.stdout, "42");
    assert_eq!(second.stdout, "42");
    assert_eq!(std::fs::read_dir(cache_dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_java_named_class_reads_stdin() {
    let root = tempfile::tempdir().unwrap();
    let request = ExecutionRequest::new(Language::Java, fixture_source("Solution.java"))
        .with_stdin("3 4")
        .with_entrypoint_hint("Solution");
    let result = executor(root.path()).execute(request).await.unwrap();

    assert_eq!(result.stdout, "7");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
async fn test_java_statements_wrapped_in_hello_world() {
    let root = tempfile::tempdir().unwrap();
    let request = ExecutionRequest::new(Language::Java, fixture_source("statements.java"))
        .with_entrypoint_hint("HelloWorld");
    let result = executor(root.path()).execute(request).await.unwrap();

    assert_eq!(result.stdout, "sum=6");
    assert!(result.is_success());
}

#[tokio::test]
async fn test_java_name_mismatch_is_not_compiled() {
    let root = tempfile::tempdir().unwrap();
    let request = ExecutionRequest::new(Language::Java, fixture_source("Solution.java"))
        .with_entrypoint_hint("Foo");
    let result = executor(root.path()).execute(request).await.unwrap();

    assert_eq!(result.stdout, "");
    assert_eq!(
        result.stderr,
        "Class name 'Solution' must match the file name 'Foo' exactly (case-sensitive)."
    );
    assert_eq!(
        result.diagnostic.map(|d| d.kind),
        Some(DiagnosticKind::NameMismatch)
    );
}

#[tokio::test]
async fn test_java_syntax_error() {
    let root = tempfile::tempdir().unwrap();
    let result = executor(root.path())
        .execute(ExecutionRequest::new(
            Language::Java,
            fixture_source("syntax_error.java"),
        ))
        .await
        .unwrap();

    assert_eq!(result.stdout, "");
    assert!(result.stderr.contains("Broken.java"));
    assert_eq!(
        result.diagnostic.map(|d| d.kind),
        Some(DiagnosticKind::CompileError)
    );
}

#[tokio::test]
async fn test_javascript_prints() {
    let root = tempfile::tempdir().unwrap();
    let result = executor(root.path())
        .execute(ExecutionRequest::new(
            Language::JavaScript,
            fixture_source("hello.js"),
        ))
        .await
        .unwrap();

    assert_eq!(result.stdout, "hello from node");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
async fn test_javascript_reads_stdin() {
    let root = tempfile::tempdir().unwrap();
    let request = ExecutionRequest::new(Language::JavaScript, fixture_source("echo.js"))
        .with_stdin("shout");
    let result = executor(root.path()).execute(request).await.unwrap();

    assert_eq!(result.stdout, "SHOUT");
}

#[tokio::test]
async fn test_python_prints() {
    let root = tempfile::tempdir().unwrap();
    let result = executor(root.path())
        .execute(ExecutionRequest::new(
            Language::Python,
            fixture_source("hello.py"),
        ))
        .await
        .unwrap();

    assert_eq!(result.stdout, "hello from python");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
async fn test_python_reads_stdin() {
    let root = tempfile::tempdir().unwrap();
    let request = ExecutionRequest::new(Language::Python, fixture_source("echo.py"))
        .with_stdin("abc\nxyz\n");
    let result = executor(root.path()).execute(request).await.unwrap();

    assert_eq!(result.stdout, "cba\nzyx");
}

#[tokio::test]
async fn test_python_runtime_error_is_data() {
    let root = tempfile::tempdir().unwrap();
    let result = executor(root.path())
        .execute(ExecutionRequest::new(
            Language::Python,
            fixture_source("runtime_error.py"),
        ))
        .await
        .unwrap();

    assert_eq!(result.stdout, "before");
    assert!(result.stderr.contains("ValueError: boom"));
    assert_eq!(result.exit_status, Some(1));
    assert!(result.diagnostic.is_none());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_python_subprocess_killed_on_timeout() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.toolchains.dynamic.timeout_ms = Some(1_500);

    let result = Executor::new(config)
        .execute(ExecutionRequest::new(
            Language::Python,
            fixture_source("spawn_and_loop.py"),
        ))
        .await
        .unwrap();

    assert!(result.timed_out);
    let pid: u32 = result.stdout.trim().parse().unwrap();
    let mut alive = true;
    for _ in 0..50 {
        let state = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok();
        alive = state.is_some_and(|s| !s.contains(") Z"));
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!alive, "grandchild {pid} survived");
}

#[test]
fn test_all_toolchains_available() {
    let executor = Executor::with_defaults();
    for status in executor.toolchains() {
        assert!(status.available, "{} toolchain missing", status.language);
    }
}
