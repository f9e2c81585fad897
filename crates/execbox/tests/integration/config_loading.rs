use std::io::Write;
use std::time::Duration;

use execbox::config::{Config, ConfigError, EXAMPLE_CONFIG};
use execbox::{ExecutionRequest, Executor, Language, ToolchainKind};

use super::{entries, test_config};

#[test]
fn test_load_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
timeout_ms = 4000
max_concurrent = 3

[cache]
enabled = false

[toolchains.native]
compiler = "clang++"
standard = "c++20"
source_name = "main.cpp"
binary_name = "main"
flags = ["-O2"]

[toolchains.jvm]
compiler = "javac"
runtime = "java"
timeout_ms = 8000
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.timeout_ms, 4000);
    assert_eq!(config.concurrency_limit(), Some(3));
    assert!(!config.cache.enabled);
    assert_eq!(config.toolchains.native.compiler, "clang++");
    assert_eq!(
        config.toolchains.native.compile_args("main"),
        vec!["main.cpp", "-o", "main", "-std=c++20", "-O2"]
    );
    assert_eq!(
        config.run_timeout(ToolchainKind::JvmCompiled),
        Duration::from_secs(8)
    );
    assert_eq!(
        config.run_timeout(ToolchainKind::ScriptingInterpreted),
        Duration::from_secs(4)
    );
    // untouched sections keep their defaults
    assert_eq!(config.toolchains.dynamic.interpreter, "python3");
}

#[test]
fn test_load_without_file_matches_defaults() {
    let config = Config::load(None).unwrap();
    let defaults = Config::parse_toml(EXAMPLE_CONFIG).unwrap();
    assert_eq!(config.compile_timeout_ms, defaults.compile_timeout_ms);
    assert_eq!(config.max_output_bytes, defaults.max_output_bytes);
}

#[test]
fn test_load_missing_file_fails() {
    let result = Config::from_file("/nonexistent/execbox.toml");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_rejects_traversal_in_file_names() {
    let toml = EXAMPLE_CONFIG.replace(
        "source_name = \"program.cpp\"",
        "source_name = \"../program.cpp\"",
    );
    assert!(Config::parse_toml(&toml).is_err());
}

#[tokio::test]
async fn test_executor_uses_configured_root() {
    let root = tempfile::tempdir().unwrap();
    let nested = root.path().join("jobs");
    let executor = Executor::new(test_config(&nested));
    assert_eq!(executor.workspaces().root(), nested.as_path());

    // rejected before any workspace is created
    let result = executor
        .execute(ExecutionRequest::new(Language::Python, ""))
        .await;
    assert!(result.is_err());
    assert_eq!(entries(&nested), 0);
}
