//! Integration tests for execbox
//!
//! Tests that only need a POSIX shell run on every Unix host. Tests that
//! need real compilers and interpreters (g++, javac/java, node, python3)
//! are behind a feature flag:
//!   cargo test -p execbox --features toolchain-tests

use std::fs;
use std::path::Path;

use execbox::config::{Config, FileName};

mod config_loading;
#[cfg(unix)]
mod process_supervision;
#[cfg(feature = "toolchain-tests")]
mod toolchains;
#[cfg(unix)]
mod workspace_lifecycle;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
#[allow(dead_code)]
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Default config with workspaces under `root` and no artifact cache
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.temp_root = Some(root.to_path_buf());
    config.cache.enabled = false;
    config
}

/// Config whose Python toolchain is `sh`, so shell scripts stand in for programs
#[allow(dead_code)]
pub(crate) fn shell_config(root: &Path, timeout_ms: u64) -> Config {
    let mut config = test_config(root);
    config.toolchains.dynamic.interpreter = "sh".into();
    config.toolchains.dynamic.source_name =
        FileName::new("script.sh").expect("valid file name");
    config.toolchains.dynamic.timeout_ms = Some(timeout_ms);
    config
}

/// Number of entries left in a directory
#[allow(dead_code)]
pub(crate) fn entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
