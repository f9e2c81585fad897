use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::toolchain::{
    FileName, InterpreterConfig, JvmConfig, NativeConfig, Toolchains,
};
use crate::types::ToolchainKind;

mod loader;
pub mod toolchain;

/// Example configuration embedded at compile time.
///
/// Doubles as the built-in defaults and as a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../execbox.example.toml");

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "EXECBOX";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid file name '{0}': must be non-empty without path separators or '..'")]
    InvalidFileName(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for execbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding per-request workspaces (system temp dir if unset)
    #[serde(default)]
    pub temp_root: Option<PathBuf>,

    /// Wall-clock limit for running programs, in milliseconds
    pub timeout_ms: u64,

    /// Wall-clock limit for build steps, in milliseconds
    pub compile_timeout_ms: u64,

    /// Maximum bytes captured per output stream
    pub max_output_bytes: usize,

    /// Maximum concurrently executing requests (0 = unbounded)
    #[serde(default)]
    pub max_concurrent: usize,

    #[serde(default)]
    pub cache: CacheConfig,

    pub toolchains: Toolchains,
}

/// Settings for the native artifact cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Cache directory (system temp dir if unset)
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Time-to-live of a cached artifact, in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn cache_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("execbox-cache"))
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_cache_ttl() -> u64 {
    30 * 60
}

impl Config {
    /// Create a new config with the embedded defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory under which workspaces are created
    pub fn workspace_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("execbox"))
    }

    /// Run timeout for a toolchain category, honoring per-toolchain overrides
    pub fn run_timeout(&self, kind: ToolchainKind) -> Duration {
        let ms = self
            .toolchains
            .timeout_override(kind)
            .unwrap_or(self.timeout_ms);
        Duration::from_millis(ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    /// Concurrency bound, if any
    pub fn concurrency_limit(&self) -> Option<usize> {
        (self.max_concurrent > 0).then_some(self.max_concurrent)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}
