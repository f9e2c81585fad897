//! Configuration file loading for execbox
//!
//! Handles loading and layering configuration sources using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG};
use crate::types::is_identifier;

impl Config {
    /// Load configuration from a file
    ///
    /// Keys missing from the file keep their built-in defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml))
            .add_source(File::from(path.as_ref()))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults, then an optional file, then `EXECBOX_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::layered(path, env_source())
    }

    fn layered(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: Config = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".into()));
        }
        if self.compile_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "compile_timeout_ms must be positive".into(),
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_output_bytes must be positive".into(),
            ));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be positive".into()));
        }

        let toolchains = &self.toolchains;
        let binaries = [
            ("native.compiler", &toolchains.native.compiler),
            ("jvm.compiler", &toolchains.jvm.compiler),
            ("jvm.runtime", &toolchains.jvm.runtime),
            ("scripting.interpreter", &toolchains.scripting.interpreter),
            ("dynamic.interpreter", &toolchains.dynamic.interpreter),
        ];
        for (key, binary) in binaries {
            if binary.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "toolchains.{key} must not be empty"
                )));
            }
        }

        if toolchains.native.standard.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "toolchains.native.standard must not be empty".into(),
            ));
        }
        if !is_identifier(&toolchains.jvm.default_entry) {
            return Err(ConfigError::Invalid(format!(
                "toolchains.jvm.default_entry '{}' is not an identifier",
                toolchains.jvm.default_entry
            )));
        }
        if toolchains.jvm.extension.is_empty()
            || !toolchains.jvm.extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::Invalid(format!(
                "toolchains.jvm.extension '{}' is invalid",
                toolchains.jvm.extension
            )));
        }
        for (kind, timeout) in [
            ("native", toolchains.native.timeout_ms),
            ("jvm", toolchains.jvm.timeout_ms),
            ("scripting", toolchains.scripting.timeout_ms),
            ("dynamic", toolchains.dynamic.timeout_ms),
        ] {
            if timeout == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "toolchains.{kind}.timeout_ms must be positive"
                )));
            }
        }

        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
