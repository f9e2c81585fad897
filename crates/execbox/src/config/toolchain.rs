use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::ToolchainKind;

const INVALID_FILE_NAME_CHARS: [char; 2] = ['/', '\\'];

/// A bare file name inside a workspace (e.g., "program.cpp")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileName(String);

impl FileName {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        let contains_invalid = name.chars().any(|c| INVALID_FILE_NAME_CHARS.contains(&c));
        if name.is_empty() || name == "." || name.contains("..") || contains_invalid {
            return Err(ConfigError::InvalidFileName(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for FileName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileName::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file name without path separators or '..'",
            )
        })
    }
}

impl std::fmt::Display for FileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-category toolchain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolchains {
    pub native: NativeConfig,
    pub jvm: JvmConfig,
    pub scripting: InterpreterConfig,
    pub dynamic: InterpreterConfig,
}

impl Toolchains {
    /// Timeout override for the given category, if any
    pub fn timeout_override(&self, kind: ToolchainKind) -> Option<u64> {
        match kind {
            ToolchainKind::NativeCompiled => self.native.timeout_ms,
            ToolchainKind::JvmCompiled => self.jvm.timeout_ms,
            ToolchainKind::ScriptingInterpreted => self.scripting.timeout_ms,
            ToolchainKind::DynamicInterpreted => self.dynamic.timeout_ms,
        }
    }

    /// Binaries the given category needs on PATH
    pub fn binaries(&self, kind: ToolchainKind) -> Vec<&str> {
        match kind {
            ToolchainKind::NativeCompiled => vec![self.native.compiler.as_str()],
            ToolchainKind::JvmCompiled => {
                vec![self.jvm.compiler.as_str(), self.jvm.runtime.as_str()]
            }
            ToolchainKind::ScriptingInterpreted => vec![self.scripting.interpreter.as_str()],
            ToolchainKind::DynamicInterpreted => vec![self.dynamic.interpreter.as_str()],
        }
    }
}

/// Settings for the native (C++) toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeConfig {
    /// Compiler binary, resolved on PATH
    pub compiler: String,

    /// Value passed as `-std=`
    pub standard: String,

    pub source_name: FileName,

    /// Output binary name (the platform executable suffix is appended)
    pub binary_name: FileName,

    /// Extra compiler flags
    #[serde(default)]
    pub flags: Vec<String>,

    /// Run timeout override in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl NativeConfig {
    /// Arguments for compiling `source_name` into `binary`
    pub fn compile_args(&self, binary: &str) -> Vec<String> {
        let mut args = vec![
            self.source_name.to_string(),
            "-o".to_owned(),
            binary.to_owned(),
            format!("-std={}", self.standard),
        ];
        args.extend(self.flags.iter().cloned());
        args
    }

    /// File name of the produced binary on this platform
    pub fn binary_file_name(&self) -> String {
        format!("{}{}", self.binary_name, std::env::consts::EXE_SUFFIX)
    }
}

/// Settings for the JVM (Java) toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JvmConfig {
    pub compiler: String,

    pub runtime: String,

    #[serde(default)]
    pub compile_flags: Vec<String>,

    #[serde(default)]
    pub runtime_flags: Vec<String>,

    /// Require the declared type name to equal the entrypoint hint
    #[serde(default = "default_named_file")]
    pub named_file: bool,

    /// Type name used when wrapping bare statements with no hint
    #[serde(default = "default_entry")]
    pub default_entry: String,

    /// Source file extension, without dot
    #[serde(default = "default_jvm_extension")]
    pub extension: String,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_named_file() -> bool {
    true
}

fn default_entry() -> String {
    "HelloWorld".to_owned()
}

fn default_jvm_extension() -> String {
    "java".to_owned()
}

/// Settings for an interpreter-only toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    pub interpreter: String,

    pub source_name: FileName,

    /// Flags passed before the script path
    #[serde(default)]
    pub flags: Vec<String>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl InterpreterConfig {
    pub fn run_args(&self) -> Vec<String> {
        let mut args = self.flags.clone();
        args.push(self.source_name.to_string());
        args
    }
}
