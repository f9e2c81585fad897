use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of toolchain a language is executed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolchainKind {
    /// Compiled ahead of time to a native binary
    NativeCompiled,

    /// Compiled to bytecode and run on a managed runtime
    JvmCompiled,

    /// Run directly by a scripting interpreter
    ScriptingInterpreted,

    /// Run directly by a dynamic-language interpreter
    DynamicInterpreted,
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolchainKind::NativeCompiled => "native-compiled",
            ToolchainKind::JvmCompiled => "jvm-compiled",
            ToolchainKind::ScriptingInterpreted => "scripting-interpreted",
            ToolchainKind::DynamicInterpreted => "dynamic-interpreted",
        };
        f.write_str(name)
    }
}

/// A supported source language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Java,
    JavaScript,
    Python,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Cpp,
        Language::Java,
        Language::JavaScript,
        Language::Python,
    ];

    /// The toolchain category used to run this language
    pub fn kind(&self) -> ToolchainKind {
        match self {
            Language::Cpp => ToolchainKind::NativeCompiled,
            Language::Java => ToolchainKind::JvmCompiled,
            Language::JavaScript => ToolchainKind::ScriptingInterpreted,
            Language::Python => ToolchainKind::DynamicInterpreted,
        }
    }

    /// Canonical request tag (e.g., "cpp")
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::Python => "python",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Cpp => "C++",
            Language::Java => "Java",
            Language::JavaScript => "JavaScript",
            Language::Python => "Python",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "python" | "py" | "python3" => Ok(Language::Python),
            _ => Err(UnsupportedLanguage(s.to_owned())),
        }
    }
}

/// Reasons a request is rejected before any work is done
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("no code provided")]
    EmptySource,

    #[error("invalid entrypoint name '{0}': expected an identifier")]
    InvalidEntrypoint(String),
}

/// A single code execution job
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: Language,

    pub source_code: String,

    /// Input written to the program's stdin before it is closed
    pub stdin: Option<String>,

    /// Expected entry type name (e.g., the Java class the file must declare)
    pub entrypoint_hint: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: Language, source_code: impl Into<String>) -> Self {
        Self {
            language,
            source_code: source_code.into(),
            stdin: None,
            entrypoint_hint: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Stdin as delivered to the program
    ///
    /// Non-empty input always ends with a newline, so line-oriented readers
    /// see a complete final line.
    pub fn terminated_stdin(&self) -> Option<Cow<'_, str>> {
        let stdin = self.stdin.as_deref()?;
        if stdin.is_empty() || stdin.ends_with('\n') {
            Some(Cow::Borrowed(stdin))
        } else {
            Some(Cow::Owned(format!("{stdin}\n")))
        }
    }

    pub fn with_entrypoint_hint(mut self, hint: impl Into<String>) -> Self {
        self.entrypoint_hint = Some(hint.into());
        self
    }

    /// Check the request invariants
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.source_code.trim().is_empty() {
            return Err(RequestError::EmptySource);
        }
        if let Some(ref hint) = self.entrypoint_hint
            && !is_identifier(hint)
        {
            return Err(RequestError::InvalidEntrypoint(hint.clone()));
        }
        Ok(())
    }
}

/// Whether `name` is a valid JVM-style identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Category of a failure reported inside an [`ExecutionResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A required compiler or interpreter is not installed
    ToolchainUnavailable,

    /// The build step exited nonzero or timed out
    CompileError,

    /// The declared entry type does not match the expected name
    NameMismatch,

    /// The program exceeded the wall-clock limit
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of an execution request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,

    pub stderr: String,

    /// Whether the program was killed for exceeding the time limit
    pub timed_out: bool,

    /// Exit code if the program exited normally
    pub exit_status: Option<i32>,

    /// Signal number if the program was killed by a signal
    pub signal: Option<i32>,

    /// Structured failure, if the request did not run to completion
    pub diagnostic: Option<Diagnostic>,
}

impl ExecutionResult {
    /// Result for a request that failed before the program ran
    pub fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            stderr: diagnostic.message.clone(),
            diagnostic: Some(diagnostic),
            ..Default::default()
        }
    }

    /// Check if the program ran and exited with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.diagnostic.is_none() && self.exit_status == Some(0)
    }

    /// Trim surrounding whitespace from both output streams
    pub fn normalized(mut self) -> Self {
        self.stdout = trim_owned(self.stdout);
        self.stderr = trim_owned(self.stderr);
        self
    }
}

fn trim_owned(s: String) -> String {
    let trimmed = s.trim();
    if trimmed.len() == s.len() {
        s
    } else {
        trimmed.to_owned()
    }
}

/// Wire shape returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub stdout: String,
    pub stderr: String,
}

impl From<ExecutionResult> for ExecutionResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            stdout: result.stdout,
            stderr: result.stderr,
        }
    }
}
