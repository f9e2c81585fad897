//! Toolchain adapters
//!
//! An adapter turns an [`ExecutionRequest`] into a runnable [`RunSpec`]:
//! it writes the source into the workspace, runs the build step if the
//! language has one, and points the run command at the result.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use crate::toolchain::entrypoint::{extract_type_name, wrap_in_entry_type};
pub use crate::toolchain::interpreted::InterpretedToolchain;
pub use crate::toolchain::jvm::JvmToolchain;
pub use crate::toolchain::native::NativeToolchain;

pub mod entrypoint;
mod interpreted;
mod jvm;
mod native;

use crate::config::Toolchains;
use crate::process::{ProcessError, ProcessRunner, RunSpec, format_seconds, resolve_binary};
use crate::types::{Diagnostic, DiagnosticKind, ExecutionRequest, Language, ToolchainKind};
use crate::workspace::{Workspace, WorkspaceError};

/// Compiler output reported when a failed build printed nothing
pub const NO_COMPILER_OUTPUT: &str = "Compilation failed with no error message";

/// Errors that occur while preparing a program for execution
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(
        "{binary} not found: the {} toolchain is not installed or not on PATH",
        .language.display_name()
    )]
    ToolchainUnavailable { binary: String, language: Language },

    #[error("{stderr}")]
    Compile {
        stderr: String,
        exit_status: Option<i32>,
    },

    #[error("compilation timed out after {limit:?}")]
    CompileTimeout { limit: Duration },

    #[error("Class name '{declared}' must match the file name '{expected}' exactly (case-sensitive).")]
    NameMismatch { declared: String, expected: String },

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),
}

impl PrepareError {
    /// The user-facing diagnostic for this failure
    ///
    /// Returns `None` for infrastructure failures, which are not the
    /// submitted program's fault.
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        let kind = match self {
            PrepareError::ToolchainUnavailable { .. } => DiagnosticKind::ToolchainUnavailable,
            PrepareError::Compile { .. } => DiagnosticKind::CompileError,
            PrepareError::CompileTimeout { limit } => {
                return Some(Diagnostic::new(
                    DiagnosticKind::CompileError,
                    format!("Compilation timed out ({} seconds).", format_seconds(*limit)),
                ));
            }
            PrepareError::NameMismatch { .. } => DiagnosticKind::NameMismatch,
            PrepareError::Process(e) if e.is_not_found() => DiagnosticKind::ToolchainUnavailable,
            PrepareError::Workspace(_) | PrepareError::Process(_) => return None,
        };
        Some(Diagnostic::new(kind, self.to_string()))
    }
}

/// Shared contract of the per-category adapters
#[allow(async_fn_in_trait)]
pub trait Toolchain {
    /// The category this adapter handles
    fn kind(&self) -> ToolchainKind;

    /// Materialize the request in `workspace` and return what to run
    async fn prepare(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<RunSpec, PrepareError>;
}

/// Resolve a binary a language needs, failing fast if it is missing
pub fn require_binary(binary: &str, language: Language) -> Result<PathBuf, PrepareError> {
    resolve_binary(binary).ok_or_else(|| PrepareError::ToolchainUnavailable {
        binary: binary.to_owned(),
        language,
    })
}

/// Run a build step, mapping a failed or timed-out build to a [`PrepareError`]
pub(crate) async fn run_build(
    runner: &ProcessRunner,
    spec: &RunSpec,
    limit: Duration,
) -> Result<(), PrepareError> {
    let output = runner.run(spec, None, limit).await?;
    if output.timed_out {
        return Err(PrepareError::CompileTimeout { limit });
    }
    if output.exit_status != Some(0) {
        let stderr = [output.stderr.trim(), output.stdout.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(NO_COMPILER_OUTPUT)
            .to_owned();
        debug!(exit_status = ?output.exit_status, "build step failed");
        return Err(PrepareError::Compile {
            stderr,
            exit_status: output.exit_status,
        });
    }
    Ok(())
}

/// Availability of one binary on PATH
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryStatus {
    pub name: String,
    pub path: Option<PathBuf>,
}

/// Availability report for one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainStatus {
    pub language: Language,
    pub kind: ToolchainKind,
    pub available: bool,
    pub binaries: Vec<BinaryStatus>,
}

/// Check which binaries `language` needs and whether they resolve
pub fn probe(toolchains: &Toolchains, language: Language) -> ToolchainStatus {
    let kind = language.kind();
    let binaries: Vec<BinaryStatus> = toolchains
        .binaries(kind)
        .into_iter()
        .map(|name| BinaryStatus {
            name: name.to_owned(),
            path: resolve_binary(name),
        })
        .collect();
    ToolchainStatus {
        language,
        kind,
        available: binaries.iter().all(|b| b.path.is_some()),
        binaries,
    }
}
