//! Execution orchestrator
//!
//! Drives one request through workspace allocation, toolchain preparation
//! and the supervised run, and always removes the workspace afterwards.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cache::{ArtifactCache, DiskArtifactCache};
use crate::config::Config;
use crate::process::{ProcessError, ProcessRunner, RunOutput, RunSpec};
use crate::toolchain::{
    InterpretedToolchain, JvmToolchain, NativeToolchain, PrepareError, Toolchain,
    ToolchainStatus, probe,
};
use crate::types::{
    Diagnostic, DiagnosticKind, ExecutionRequest, ExecutionResult, Language, RequestError,
};
use crate::workspace::{Workspace, WorkspaceError, WorkspaceManager};

/// Failures outside the submitted program's control
#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    #[error("preparation error: {0}")]
    Prepare(#[from] PrepareError),
}

/// Errors that prevent an [`ExecutionResult`] from being produced
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("infrastructure failure: {0}")]
    Infrastructure(#[from] InfrastructureError),
}

impl From<WorkspaceError> for ExecuteError {
    fn from(e: WorkspaceError) -> Self {
        ExecuteError::Infrastructure(e.into())
    }
}

impl From<ProcessError> for ExecuteError {
    fn from(e: ProcessError) -> Self {
        ExecuteError::Infrastructure(e.into())
    }
}

/// Lifecycle of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WorkspaceAcquired,
    Prepared,
    Running,
    Completed,
    Failed,
    Released,
}

fn enter(phase: Phase) {
    debug!(?phase, "request phase");
}

/// Runs execution requests end to end
///
/// Cheap to share behind an `Arc`; requests may run concurrently.
#[derive(Debug)]
pub struct Executor {
    config: Config,
    workspaces: WorkspaceManager,
    process: ProcessRunner,
    cache: Option<Arc<dyn ArtifactCache>>,
}

impl Executor {
    /// Create an executor from configuration
    ///
    /// The disk artifact cache is attached when `cache.enabled` is set.
    pub fn new(config: Config) -> Self {
        let mut workspaces = WorkspaceManager::new(config.workspace_root());
        if let Some(limit) = config.concurrency_limit() {
            workspaces = workspaces.with_limit(limit);
        }
        let process = ProcessRunner::new(config.max_output_bytes);
        let cache = config.cache.enabled.then(|| {
            Arc::new(DiskArtifactCache::new(
                config.cache.cache_dir(),
                config.cache.ttl(),
            )) as Arc<dyn ArtifactCache>
        });

        Self {
            config,
            workspaces,
            process,
            cache,
        }
    }

    /// Create an executor with the embedded default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Replace the artifact cache (or disable it with `None`)
    pub fn with_cache(mut self, cache: Option<Arc<dyn ArtifactCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Execute one request
    ///
    /// Compile failures, name mismatches, missing toolchains and timeouts are
    /// reported inside the returned result. An `Err` means the request was
    /// invalid or the host failed.
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, ExecuteError> {
        request.validate()?;

        let workspace = self.workspaces.acquire().await?;
        enter(Phase::WorkspaceAcquired);

        let outcome = self.run_in(&workspace, &request).await;
        enter(match outcome {
            Ok(ref result) if result.diagnostic.is_none() || result.timed_out => Phase::Completed,
            _ => Phase::Failed,
        });

        if let Err(e) = self.workspaces.release(workspace).await {
            warn!(error = %e, "failed to release workspace");
        }
        enter(Phase::Released);

        outcome.map(ExecutionResult::normalized)
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, ExecuteError> {
        let spec = match self.prepare(workspace, request).await {
            Ok(spec) => spec,
            Err(e) => {
                return match e.to_diagnostic() {
                    Some(diagnostic) => {
                        debug!(kind = ?diagnostic.kind, "preparation failed");
                        Ok(ExecutionResult::failed(diagnostic))
                    }
                    None => Err(ExecuteError::Infrastructure(e.into())),
                };
            }
        };
        enter(Phase::Prepared);

        let timeout = self.config.run_timeout(request.language.kind());
        enter(Phase::Running);
        let stdin = request.terminated_stdin();
        let stdin = stdin.as_deref().map(str::as_bytes);
        match self.process.run(&spec, stdin, timeout).await {
            Ok(output) => Ok(into_result(output)),
            Err(e) if e.is_not_found() => Ok(ExecutionResult::failed(Diagnostic::new(
                DiagnosticKind::ToolchainUnavailable,
                format!(
                    "{} not found: the {} toolchain is not installed or not on PATH",
                    spec.program.display(),
                    request.language.display_name()
                ),
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn prepare(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<RunSpec, PrepareError> {
        let toolchains = &self.config.toolchains;
        let compile_timeout = self.config.compile_timeout();
        match request.language {
            Language::Cpp => {
                NativeToolchain::new(&toolchains.native, &self.process, compile_timeout)
                    .with_cache(self.cache.clone())
                    .prepare(workspace, request)
                    .await
            }
            Language::Java => {
                JvmToolchain::new(&toolchains.jvm, &self.process, compile_timeout)
                    .prepare(workspace, request)
                    .await
            }
            Language::JavaScript => {
                InterpretedToolchain::new(request.language, &toolchains.scripting)
                    .prepare(workspace, request)
                    .await
            }
            Language::Python => {
                InterpretedToolchain::new(request.language, &toolchains.dynamic)
                    .prepare(workspace, request)
                    .await
            }
        }
    }

    /// Availability of every supported language's toolchain
    pub fn toolchains(&self) -> Vec<ToolchainStatus> {
        Language::ALL
            .iter()
            .map(|language| probe(&self.config.toolchains, *language))
            .collect()
    }

    /// Drop expired cached artifacts, returning how many were removed
    pub fn evict_expired_artifacts(&self) -> usize {
        let Some(ref cache) = self.cache else {
            return 0;
        };
        cache.evict_expired().unwrap_or_else(|e| {
            warn!(error = %e, "artifact eviction failed");
            0
        })
    }
}

fn into_result(output: RunOutput) -> ExecutionResult {
    let diagnostic = output
        .timed_out
        .then(|| Diagnostic::new(DiagnosticKind::Timeout, output.stderr.clone()));
    ExecutionResult {
        stdout: output.stdout,
        stderr: output.stderr,
        timed_out: output.timed_out,
        exit_status: output.exit_status,
        signal: output.signal,
        diagnostic,
    }
}
