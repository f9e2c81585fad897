//! Native (C++) toolchain
//!
//! Compiles the source to a binary inside the workspace and runs it directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::cache::{ArtifactCache, ArtifactKey, CacheError};
use crate::config::NativeConfig;
use crate::process::{ProcessRunner, RunSpec};
use crate::toolchain::{PrepareError, Toolchain, require_binary, run_build};
use crate::types::{ExecutionRequest, Language, ToolchainKind};
use crate::workspace::Workspace;

#[derive(Debug)]
pub struct NativeToolchain<'a> {
    config: &'a NativeConfig,
    runner: &'a ProcessRunner,
    compile_timeout: Duration,
    cache: Option<Arc<dyn ArtifactCache>>,
}

impl<'a> NativeToolchain<'a> {
    pub fn new(config: &'a NativeConfig, runner: &'a ProcessRunner, compile_timeout: Duration) -> Self {
        Self {
            config,
            runner,
            compile_timeout,
            cache: None,
        }
    }

    /// Reuse binaries of byte-identical builds through `cache`
    pub fn with_cache(mut self, cache: Option<Arc<dyn ArtifactCache>>) -> Self {
        self.cache = cache;
        self
    }
}

impl Toolchain for NativeToolchain<'_> {
    fn kind(&self) -> ToolchainKind {
        ToolchainKind::NativeCompiled
    }

    #[instrument(skip_all, fields(workspace = %workspace.id()))]
    async fn prepare(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<RunSpec, PrepareError> {
        let compiler = require_binary(&self.config.compiler, Language::Cpp)?;

        workspace
            .write_file(
                self.config.source_name.as_str(),
                request.source_code.as_bytes(),
            )
            .await?;

        let binary_name = self.config.binary_file_name();
        let binary = workspace.file_path(&binary_name)?;
        let args = self.config.compile_args(&binary_name);
        let run = RunSpec::new(&binary, workspace.path());

        let key = ArtifactKey::new(&self.config.compiler, &args, &request.source_code);
        if let Some(ref cache) = self.cache {
            match fetch(cache.clone(), key.clone(), binary.clone()).await {
                Ok(true) => return Ok(run),
                Ok(false) => debug!(%key, "artifact cache miss"),
                Err(e) => warn!(error = %e, "artifact cache lookup failed"),
            }
        }

        let build = RunSpec::new(compiler, workspace.path()).args(args);
        run_build(self.runner, &build, self.compile_timeout).await?;
        debug!(binary = %binary.display(), "native build finished");

        if let Some(ref cache) = self.cache
            && let Err(e) = store(cache.clone(), key, binary).await
        {
            warn!(error = %e, "failed to store artifact in cache");
        }

        Ok(run)
    }
}

async fn fetch(
    cache: Arc<dyn ArtifactCache>,
    key: ArtifactKey,
    dest: PathBuf,
) -> Result<bool, CacheError> {
    match tokio::task::spawn_blocking(move || cache.fetch(&key, &dest)).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "artifact cache task failed");
            Ok(false)
        }
    }
}

async fn store(
    cache: Arc<dyn ArtifactCache>,
    key: ArtifactKey,
    artifact: PathBuf,
) -> Result<(), CacheError> {
    match tokio::task::spawn_blocking(move || cache.store(&key, &artifact)).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "artifact cache task failed");
            Ok(())
        }
    }
}
