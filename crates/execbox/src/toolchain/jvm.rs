//! JVM (Java) toolchain
//!
//! The source file must be named after the public type it declares, so the
//! type name is discovered first. Bare statements are wrapped in an entry
//! type with a `main` method.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::JvmConfig;
use crate::process::{ProcessRunner, RunSpec};
use crate::toolchain::entrypoint::{extract_type_name, wrap_in_entry_type};
use crate::toolchain::{PrepareError, Toolchain, require_binary, run_build};
use crate::types::{ExecutionRequest, Language, ToolchainKind};
use crate::workspace::Workspace;

#[derive(Debug)]
pub struct JvmToolchain<'a> {
    config: &'a JvmConfig,
    runner: &'a ProcessRunner,
    compile_timeout: Duration,
}

/// Source text and entry type name after discovery or wrapping
#[derive(Debug, PartialEq, Eq)]
struct EntrySource {
    type_name: String,
    source: String,
}

impl<'a> JvmToolchain<'a> {
    pub fn new(config: &'a JvmConfig, runner: &'a ProcessRunner, compile_timeout: Duration) -> Self {
        Self {
            config,
            runner,
            compile_timeout,
        }
    }

    fn entry_source(&self, request: &ExecutionRequest) -> Result<EntrySource, PrepareError> {
        let hint = request.entrypoint_hint.as_deref();
        match extract_type_name(&request.source_code) {
            Some(declared) => {
                if self.config.named_file
                    && let Some(expected) = hint
                    && declared != expected
                {
                    return Err(PrepareError::NameMismatch {
                        declared,
                        expected: expected.to_owned(),
                    });
                }
                Ok(EntrySource {
                    type_name: declared,
                    source: request.source_code.clone(),
                })
            }
            None => {
                let type_name = hint.unwrap_or(&self.config.default_entry).to_owned();
                let source = wrap_in_entry_type(&type_name, &request.source_code);
                Ok(EntrySource { type_name, source })
            }
        }
    }
}

impl Toolchain for JvmToolchain<'_> {
    fn kind(&self) -> ToolchainKind {
        ToolchainKind::JvmCompiled
    }

    #[instrument(skip_all, fields(workspace = %workspace.id()))]
    async fn prepare(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<RunSpec, PrepareError> {
        // A mismatch must be reported without touching the compiler
        let entry = self.entry_source(request)?;
        debug!(type_name = %entry.type_name, "resolved entry type");

        let compiler = require_binary(&self.config.compiler, Language::Java)?;
        let runtime = require_binary(&self.config.runtime, Language::Java)?;

        let file_name = format!("{}.{}", entry.type_name, self.config.extension);
        workspace
            .write_file(&file_name, entry.source.as_bytes())
            .await?;

        let build = RunSpec::new(compiler, workspace.path())
            .args(self.config.compile_flags.iter().cloned())
            .arg(file_name);
        run_build(self.runner, &build, self.compile_timeout).await?;

        Ok(RunSpec::new(runtime, workspace.path())
            .args(self.config.runtime_flags.iter().cloned())
            .arg("-cp")
            .arg(workspace.path().display().to_string())
            .arg(entry.type_name))
    }
}
