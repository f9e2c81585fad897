//! Interpreter-only toolchains (JavaScript, Python)

use tracing::instrument;

use crate::config::InterpreterConfig;
use crate::process::RunSpec;
use crate::toolchain::{PrepareError, Toolchain, require_binary};
use crate::types::{ExecutionRequest, Language, ToolchainKind};
use crate::workspace::Workspace;

/// Writes the script and hands it to an interpreter, with no build step
#[derive(Debug)]
pub struct InterpretedToolchain<'a> {
    language: Language,
    config: &'a InterpreterConfig,
}

impl<'a> InterpretedToolchain<'a> {
    pub fn new(language: Language, config: &'a InterpreterConfig) -> Self {
        Self { language, config }
    }
}

impl Toolchain for InterpretedToolchain<'_> {
    fn kind(&self) -> ToolchainKind {
        self.language.kind()
    }

    #[instrument(skip_all, fields(workspace = %workspace.id(), language = %self.language))]
    async fn prepare(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<RunSpec, PrepareError> {
        let interpreter = require_binary(&self.config.interpreter, self.language)?;
        workspace
            .write_file(
                self.config.source_name.as_str(),
                request.source_code.as_bytes(),
            )
            .await?;
        Ok(RunSpec::new(interpreter, workspace.path()).args(self.config.run_args()))
    }
}
