//! A library for running untrusted code snippets.
//!
//! Execbox compiles (when needed) and runs source code in a throwaway
//! workspace directory as a supervised child process, with stdin fed in,
//! stdout and stderr captured separately, and a wall-clock limit enforced by
//! killing the whole process tree.
//!
//! # Features
//!
//! - **Four toolchain categories**: native (C++), JVM (Java), scripting
//!   (JavaScript) and dynamic (Python), all configurable.
//! - **Ephemeral workspaces**: one uniquely-named directory per request,
//!   always removed afterwards.
//! - **Process tree termination**: process groups on Unix, parent-id scans
//!   elsewhere.
//! - **Artifact cache**: optional content-addressed reuse of native builds.
//! - **TOML configuration** with environment overrides.
//!
//! # Example
//!
//! ```no_run
//! use execbox::{ExecutionRequest, Executor, Language};
//!
//! # async fn demo() -> Result<(), execbox::ExecuteError> {
//! let executor = Executor::with_defaults();
//! let request = ExecutionRequest::new(Language::Python, "print(input())").with_stdin("hi");
//! let result = executor.execute(request).await?;
//! assert_eq!(result.stdout, "hi");
//! # Ok(())
//! # }
//! ```

pub use cache::{ArtifactCache, ArtifactKey, CacheError, DiskArtifactCache};
pub use config::{Config, ConfigError, EXAMPLE_CONFIG};
pub use process::{ProcessError, ProcessRunner, ProcessTree, RunOutput, RunSpec};
pub use runner::{ExecuteError, Executor, InfrastructureError};
pub use toolchain::{BinaryStatus, PrepareError, Toolchain, ToolchainStatus};
pub use types::{
    Diagnostic, DiagnosticKind, ExecutionRequest, ExecutionResponse, ExecutionResult, Language,
    RequestError, ToolchainKind, UnsupportedLanguage,
};
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};

pub mod cache;
pub mod config;
pub mod process;
pub mod runner;
pub mod toolchain;
pub mod types;
pub mod workspace;
