//! Workspace lifecycle management
//!
//! Allocates and removes the per-request scratch directories that sources,
//! build artifacts and program I/O live in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Errors that occur while managing workspaces
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace root {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create workspace {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove workspace {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("workspace admission closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An exclusively-owned scratch directory for one execution request
///
/// # Cleanup
///
/// Call [`WorkspaceManager::release`] when the request is done. Dropping an
/// unreleased workspace removes the directory synchronously as a fallback and
/// logs a warning.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,

    path: PathBuf,

    released: bool,

    /// Admission permit (if the manager bounds concurrency)
    _permit: Option<OwnedSemaphorePermit>,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Absolute path of the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the name attempts to leave the workspace.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty()
            || name.contains("..")
            || name.starts_with('/')
            || Path::new(name).is_absolute()
        {
            return Err(WorkspaceError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.path.join(name))
    }

    /// Write a file into the workspace
    #[instrument(skip(self, content), fields(workspace = %self.id))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<PathBuf, WorkspaceError> {
        let path = self.file_path(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(path)
    }

    /// Check if a file exists in the workspace
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn mark_released(&mut self) {
        self.released = true;
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            workspace = %self.id,
            path = %self.path.display(),
            "workspace dropped without release, removing synchronously"
        );
        if let Err(e) = remove_dir_tolerant(&self.path) {
            warn!(workspace = %self.id, error = %e, "best-effort workspace removal failed");
        }
    }
}

fn remove_dir_tolerant(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Allocator of uniquely-named workspaces under a root directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,

    /// Bounds the number of live workspaces, if configured
    semaphore: Option<Arc<Semaphore>>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            semaphore: None,
        }
    }

    /// Limit the number of workspaces alive at once
    pub fn with_limit(mut self, max_concurrent: usize) -> Self {
        self.semaphore = Some(Arc::new(Semaphore::new(max_concurrent)));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of workspaces that can still be acquired without waiting
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Create a fresh, uniquely-named workspace
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        let permit = match self.semaphore {
            Some(ref semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| WorkspaceError::Closed)?,
            ),
            None => None,
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WorkspaceError::CreateRoot {
                path: self.root.clone(),
                source,
            })?;

        // create_dir (not create_dir_all) so a name collision fails instead of sharing
        let id = Uuid::new_v4();
        let path = self.root.join(id.simple().to_string());
        tokio::fs::create_dir(&path)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: path.clone(),
                source,
            })?;

        debug!(%id, ?path, "workspace acquired");

        Ok(Workspace {
            id,
            path,
            released: false,
            _permit: permit,
        })
    }

    /// Remove a workspace and everything in it
    ///
    /// A directory that is already gone counts as released.
    #[instrument(skip(self, workspace), fields(workspace = %workspace.id))]
    pub async fn release(&self, mut workspace: Workspace) -> Result<(), WorkspaceError> {
        workspace.mark_released();
        match tokio::fs::remove_dir_all(&workspace.path).await {
            Ok(()) => {
                debug!("workspace released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("workspace already removed");
                Ok(())
            }
            Err(source) => Err(WorkspaceError::Remove {
                path: workspace.path.clone(),
                source,
            }),
        }
    }
}
