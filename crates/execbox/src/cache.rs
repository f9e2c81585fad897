//! Content-addressed cache for native build artifacts
//!
//! Keys hash the compiler, its arguments and the source text, so a hit is
//! only possible for byte-identical builds. Entries expire after a TTL based
//! on their modification time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to use cache directory {path}: {reason}")]
    UntrustedDir { path: PathBuf, reason: &'static str },

    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// SHA-256 digest identifying one build
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn new(compiler: &str, args: &[String], source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(compiler.as_bytes());
        hasher.update([0]);
        for arg in args {
            hasher.update(arg.as_bytes());
            hasher.update([0]);
        }
        hasher.update([0]);
        hasher.update(source.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for compiled artifacts shared across requests
///
/// Implementations must be safe to call from concurrent requests.
pub trait ArtifactCache: Send + Sync + fmt::Debug {
    /// Copy the artifact for `key` to `dest`, returning whether it was present
    fn fetch(&self, key: &ArtifactKey, dest: &Path) -> Result<bool, CacheError>;

    /// Record `artifact` under `key`
    fn store(&self, key: &ArtifactKey, artifact: &Path) -> Result<(), CacheError>;

    /// Drop expired entries, returning how many were removed
    fn evict_expired(&self) -> Result<usize, CacheError>;
}

/// Artifact cache backed by a directory of files named by key
#[derive(Debug, Clone)]
pub struct DiskArtifactCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DiskArtifactCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &ArtifactKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// An mtime in the future counts as expired
    fn is_expired(&self, path: &Path) -> std::io::Result<bool> {
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(match SystemTime::now().duration_since(modified) {
            Ok(age) => age >= self.ttl,
            Err(_) => true,
        })
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(&self.dir)
            .map_err(|source| CacheError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;
        self.verify_dir()?;
        Ok(())
    }

    /// Check the cache directory is a real directory only the service user controls
    ///
    /// Returns `false` when the directory does not exist yet. A directory the
    /// service user owns but others can access is narrowed to mode 0700.
    fn verify_dir(&self) -> Result<bool, CacheError> {
        let metadata = match std::fs::symlink_metadata(&self.dir) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(io_error(&self.dir)(e)),
        };
        if !metadata.is_dir() {
            return Err(self.untrusted("not a directory"));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::{MetadataExt, PermissionsExt};

            if metadata.uid() != nix::unistd::geteuid().as_raw() {
                return Err(self.untrusted("owned by another user"));
            }
            if metadata.mode() & 0o077 != 0 {
                debug!(dir = %self.dir.display(), "restricting cache directory permissions");
                std::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700))
                    .map_err(io_error(&self.dir))?;
            }
        }
        Ok(true)
    }

    fn untrusted(&self, reason: &'static str) -> CacheError {
        CacheError::UntrustedDir {
            path: self.dir.clone(),
            reason,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn remove_tolerant(path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_error(path)(e)),
        _ => Ok(()),
    }
}

impl ArtifactCache for DiskArtifactCache {
    fn fetch(&self, key: &ArtifactKey, dest: &Path) -> Result<bool, CacheError> {
        if !self.verify_dir()? {
            return Ok(false);
        }
        let path = self.entry_path(key);
        match self.is_expired(&path) {
            Ok(false) => {}
            Ok(true) => {
                debug!(%key, "cached artifact expired");
                remove_tolerant(&path)?;
                return Ok(false);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(io_error(&path)(e)),
        }

        match std::fs::copy(&path, dest) {
            Ok(_) => {
                debug!(%key, "artifact cache hit");
                Ok(true)
            }
            // evicted between the expiry check and the copy
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn store(&self, key: &ArtifactKey, artifact: &Path) -> Result<(), CacheError> {
        self.ensure_dir()?;
        let path = self.entry_path(key);

        // Copy under a private name then rename so readers never see a partial file
        let staging = self
            .dir
            .join(format!(".{}.{}", key.as_str(), Uuid::new_v4().simple()));
        std::fs::copy(artifact, &staging).map_err(io_error(&staging))?;
        if let Err(e) = std::fs::rename(&staging, &path) {
            let _ = std::fs::remove_file(&staging);
            return Err(io_error(&path)(e));
        }

        debug!(%key, "artifact stored");
        Ok(())
    }

    fn evict_expired(&self) -> Result<usize, CacheError> {
        if !self.verify_dir()? {
            return Ok(0);
        }
        let entries = std::fs::read_dir(&self.dir).map_err(io_error(&self.dir))?;

        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(io_error(&self.dir))?.path();
            if !path.is_file() {
                continue;
            }
            if self.is_expired(&path).unwrap_or(false) {
                remove_tolerant(&path)?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "evicted expired artifacts");
        }
        Ok(removed)
    }
}
