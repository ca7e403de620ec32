//! Note vault: sandboxed file access under a single root directory.
//!
//! All paths handed to the vault are relative to its root. Absolute paths and
//! `..` components are refused before the filesystem is touched, and resolved
//! paths are re-checked against the canonical root so symlinks cannot escape.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Path must be relative to the vault root: {0}")]
    AbsolutePath(String),
    #[error("Path must not contain '..': {0}")]
    Traversal(String),
    #[error("Path escapes the vault: {0}")]
    OutsideVault(String),
    #[error("Path is empty")]
    EmptyPath,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not a file: {0}")]
    NotAFile(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("File already exists: {0} (pass overwrite=true to replace it)")]
    AlreadyExists(String),
    #[error("File too large: {path} is {size} bytes, limit is {limit}")]
    TooLarge { path: String, size: u64, limit: u64 },
    #[error("File is not valid UTF-8: {0}")]
    NotText(String),
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// One entry returned by [`Vault::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultEntry {
    /// Path relative to the vault root, `/`-separated.
    pub path: String,
    pub is_dir: bool,
    /// Size in bytes; `0` for directories.
    pub size: u64,
}

/// Result of a successful [`Vault::write`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub path: String,
    pub bytes: usize,
    /// `false` when an existing file was overwritten.
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    max_file_bytes: u64,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_file_bytes,
        }
    }

    /// Create the root directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<(), VaultError> {
        fs::create_dir_all(&self.root).map_err(|source| VaultError::Io {
            path: self.root.display().to_string(),
            source,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a vault-relative path onto the filesystem.
    ///
    /// An empty path resolves to the root itself.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, VaultError> {
        let trimmed = relative.trim();
        let candidate = Path::new(trimmed);

        let mut clean = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir => return Err(VaultError::Traversal(trimmed.to_string())),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(VaultError::AbsolutePath(trimmed.to_string()))
                }
            }
        }

        let resolved = self.root.join(&clean);
        self.check_contained(&resolved, trimmed)?;
        Ok(resolved)
    }

    /// Canonicalise the deepest existing ancestor and require it to sit under
    /// the canonical root.
    ///
    /// Links are not followed while walking up, so a dangling symlink counts as
    /// existing and is refused.
    fn check_contained(&self, path: &Path, display: &str) -> Result<(), VaultError> {
        let Ok(root) = self.root.canonicalize() else {
            // No root yet, so nothing below it can be a symlink.
            return Ok(());
        };

        let mut existing = path;
        loop {
            if fs::symlink_metadata(existing).is_ok() {
                break;
            }
            match existing.parent() {
                Some(parent) => existing = parent,
                None => return Ok(()),
            }
        }

        let canonical = existing.canonicalize().map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => VaultError::OutsideVault(display.to_string()),
            _ => VaultError::Io {
                path: display.to_string(),
                source,
            },
        })?;
        if canonical.starts_with(&root) {
            Ok(())
        } else {
            Err(VaultError::OutsideVault(display.to_string()))
        }
    }

    /// Read a UTF-8 file.
    pub fn read(&self, relative: &str) -> Result<String, VaultError> {
        if relative.trim().is_empty() {
            return Err(VaultError::EmptyPath);
        }
        let path = self.resolve(relative)?;
        let meta = metadata(&path, relative)?;
        if !meta.is_file() {
            return Err(VaultError::NotAFile(relative.to_string()));
        }
        if meta.len() > self.max_file_bytes {
            return Err(VaultError::TooLarge {
                path: relative.to_string(),
                size: meta.len(),
                limit: self.max_file_bytes,
            });
        }

        fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::InvalidData => VaultError::NotText(relative.to_string()),
            _ => VaultError::Io {
                path: relative.to_string(),
                source,
            },
        })
    }

    /// Write `content`, creating parent directories as needed.
    pub fn write(
        &self,
        relative: &str,
        content: &str,
        overwrite: bool,
    ) -> Result<WriteOutcome, VaultError> {
        if relative.trim().is_empty() {
            return Err(VaultError::EmptyPath);
        }
        let path = self.resolve(relative)?;
        let io_err = |source: io::Error| VaultError::Io {
            path: relative.to_string(),
            source,
        };

        let existed = path.exists();
        if existed {
            if path.is_dir() {
                return Err(VaultError::NotAFile(relative.to_string()));
            }
            if !overwrite {
                return Err(VaultError::AlreadyExists(relative.to_string()));
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&path, content).map_err(io_err)?;

        tracing::debug!(path = %relative, bytes = content.len(), overwrite = existed, "Vault write");
        Ok(WriteOutcome {
            path: to_vault_path(Path::new(relative.trim())),
            bytes: content.len(),
            created: !existed,
        })
    }

    /// List a directory, optionally recursing. Entries are sorted by path.
    pub fn list(&self, relative: &str, recursive: bool) -> Result<Vec<VaultEntry>, VaultError> {
        let dir = self.resolve(relative)?;
        let meta = metadata(&dir, relative)?;
        if !meta.is_dir() {
            return Err(VaultError::NotADirectory(relative.to_string()));
        }

        let mut entries = Vec::new();
        let mut pending = vec![dir];
        while let Some(current) = pending.pop() {
            let read_dir = fs::read_dir(&current).map_err(|source| VaultError::Io {
                path: current.display().to_string(),
                source,
            })?;
            for item in read_dir {
                let item = item.map_err(|source| VaultError::Io {
                    path: current.display().to_string(),
                    source,
                })?;
                let path = item.path();
                let Ok(meta) = item.metadata() else {
                    continue;
                };
                let Ok(rel) = path.strip_prefix(&self.root) else {
                    continue;
                };

                let is_dir = meta.is_dir();
                entries.push(VaultEntry {
                    path: to_vault_path(rel),
                    is_dir,
                    size: if is_dir { 0 } else { meta.len() },
                });
                if is_dir && recursive {
                    pending.push(path);
                }
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

fn metadata(path: &Path, relative: &str) -> Result<fs::Metadata, VaultError> {
    fs::metadata(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => VaultError::NotFound(relative.to_string()),
        _ => VaultError::Io {
            path: relative.to_string(),
            source,
        },
    })
}

fn to_vault_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
