use std::path::{Path, PathBuf};
use thiserror::Error;

/// Keeps staged file operations inside one workspace.
///
/// Paths are resolved against the workspace root and canonicalised, so
/// symlinks and `..` cannot escape it. Version-control metadata, build
/// output and toolchain directories are off limits even inside the root.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    workspace_root: PathBuf,
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("path climbs out of its existing parent: {path}")]
    ParentTraversal { path: PathBuf },

    #[error("failed to resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directories inside a workspace that edits must never touch.
const FORBIDDEN_IN_WORKSPACE: &[&str] = &[".git", "target", "node_modules"];

/// Toolchain and dependency caches under the home directory.
const FORBIDDEN_IN_HOME: &[&str] = &[".cargo/registry", ".cargo/git", ".rustup"];

impl WorkspaceGuard {
    /// Guard `workspace_root`, which must exist.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = canonicalize(workspace_root.as_ref())?;

        let mut forbidden_paths: Vec<PathBuf> = FORBIDDEN_IN_WORKSPACE
            .iter()
            .map(|dir| root.join(dir))
            .collect();
        if let Some(home) = home::home_dir() {
            forbidden_paths.extend(
                FORBIDDEN_IN_HOME
                    .iter()
                    .filter_map(|dir| home.join(dir).canonicalize().ok()),
            );
        }

        Ok(Self {
            workspace_root: root,
            forbidden_paths,
        })
    }

    /// Guard with an explicit forbidden list (for tests).
    #[cfg(test)]
    pub fn with_forbidden(
        workspace_root: impl AsRef<Path>,
        forbidden: Vec<PathBuf>,
    ) -> Result<Self, SafetyError> {
        Ok(Self {
            workspace_root: canonicalize(workspace_root.as_ref())?,
            forbidden_paths: forbidden,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolve a path that may or may not exist yet (new files, move
    /// destinations) and check it.
    ///
    /// The deepest existing ancestor is canonicalised and the missing tail
    /// is appended; a tail containing `..` is rejected.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let absolute = self.absolute(path.as_ref());

        let mut existing = absolute.as_path();
        let mut tail = Vec::new();
        while !existing.exists() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                // A `..` below a missing directory cannot be resolved.
                _ => {
                    return Err(SafetyError::ParentTraversal {
                        path: absolute.clone(),
                    })
                }
            }
        }

        let mut resolved = canonicalize(existing)?;
        resolved.extend(tail.iter().rev());
        self.check(&resolved)?;
        Ok(resolved)
    }

    /// Resolve an existing path and check it.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let canonical = canonicalize(&self.absolute(path.as_ref()))?;
        self.check(&canonical)?;
        Ok(canonical)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn check(&self, resolved: &Path) -> Result<(), SafetyError> {
        if !resolved.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: resolved.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        if let Some(forbidden) = self
            .forbidden_paths
            .iter()
            .find(|forbidden| resolved.starts_with(forbidden))
        {
            return Err(SafetyError::ForbiddenPath {
                path: resolved.to_path_buf(),
                forbidden: forbidden.clone(),
            });
        }
        Ok(())
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, SafetyError> {
    path.canonicalize().map_err(|source| SafetyError::Resolve {
        path: path.to_path_buf(),
        source,
    })
}
