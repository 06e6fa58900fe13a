//! Task workspace management.
//!
//! Every job execution gets a fresh, uniquely-named directory and must
//! give it back on every exit path. [`WorkspaceGuard`] is the scoped
//! acquisition construct: release runs when the guard drops, whether the
//! job returned a value, propagated an error, or was cancelled mid-await.
//! A failed release is logged and never masks the job's own result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::WorkspaceError;

/// A handle to an acquired workspace directory.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
}

impl Workspace {
    /// Returns the workspace identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the workspace directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a path for a file inside the workspace.
    #[must_use]
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }
}

/// Allocates and tears down per-job workspace directories.
pub trait WorkspaceManager: Send + Sync {
    /// Creates a fresh, uniquely-named, empty directory.
    fn acquire(&self) -> Result<Workspace, WorkspaceError>;

    /// Recursively removes the workspace directory.
    fn release(&self, workspace: Workspace) -> Result<(), WorkspaceError>;
}

/// Production workspace manager backed by uniquely-named directories
/// under a configurable root.
#[derive(Debug, Clone)]
pub struct TempWorkspaceManager {
    root: PathBuf,
}

impl TempWorkspaceManager {
    /// Creates a manager rooted at the system temp directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: std::env::temp_dir(),
        }
    }

    /// Creates a manager rooted at the given directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory workspaces are created under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for TempWorkspaceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceManager for TempWorkspaceManager {
    fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        std::fs::create_dir_all(&self.root).map_err(|source| WorkspaceError::Allocation {
            root: self.root.clone(),
            source,
        })?;

        let dir = tempfile::Builder::new()
            .prefix("trainflow-task-")
            .tempdir_in(&self.root)
            .map_err(|source| WorkspaceError::Allocation {
                root: self.root.clone(),
                source,
            })?;

        // Take ownership of the path; removal is the manager's job, not
        // the TempDir destructor's.
        let path = dir.into_path();
        let workspace = Workspace {
            id: Uuid::new_v4(),
            path,
        };
        debug!(workspace_id = %workspace.id, path = %workspace.path.display(), "workspace acquired");
        Ok(workspace)
    }

    fn release(&self, workspace: Workspace) -> Result<(), WorkspaceError> {
        debug!(workspace_id = %workspace.id, path = %workspace.path.display(), "workspace released");
        std::fs::remove_dir_all(&workspace.path).map_err(|source| WorkspaceError::Cleanup {
            path: workspace.path.clone(),
            source,
        })
    }
}

/// Scoped workspace acquisition.
///
/// Holds the workspace for exactly one job execution and releases it on
/// drop. Cleanup failures are logged with `warn!` and swallowed so they
/// cannot shadow the result of the guarded job.
pub struct WorkspaceGuard {
    manager: Arc<dyn WorkspaceManager>,
    workspace: Option<Workspace>,
}

impl WorkspaceGuard {
    /// Acquires a workspace from the manager.
    pub fn acquire(manager: Arc<dyn WorkspaceManager>) -> Result<Self, WorkspaceError> {
        let workspace = manager.acquire()?;
        Ok(Self {
            manager,
            workspace: Some(workspace),
        })
    }

    /// Returns the workspace directory path.
    ///
    /// # Panics
    ///
    /// Never panics in practice: the workspace is only taken on drop.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.workspace
            .as_ref()
            .map(Workspace::path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Returns the workspace identifier.
    #[must_use]
    pub fn id(&self) -> Option<Uuid> {
        self.workspace.as_ref().map(Workspace::id)
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            let path = workspace.path().to_path_buf();
            if let Err(error) = self.manager.release(workspace) {
                warn!(path = %path.display(), %error, "workspace release failed");
            }
        }
    }
}

impl std::fmt::Debug for WorkspaceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceGuard")
            .field("workspace", &self.workspace)
            .finish()
    }
}
