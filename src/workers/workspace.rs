use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::modules::video::model::JobId;

pub const INPUT_DIR: &str = "input";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },
    #[error("failed to list {}: {source}", path.display())]
    List { path: PathBuf, source: io::Error },
    #[error("failed to remove {}: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },
    #[error("no output files found in {}", .0.display())]
    NoOutputs(PathBuf),
}

// <base>/<job_id>/input/<job_id> holds the source, transcoder output lands in <base>/<job_id>.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    input_dir: PathBuf,
    released: bool,
}

impl Workspace {
    /// Replaces any stale tree left by an earlier run of the same job.
    pub async fn allocate(base: &Path, job_id: &JobId) -> Result<Self, WorkspaceError> {
        let root = base.join(job_id.as_str());

        remove_tree(&root).await?;
        let workspace = Self::create(root).await?;

        debug!(job_id = %job_id, root = %workspace.root.display(), "Workspace allocated");
        Ok(workspace)
    }

    // A root that gets created is removed again if the input dir cannot be.
    async fn create(root: PathBuf) -> Result<Self, WorkspaceError> {
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: root.clone(),
                source,
            })?;

        let workspace = Self {
            input_dir: root.join(INPUT_DIR),
            root,
            released: false,
        };

        if let Err(source) = tokio::fs::create_dir_all(&workspace.input_dir).await {
            let path = workspace.input_dir.clone();
            if let Err(e) = workspace.release().await {
                warn!(error = %e, "Failed to remove partially allocated workspace");
            }
            return Err(WorkspaceError::Create { path, source });
        }

        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.root
    }

    pub fn input_path(&self, job_id: &JobId) -> PathBuf {
        self.input_dir.join(job_id.as_str())
    }

    // Lexical order, files before subdirectories
    pub async fn list_outputs(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let list_err = |source| WorkspaceError::List {
                path: dir.clone(),
                source,
            };

            let mut reader = tokio::fs::read_dir(&dir).await.map_err(list_err)?;
            let mut entries = Vec::new();
            while let Some(entry) = reader.next_entry().await.map_err(list_err)? {
                let file_type = entry.file_type().await.map_err(list_err)?;
                entries.push((entry.file_name(), entry.path(), file_type));
            }
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut subdirs = Vec::new();
            for (name, path, file_type) in entries {
                if file_type.is_dir() {
                    if dir == self.root && name == INPUT_DIR {
                        continue;
                    }
                    subdirs.push(path);
                } else if file_type.is_file() {
                    files.push(path);
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }

        Ok(files)
    }

    pub async fn release(mut self) -> Result<(), WorkspaceError> {
        self.released = true;
        remove_tree(&self.root).await?;
        debug!(root = %self.root.display(), "Workspace released");
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        warn!(root = %self.root.display(), "Workspace dropped without release, removing");
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!(root = %self.root.display(), error = %e, "Failed to delete temp files"),
        }
    }
}

async fn remove_tree(path: &Path) -> Result<(), WorkspaceError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        // Already gone
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(WorkspaceError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
