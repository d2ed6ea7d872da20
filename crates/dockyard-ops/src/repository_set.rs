use std::path::{Path, PathBuf};

use dockyard_core::{ClonedRepository, RepositoryEntry, web_url_from_remote};

use crate::executor::ToolExecutor;
use crate::git::GitClient;
use crate::tool::ToolError;

/// Working copies for every configured entry, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct RepositorySet {
    repos: Vec<ClonedRepository>,
}

impl RepositorySet {
    /// Clone every entry into `workspace_dir/<name>`, from empty.
    ///
    /// Any existing directory at that path is removed first. The first
    /// failing entry aborts the whole set; nothing is retried.
    pub async fn materialize<E: ToolExecutor>(
        git: &GitClient<E>,
        workspace_dir: &Path,
        entries: &[RepositoryEntry],
    ) -> Result<Self, CloneError> {
        std::fs::create_dir_all(workspace_dir).map_err(|e| CloneError::Workspace {
            path: workspace_dir.to_path_buf(),
            source: e,
        })?;

        let mut repos = Vec::with_capacity(entries.len());
        for entry in entries {
            let local_path = workspace_dir.join(&entry.name);
            remove_existing(&entry.name, &local_path)?;

            tracing::info!(name = %entry.name, url = %entry.source_url, "cloning");
            git.clone_repo(&entry.source_url, &local_path)
                .await
                .map_err(|e| CloneError::Clone {
                    name: entry.name.clone(),
                    url: entry.source_url.clone(),
                    source: e,
                })?;

            let repo = describe(git, entry, local_path).await?;
            tracing::debug!(
                name = %repo.name,
                commit = %repo.head_commit_id,
                web_url = %repo.web_url,
                "working copy ready"
            );
            repos.push(repo);
        }

        Ok(Self { repos })
    }

    /// Commit metadata for `name`, if it was materialized.
    pub fn describe(&self, name: &str) -> Option<&ClonedRepository> {
        self.repos.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClonedRepository> {
        self.repos.iter()
    }

    pub fn as_slice(&self) -> &[ClonedRepository] {
        &self.repos
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }
}

fn remove_existing(name: &str, path: &Path) -> Result<(), CloneError> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| CloneError::Cleanup {
        name: name.to_owned(),
        path: path.to_path_buf(),
        source: e,
    })
}

async fn describe<E: ToolExecutor>(
    git: &GitClient<E>,
    entry: &RepositoryEntry,
    local_path: PathBuf,
) -> Result<ClonedRepository, CloneError> {
    let describe_err = |e| CloneError::Describe {
        name: entry.name.clone(),
        source: e,
    };

    let head = git.head_commit(&local_path).await.map_err(describe_err)?;
    let remote = git.remote_url(&local_path).await.map_err(describe_err)?;

    Ok(ClonedRepository {
        name: entry.name.clone(),
        local_path,
        head_commit_id: head.id,
        head_commit_message: head.message,
        web_url: web_url_from_remote(&remote),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("failed to create workspace directory {path}")]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove previous working copy of '{name}' at {path}")]
    Cleanup {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to clone '{name}' from {url}")]
    Clone {
        name: String,
        url: String,
        source: ToolError,
    },

    #[error("failed to read head commit of '{name}'")]
    Describe { name: String, source: ToolError },
}

impl CloneError {
    /// Entry the error belongs to, if any.
    pub fn entry(&self) -> Option<&str> {
        match self {
            Self::Workspace { .. } => None,
            Self::Cleanup { name, .. } | Self::Clone { name, .. } | Self::Describe { name, .. } => {
                Some(name)
            }
        }
    }
}
