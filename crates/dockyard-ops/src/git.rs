use std::path::Path;

use crate::executor::{RealExecutor, Tool, ToolExecutor, args, path_arg};
use crate::tool::ToolError;

/// git operations, parameterized over the executor for testability.
pub struct GitClient<E: ToolExecutor = RealExecutor> {
    executor: E,
}

impl GitClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor::new(),
        }
    }
}

impl Default for GitClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

/// Head revision of a working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadCommit {
    pub id: String,
    /// Subject line of the commit message.
    pub message: String,
}

impl<E: ToolExecutor> GitClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// Shallow clone of the remote HEAD into `dest`.
    pub async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), ToolError> {
        let dest = path_arg(dest)?;
        self.executor
            .exec(
                Tool::Git,
                &args(["clone", "--depth", "1", "--quiet", url, &dest]),
            )
            .await?;
        Ok(())
    }

    pub async fn head_commit(&self, repo: &Path) -> Result<HeadCommit, ToolError> {
        let repo = path_arg(repo)?;
        let output = self
            .executor
            .exec(
                Tool::Git,
                &args(["-C", &repo, "log", "-1", "--format=%H%n%s"]),
            )
            .await?;

        let mut lines = output.lines();
        let id = lines.next().unwrap_or("").trim().to_owned();
        let message = lines.next().unwrap_or("").trim().to_owned();
        if id.is_empty() {
            return Err(ToolError::CommandFailed {
                tool: Tool::Git,
                args: args(["-C", &repo, "log", "-1"]),
                stderr: "no commits in working copy".to_owned(),
            });
        }
        Ok(HeadCommit { id, message })
    }

    pub async fn remote_url(&self, repo: &Path) -> Result<String, ToolError> {
        let repo = path_arg(repo)?;
        let output = self
            .executor
            .exec(
                Tool::Git,
                &args(["-C", &repo, "remote", "get-url", "origin"]),
            )
            .await?;
        Ok(output.trim().to_owned())
    }

    /// Abbreviated id of HEAD, or an error when `repo` is not a working copy.
    pub async fn short_sha(&self, repo: &Path) -> Result<String, ToolError> {
        let repo_arg = path_arg(repo)?;
        let output = self
            .executor
            .exec(
                Tool::Git,
                &args(["-C", &repo_arg, "rev-parse", "--short", "HEAD"]),
            )
            .await?;
        let sha = output.trim().to_owned();
        if sha.is_empty() {
            return Err(ToolError::CommandFailed {
                tool: Tool::Git,
                args: args(["-C", &repo_arg, "rev-parse", "--short", "HEAD"]),
                stderr: "empty revision".to_owned(),
            });
        }
        Ok(sha)
    }

    /// Commit `files` in `repo` and mark the commit with an annotated `tag`.
    pub async fn record_release(
        &self,
        repo: &Path,
        files: &[&str],
        message: &str,
        tag: &str,
    ) -> Result<(), ToolError> {
        let repo = path_arg(repo)?;

        let mut add = args(["-C", &repo, "add", "--"]);
        add.extend(files.iter().map(|f| (*f).to_owned()));
        self.executor.exec(Tool::Git, &add).await?;

        self.executor
            .exec(Tool::Git, &args(["-C", &repo, "commit", "--quiet", "-m", message]))
            .await?;

        self.executor
            .exec(Tool::Git, &args(["-C", &repo, "tag", "-a", tag, "-m", message]))
            .await?;

        tracing::info!(%tag, "release recorded in source control");
        Ok(())
    }
}
