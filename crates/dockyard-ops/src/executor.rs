use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use crate::tool::ToolError;

/// External programs dockyard drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Git,
    Docker,
}

impl Tool {
    pub fn program(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Docker => "docker",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Abstraction over git / docker CLI execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
/// Implementations never change the process working directory; callers pass
/// locations as arguments (`git -C <dir>`, a docker build context path).
#[allow(async_fn_in_trait)]
pub trait ToolExecutor: Send + Sync {
    /// Execute a command and capture stdout.
    async fn exec(&self, tool: Tool, args: &[String]) -> Result<String, ToolError>;

    /// Execute a command, streaming its output to the terminal.
    async fn exec_streaming(&self, tool: Tool, args: &[String]) -> Result<(), ToolError>;

    /// Execute a command with data piped to stdin.
    async fn exec_with_stdin(
        &self,
        tool: Tool,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, ToolError>;
}

impl<E: ToolExecutor> ToolExecutor for &E {
    async fn exec(&self, tool: Tool, args: &[String]) -> Result<String, ToolError> {
        (**self).exec(tool, args).await
    }

    async fn exec_streaming(&self, tool: Tool, args: &[String]) -> Result<(), ToolError> {
        (**self).exec_streaming(tool, args).await
    }

    async fn exec_with_stdin(
        &self,
        tool: Tool,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, ToolError> {
        (**self).exec_with_stdin(tool, args, stdin_data).await
    }
}

/// Real CLI executor.
///
/// Streaming output goes to stderr so stdout stays free for the deploy
/// report.
#[derive(Debug, Default, Clone)]
pub struct RealExecutor {
    timeout: Option<Duration>,
}

impl RealExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any single invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        tool: Tool,
        args: &[String],
        fut: impl Future<Output = Result<T, ToolError>>,
    ) -> Result<T, ToolError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| ToolError::TimedOut {
                    tool,
                    args: args.to_vec(),
                    seconds: limit.as_secs(),
                })?,
            None => fut.await,
        }
    }
}

fn command(tool: Tool, args: &[String]) -> tokio::process::Command {
    tracing::debug!(tool = %tool, args = ?args, "exec");
    let mut cmd = tokio::process::Command::new(tool.program());
    cmd.args(args).kill_on_drop(true);
    cmd
}

fn captured(
    tool: Tool,
    args: &[String],
    output: std::process::Output,
) -> Result<String, ToolError> {
    if output.status.success() {
        String::from_utf8(output.stdout).map_err(|e| ToolError::InvalidUtf8 { tool, source: e })
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Err(ToolError::CommandFailed {
            tool,
            args: args.to_vec(),
            stderr,
        })
    }
}

impl ToolExecutor for RealExecutor {
    async fn exec(&self, tool: Tool, args: &[String]) -> Result<String, ToolError> {
        self.bounded(tool, args, async {
            let output = command(tool, args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|e| ToolError::NotFound { tool, source: e })?;
            captured(tool, args, output)
        })
        .await
    }

    async fn exec_streaming(&self, tool: Tool, args: &[String]) -> Result<(), ToolError> {
        self.bounded(tool, args, async {
            let status = command(tool, args)
                .stdout(std::io::stderr())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(|e| ToolError::NotFound { tool, source: e })?;

            if status.success() {
                Ok(())
            } else {
                Err(ToolError::CommandFailed {
                    tool,
                    args: args.to_vec(),
                    stderr: format!("exit code: {status}"),
                })
            }
        })
        .await
    }

    async fn exec_with_stdin(
        &self,
        tool: Tool,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, ToolError> {
        use tokio::io::AsyncWriteExt;

        self.bounded(tool, args, async {
            let mut child = command(tool, args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| ToolError::NotFound { tool, source: e })?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(stdin_data)
                    .await
                    .map_err(|e| ToolError::StdinWrite { tool, source: e })?;
                stdin
                    .shutdown()
                    .await
                    .map_err(|e| ToolError::StdinWrite { tool, source: e })?;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| ToolError::NotFound { tool, source: e })?;
            captured(tool, args, output)
        })
        .await
    }
}

pub(crate) fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

pub(crate) fn path_arg(path: &std::path::Path) -> Result<String, ToolError> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| ToolError::InvalidPath(path.to_path_buf()))
}
