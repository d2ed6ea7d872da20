use crate::executor::Tool;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{tool} not found — install it and make sure it is on PATH")]
    NotFound { tool: Tool, source: std::io::Error },

    #[error("{tool} command failed: {args:?}\n{stderr}")]
    CommandFailed {
        tool: Tool,
        args: Vec<String>,
        stderr: String,
    },

    #[error("{tool} did not finish within {seconds}s: {args:?}")]
    TimedOut {
        tool: Tool,
        args: Vec<String>,
        seconds: u64,
    },

    #[error("{tool} output was not valid UTF-8")]
    InvalidUtf8 {
        tool: Tool,
        source: std::string::FromUtf8Error,
    },

    #[error("failed to write to {tool} stdin")]
    StdinWrite { tool: Tool, source: std::io::Error },

    #[error("path is not valid UTF-8: {0}")]
    InvalidPath(std::path::PathBuf),
}
