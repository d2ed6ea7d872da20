use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "unsupported docker_registry '{selector}' — expected one of: ghcr, ghcr.io, github, quay, quay.io"
    )]
    UnsupportedRegistry { selector: String },

    #[error("no repository entries configured — add `<name>=<url>` lines to the config")]
    NoEntries,

    #[error("{variable} is not set — required for the {registry} registry")]
    MissingRegistrySetting {
        registry: &'static str,
        variable: &'static str,
    },

    // ── Version state ──
    #[error("failed to read version file {path}")]
    VersionRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write version file {path}")]
    VersionWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot bump {component} of version {version}: component would overflow")]
    VersionOverflow {
        version: String,
        component: &'static str,
    },

    #[error("invalid bump kind '{0}' — expected patch, minor, or major")]
    InvalidBumpKind(String),
}
