mod config_cmd;
mod deploy;
mod deploy_pipeline;
mod report;
mod version;

use std::path::{Path, PathBuf};

use dockyard_core::{DEFAULT_CONFIG_FILE, EnvMap};

pub use config_cmd::config;
pub use deploy::deploy;
pub use deploy_pipeline::DeployOptions;
pub use version::version;

/// Staging area for certificate build contexts, relative to the root.
pub(crate) const CERT_STAGING_DIR: &str = ".dockyard/cert-context";

/// Where a deployment runs: the root directory, its config file, and the
/// environment the config is resolved against.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub env: EnvMap,
}

impl Workspace {
    /// Load `<root>/.env` (never overriding variables already set) and
    /// snapshot the process environment.
    pub fn load(root: &Path, config: Option<&Path>) -> Self {
        let dotenv_loaded = dotenvy::from_path(root.join(".env")).is_ok();
        tracing::debug!(dotenv = dotenv_loaded, root = %root.display(), "loading workspace");

        let env = std::env::vars_os()
            .filter_map(|(key, value)| {
                // arch-lint: allow(no-silent-result-drop) reason="non-UTF-8 variables cannot name repositories or registries; skipping them is intended"
                Some((key.into_string().ok()?, value.into_string().ok()?))
            })
            .collect();

        Self::with_env(root, config, env)
    }

    pub fn with_env(root: &Path, config: Option<&Path>, env: EnvMap) -> Self {
        let config_path = config.map_or_else(|| root.join(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        Self {
            root: root.to_path_buf(),
            config_path,
            env,
        }
    }

    /// Resolve a config-relative path against the root.
    pub fn path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}
