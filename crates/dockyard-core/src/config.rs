//! Declarative `key=value` deployment config.
//!
//! ```text
//! # registry and build settings
//! docker_registry=ghcr
//! cert_install_path=/usr/local/share/ca-certificates
//!
//! # one line per repository
//! api=https://github.com/acme/api.git
//! web=git@github.com:acme/web.git
//! web_needs_certs=true
//! ```
//!
//! Every line is classified into a [`ConfigDirective`] once, by key shape,
//! and [`ResolvedConfig::resolve`] folds the directives into a plain value.
//! Resolution never fails: when the file yields no repositories it falls
//! back to `<NAME>_REPO_URL` environment variables, and after that to a
//! fixed `frontend` / `backend` pair.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::registry::RegistryKind;

/// Snapshot of the process environment, passed explicitly so resolution
/// stays a pure function.
pub type EnvMap = BTreeMap<String, String>;

pub const DEFAULT_CONFIG_FILE: &str = "repos.conf";
pub const DEFAULT_REGISTRY: &str = "ghcr";
pub const DEFAULT_CERT_INSTALL_PATH: &str = "/usr/local/share/ca-certificates";
pub const DEFAULT_CERT_DIR: &str = "assets/certs";
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";
pub const DEFAULT_WORKSPACE_DIR: &str = "repos";

const NEEDS_CERTS_SUFFIX: &str = "_needs_certs";
const REPO_URL_ENV_SUFFIX: &str = "_REPO_URL";
const NEEDS_CERTS_ENV_SUFFIX: &str = "_NEEDS_CERTS";

/// One configured repository-to-image mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryEntry {
    /// Directory name of the working copy and last segment of the image path.
    pub name: String,
    pub source_url: String,
    pub needs_certificates: bool,
}

impl RepositoryEntry {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            needs_certificates: false,
        }
    }

    pub fn with_certificates(mut self, needs_certificates: bool) -> Self {
        self.needs_certificates = needs_certificates;
        self
    }
}

/// A single classified config line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigDirective {
    /// `docker_registry=<selector>`
    Registry(String),
    /// `registry_host=<host>`
    RegistryHost(String),
    /// `cert_install_path=<path inside the image>`
    CertPath(String),
    /// `cert_dir=<local directory with .crt/.pem/.cer files>`
    CertDir(String),
    /// `dockerfile=<manifest path relative to the build context>`
    Dockerfile(String),
    /// `workspace_dir=<where working copies are cloned>`
    WorkspaceDir(String),
    /// `<name>_needs_certs=true|false`
    CertFlag { name: String, enabled: bool },
    /// `<name>=<repository url>`
    Repository { name: String, url: String },
    /// Anything else; kept verbatim for diagnostics.
    Unrecognized(String),
}

/// Where the resolved entries came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    File,
    Environment,
    Defaults,
}

/// Fully resolved deployment config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    /// Registry selector as written (`ghcr`, `quay.io`, …). Normalized by
    /// [`ResolvedConfig::registry_kind`].
    pub registry: String,
    pub registry_host: Option<String>,
    /// Entries in configuration order.
    pub entries: Vec<RepositoryEntry>,
    pub entry_source: EntrySource,
    pub cert_install_path: String,
    pub cert_dir: PathBuf,
    pub dockerfile: String,
    pub workspace_dir: PathBuf,
}

/// Classify one line. Returns `None` for blank lines and `#` comments.
pub fn parse_directive(line: &str) -> Option<ConfigDirective> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let Some((key, value)) = line.split_once('=') else {
        return Some(ConfigDirective::Unrecognized(line.to_owned()));
    };
    let key = key.trim();
    let value = unquote(value.trim());

    let directive = match key {
        "docker_registry" => ConfigDirective::Registry(value.to_owned()),
        "registry_host" => ConfigDirective::RegistryHost(value.to_owned()),
        "cert_install_path" => ConfigDirective::CertPath(value.to_owned()),
        "cert_dir" => ConfigDirective::CertDir(value.to_owned()),
        "dockerfile" => ConfigDirective::Dockerfile(value.to_owned()),
        "workspace_dir" => ConfigDirective::WorkspaceDir(value.to_owned()),
        _ => match key.strip_suffix(NEEDS_CERTS_SUFFIX) {
            Some(name) => match (normalize_entry_name(name), parse_bool(value)) {
                (Some(name), Some(enabled)) => ConfigDirective::CertFlag { name, enabled },
                _ => ConfigDirective::Unrecognized(line.to_owned()),
            },
            None => match normalize_entry_name(key) {
                Some(name) if looks_like_repo_url(value) => ConfigDirective::Repository {
                    name,
                    url: value.to_owned(),
                },
                _ => ConfigDirective::Unrecognized(line.to_owned()),
            },
        },
    };

    Some(directive)
}

impl ResolvedConfig {
    /// Load the config file at `path`; a missing file resolves as empty.
    pub fn load(path: &Path, env: &EnvMap) -> crate::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::resolve(Some(&content), env)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found; using environment");
                Ok(Self::resolve(None, env))
            }
            Err(e) => Err(crate::Error::ConfigLoad {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Resolve config text (if any) plus environment into a config value.
    pub fn resolve(text: Option<&str>, env: &EnvMap) -> Self {
        let mut registry = None;
        let mut registry_host = None;
        let mut cert_install_path = None;
        let mut cert_dir = None;
        let mut dockerfile = None;
        let mut workspace_dir = None;
        let mut entries: Vec<RepositoryEntry> = Vec::new();
        let mut cert_flags: Vec<(String, bool)> = Vec::new();

        for (lineno, directive) in text
            .unwrap_or_default()
            .lines()
            .enumerate()
            .filter_map(|(i, line)| parse_directive(line).map(|d| (i + 1, d)))
        {
            match directive {
                ConfigDirective::Registry(v) => registry = Some(v),
                ConfigDirective::RegistryHost(v) => registry_host = Some(v),
                ConfigDirective::CertPath(v) => cert_install_path = Some(v),
                ConfigDirective::CertDir(v) => cert_dir = Some(v),
                ConfigDirective::Dockerfile(v) if is_contained_path(&v) => dockerfile = Some(v),
                ConfigDirective::Dockerfile(v) => {
                    tracing::warn!(
                        line = lineno,
                        dockerfile = %v,
                        "dockerfile must be relative to the build context; using default"
                    );
                }
                ConfigDirective::WorkspaceDir(v) => workspace_dir = Some(v),
                ConfigDirective::CertFlag { name, enabled } => cert_flags.push((name, enabled)),
                ConfigDirective::Repository { name, url } => {
                    match entries.iter_mut().find(|e| e.name == name) {
                        Some(existing) => {
                            tracing::warn!(
                                name = %name,
                                previous = %existing.source_url,
                                url = %url,
                                line = lineno,
                                "duplicate repository entry; last definition wins"
                            );
                            existing.source_url = url;
                        }
                        None => entries.push(RepositoryEntry::new(name, url)),
                    }
                }
                ConfigDirective::Unrecognized(raw) => {
                    tracing::debug!(line = lineno, raw = %raw, "ignoring unrecognized config line");
                }
            }
        }

        let mut entry_source = EntrySource::File;
        if entries.is_empty() {
            entries = entries_from_env(env);
            entry_source = EntrySource::Environment;
            if !entries.is_empty() {
                tracing::info!(count = entries.len(), "repository entries taken from *_REPO_URL");
            }
        }
        if entries.is_empty() {
            tracing::warn!("no repositories configured; falling back to default frontend/backend");
            entries = default_entries();
            entry_source = EntrySource::Defaults;
        }

        for (name, enabled) in cert_flags {
            match entries.iter_mut().find(|e| e.name == name) {
                Some(entry) => entry.needs_certificates = enabled,
                None => tracing::warn!(name = %name, "certificate flag for unknown repository"),
            }
        }

        let registry = registry
            .or_else(|| env.get("DOCKER_REGISTRY").cloned())
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_owned());

        Self {
            registry,
            registry_host: registry_host.filter(|h| !h.is_empty()),
            entries,
            entry_source,
            cert_install_path: cert_install_path
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_CERT_INSTALL_PATH.to_owned()),
            cert_dir: PathBuf::from(cert_dir.as_deref().unwrap_or(DEFAULT_CERT_DIR)),
            dockerfile: dockerfile
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_DOCKERFILE.to_owned()),
            workspace_dir: PathBuf::from(workspace_dir.as_deref().unwrap_or(DEFAULT_WORKSPACE_DIR)),
        }
    }

    /// Normalize the registry selector into a supported backend.
    pub fn registry_kind(&self) -> crate::Result<RegistryKind> {
        RegistryKind::from_selector(&self.registry)
    }

    pub fn entry(&self, name: &str) -> Option<&RepositoryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// `<NAME>_REPO_URL` variables, in name order. `<NAME>_NEEDS_CERTS=true`
/// flags the matching entry.
fn entries_from_env(env: &EnvMap) -> Vec<RepositoryEntry> {
    env.iter()
        .filter_map(|(key, url)| {
            let raw = key.strip_suffix(REPO_URL_ENV_SUFFIX)?;
            let name = normalize_entry_name(raw)?;
            if url.trim().is_empty() {
                return None;
            }
            let needs_certificates = env
                .get(&format!("{raw}{NEEDS_CERTS_ENV_SUFFIX}"))
                .and_then(|v| parse_bool(v))
                .unwrap_or(false);
            Some(RepositoryEntry::new(name, url.trim()).with_certificates(needs_certificates))
        })
        .collect()
}

fn default_entries() -> Vec<RepositoryEntry> {
    vec![
        RepositoryEntry::new("frontend", "https://github.com/your-org/frontend.git"),
        RepositoryEntry::new("backend", "https://github.com/your-org/backend.git"),
    ]
}

/// Longest name a registry accepts for one path component.
const MAX_ENTRY_NAME_LEN: usize = 128;

/// Lowercase `raw` and check it is usable as both a directory name and an
/// image name component.
///
/// Alphanumeric runs may be joined by `.`, `_`, `__` or any number of `-`;
/// the name must start and end with an alphanumeric character.
fn normalize_entry_name(raw: &str) -> Option<String> {
    let name = raw.trim().to_ascii_lowercase();
    if name.is_empty() || name.len() > MAX_ENTRY_NAME_LEN {
        return None;
    }

    let mut separator = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_alphanumeric() {
            if !is_name_separator(&separator) {
                return None;
            }
            separator.clear();
        } else if matches!(c, '.' | '_' | '-') && i > 0 {
            separator.push(c);
        } else {
            return None;
        }
    }
    separator.is_empty().then_some(name)
}

fn is_name_separator(separator: &str) -> bool {
    matches!(separator, "" | "." | "_" | "__") || separator.bytes().all(|b| b == b'-')
}

/// `true` when `path` stays inside whatever directory it is joined onto.
fn is_contained_path(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn looks_like_repo_url(value: &str) -> bool {
    const SCHEMES: &[&str] = &["https://", "http://", "ssh://", "git://", "file://"];
    if value.contains(char::is_whitespace) {
        return false;
    }
    if SCHEMES.iter().any(|s| value.starts_with(s)) {
        return true;
    }
    // scp-like: user@host:path
    match value.split_once('@') {
        Some((user, rest)) => {
            !user.is_empty() && rest.split_once(':').is_some_and(|(h, p)| !h.is_empty() && !p.is_empty())
        }
        None => false,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
