//! Container registry backends.
//!
//! A backend is described entirely by the [`Registry`] capability set: where
//! to log in, how to form an image path, and whether to log out after a
//! push. The publisher only ever talks to `&dyn Registry`, so a new backend
//! is a new type implementing the trait plus a [`RegistryTarget`] variant.

use std::fmt;

use secrecy::SecretString;
use serde::Serialize;

use crate::config::EnvMap;

pub const GITHUB_REGISTRY_HOST: &str = "ghcr.io";
pub const QUAY_REGISTRY_HOST: &str = "quay.io";

/// Normalized registry selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    GitHub,
    Quay,
}

impl RegistryKind {
    /// Map a `docker_registry` value (or alias) onto a backend.
    pub fn from_selector(selector: &str) -> crate::Result<Self> {
        match selector.trim().to_ascii_lowercase().as_str() {
            "ghcr" | "ghcr.io" | "github" => Ok(Self::GitHub),
            "quay" | "quay.io" => Ok(Self::Quay),
            _ => Err(crate::Error::UnsupportedRegistry {
                selector: selector.to_owned(),
            }),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::Quay => "Quay",
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Username + secret handed to `docker login --password-stdin`.
pub struct LoginCredentials {
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Capability set every registry backend provides.
pub trait Registry: Send + Sync {
    fn kind(&self) -> RegistryKind;

    /// Server argument for `docker login` / `docker logout`.
    fn login_server(&self) -> &str;

    /// Fully-qualified image path without a tag.
    fn image_path(&self, image_name: &str) -> String;

    /// Whether to run `docker logout` once pushing is finished.
    fn logout_after_push(&self) -> bool;

    /// Login credentials, or the environment variable that is missing.
    fn credentials(&self) -> crate::Result<LoginCredentials>;
}

/// GitHub Container Registry: `<host>/<owner>/<image>`.
#[derive(Clone)]
pub struct GitHubRegistry {
    host: String,
    owner: String,
    actor: Option<String>,
    token: Option<SecretString>,
}

impl GitHubRegistry {
    /// `owner` is lowercased; GHCR rejects mixed-case repository paths.
    pub fn new(host: impl Into<String>, owner: &str) -> Self {
        Self {
            host: host.into(),
            owner: owner.trim().to_ascii_lowercase(),
            actor: None,
            token: None,
        }
    }

    pub fn with_login(mut self, actor: impl Into<String>, token: SecretString) -> Self {
        self.actor = Some(actor.into());
        self.token = Some(token);
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl fmt::Debug for GitHubRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubRegistry")
            .field("host", &self.host)
            .field("owner", &self.owner)
            .field("actor", &self.actor)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Registry for GitHubRegistry {
    fn kind(&self) -> RegistryKind {
        RegistryKind::GitHub
    }

    fn login_server(&self) -> &str {
        &self.host
    }

    fn image_path(&self, image_name: &str) -> String {
        format!("{}/{}/{image_name}", self.host, self.owner)
    }

    fn logout_after_push(&self) -> bool {
        true
    }

    fn credentials(&self) -> crate::Result<LoginCredentials> {
        let username = self.actor.clone().ok_or(crate::Error::MissingRegistrySetting {
            registry: "GitHub",
            variable: "GITHUB_ACTOR",
        })?;
        let password = self.token.clone().ok_or(crate::Error::MissingRegistrySetting {
            registry: "GitHub",
            variable: "GITHUB_TOKEN",
        })?;
        Ok(LoginCredentials { username, password })
    }
}

/// Quay: `<host>/[<organization>/[<team>/]]<image>`.
///
/// Empty organization / team segments are dropped from the path entirely.
#[derive(Clone)]
pub struct QuayRegistry {
    host: String,
    organization: Option<String>,
    team: Option<String>,
    user: Option<String>,
    password: Option<SecretString>,
}

impl QuayRegistry {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            organization: None,
            team: None,
            user: None,
            password: None,
        }
    }

    pub fn with_organization(mut self, organization: Option<&str>) -> Self {
        self.organization = normalize_segment(organization);
        self
    }

    pub fn with_team(mut self, team: Option<&str>) -> Self {
        self.team = normalize_segment(team);
        self
    }

    pub fn with_login(mut self, user: impl Into<String>, password: SecretString) -> Self {
        self.user = Some(user.into());
        self.password = Some(password);
        self
    }
}

impl fmt::Debug for QuayRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuayRegistry")
            .field("host", &self.host)
            .field("organization", &self.organization)
            .field("team", &self.team)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Registry for QuayRegistry {
    fn kind(&self) -> RegistryKind {
        RegistryKind::Quay
    }

    fn login_server(&self) -> &str {
        &self.host
    }

    fn image_path(&self, image_name: &str) -> String {
        // A team without an organization has nothing to nest under.
        let team = self.organization.as_ref().and(self.team.as_deref());
        [
            Some(self.host.as_str()),
            self.organization.as_deref(),
            team,
            Some(image_name),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("/")
    }

    fn logout_after_push(&self) -> bool {
        true
    }

    fn credentials(&self) -> crate::Result<LoginCredentials> {
        let username = self.user.clone().ok_or(crate::Error::MissingRegistrySetting {
            registry: "Quay",
            variable: "QUAY_USERNAME",
        })?;
        let password = self
            .password
            .clone()
            .ok_or(crate::Error::MissingRegistrySetting {
                registry: "Quay",
                variable: "QUAY_PASSWORD",
            })?;
        Ok(LoginCredentials { username, password })
    }
}

/// The registry a deployment pushes to.
#[derive(Debug, Clone)]
pub enum RegistryTarget {
    GitHub(GitHubRegistry),
    Quay(QuayRegistry),
}

impl RegistryTarget {
    /// Build the target for `kind` from environment variables.
    ///
    /// | backend | variables |
    /// |---|---|
    /// | GitHub | `GITHUB_REPOSITORY_OWNER` (or `GITHUB_OWNER`), `GITHUB_ACTOR`, `GITHUB_TOKEN` (or `GHCR_TOKEN`) |
    /// | Quay | `QUAY_ORGANIZATION`, `QUAY_TEAM`, `QUAY_USERNAME`, `QUAY_PASSWORD` |
    ///
    /// Only the GitHub owner is required here; login variables are checked
    /// when a login is attempted, so dry runs work without secrets.
    pub fn from_env(kind: RegistryKind, host: Option<&str>, env: &EnvMap) -> crate::Result<Self> {
        let var = |name: &str| env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        match kind {
            RegistryKind::GitHub => {
                let owner = var("GITHUB_REPOSITORY_OWNER")
                    .or_else(|| var("GITHUB_OWNER"))
                    .ok_or(crate::Error::MissingRegistrySetting {
                        registry: "GitHub",
                        variable: "GITHUB_REPOSITORY_OWNER",
                    })?;
                let mut registry = GitHubRegistry::new(host.unwrap_or(GITHUB_REGISTRY_HOST), owner);
                if let (Some(actor), Some(token)) =
                    (var("GITHUB_ACTOR"), var("GITHUB_TOKEN").or_else(|| var("GHCR_TOKEN")))
                {
                    registry = registry.with_login(actor, SecretString::from(token.to_owned()));
                }
                Ok(Self::GitHub(registry))
            }
            RegistryKind::Quay => {
                let mut registry = QuayRegistry::new(host.unwrap_or(QUAY_REGISTRY_HOST))
                    .with_organization(var("QUAY_ORGANIZATION"))
                    .with_team(var("QUAY_TEAM"));
                if let (Some(user), Some(password)) = (var("QUAY_USERNAME"), var("QUAY_PASSWORD")) {
                    registry = registry.with_login(user, SecretString::from(password.to_owned()));
                }
                Ok(Self::Quay(registry))
            }
        }
    }

    pub fn as_registry(&self) -> &dyn Registry {
        match self {
            Self::GitHub(r) => r,
            Self::Quay(r) => r,
        }
    }
}

fn normalize_segment(segment: Option<&str>) -> Option<String> {
    segment
        .map(|s| s.trim().trim_matches('/').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}
