use std::path::{Path, PathBuf};
use std::time::Duration;

use dockyard_build::cert_layer::{CertLayerGenerator, stage_context};
use dockyard_build::certs::{CertError, CertificateBundle};
use dockyard_core::{Registry, RepositoryEntry, SemanticVersion};
use secrecy::ExposeSecret;

use crate::executor::{RealExecutor, Tool, ToolExecutor, args, path_arg};
use crate::git::GitClient;
use crate::tags::ImageTagSet;
use crate::tool::ToolError;

/// Login attempts before authentication is declared failed.
pub const AUTH_ATTEMPTS: u32 = 3;
/// Fixed pause between login attempts.
pub const AUTH_BACKOFF: Duration = Duration::from_secs(2);

/// Everything needed to publish one entry.
pub struct PublishRequest<'a> {
    pub entry: &'a RepositoryEntry,
    /// Root of the build context (the entry's working copy).
    pub build_context: &'a Path,
    /// Manifest path relative to `build_context`.
    pub dockerfile: &'a str,
    pub version: SemanticVersion,
    pub additional_tag: Option<&'a str>,
    pub certificates: CertificateSettings<'a>,
    pub dry_run: bool,
}

/// Where certificates come from and where they go.
pub struct CertificateSettings<'a> {
    /// Directory scanned for `.crt` / `.pem` / `.cer` files.
    pub source_dir: &'a Path,
    /// Destination directory inside the image.
    pub install_path: &'a str,
    /// Parent of the per-entry staging build contexts.
    pub staging_dir: &'a Path,
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Tags pushed, or in a dry run the tags that would have been pushed.
    pub tags: Vec<String>,
    pub pushed: bool,
    pub certificates_injected: bool,
}

/// Builds, optionally certifies, and pushes the image for one entry.
pub struct ImagePublisher<E: ToolExecutor = RealExecutor> {
    executor: E,
    auth_attempts: u32,
    auth_backoff: Duration,
}

impl ImagePublisher<RealExecutor> {
    pub fn new() -> Self {
        Self::with_executor(RealExecutor::new())
    }
}

impl Default for ImagePublisher<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ToolExecutor> ImagePublisher<E> {
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            auth_attempts: AUTH_ATTEMPTS,
            auth_backoff: AUTH_BACKOFF,
        }
    }

    pub fn with_auth_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.auth_attempts = attempts.max(1);
        self.auth_backoff = backoff;
        self
    }

    /// Run build → (login → certificates → push → logout) for one entry.
    ///
    /// In a dry run the image is built and tagged locally and nothing else
    /// happens. Pushing stops at the first failing tag.
    pub async fn publish(
        &self,
        registry: &dyn Registry,
        request: &PublishRequest<'_>,
    ) -> Result<PublishOutcome, PublishError> {
        let name = request.entry.name.as_str();
        let tags = self.compute_tags(registry, request).await;

        self.build(request, &tags).await?;

        if request.dry_run {
            tracing::info!(name = %name, tags = ?tags.as_slice(), "dry run; skipping login and push");
            return Ok(PublishOutcome {
                tags: tags.into_vec(),
                pushed: false,
                certificates_injected: false,
            });
        }

        self.login(registry, name).await?;

        let result = self.certify_and_push(request, &tags).await;

        if registry.logout_after_push() {
            self.logout(registry).await;
        }

        let certificates_injected = result?;
        Ok(PublishOutcome {
            tags: tags.into_vec(),
            pushed: true,
            certificates_injected,
        })
    }

    /// Tag set for the request; the `sha-` tag is omitted when the build
    /// context has no resolvable revision.
    pub async fn compute_tags(
        &self,
        registry: &dyn Registry,
        request: &PublishRequest<'_>,
    ) -> ImageTagSet {
        let git = GitClient::with_executor(&self.executor);
        let short_sha = match git.short_sha(request.build_context).await {
            Ok(sha) => Some(sha),
            Err(e) => {
                tracing::warn!(
                    name = %request.entry.name,
                    error = %e,
                    "no resolvable revision; omitting sha tag"
                );
                None
            }
        };

        ImageTagSet::compute(
            registry,
            &request.entry.name,
            short_sha.as_deref(),
            request.additional_tag,
        )
    }

    async fn build(
        &self,
        request: &PublishRequest<'_>,
        tags: &ImageTagSet,
    ) -> Result<(), PublishError> {
        let name = &request.entry.name;
        let manifest = request.build_context.join(request.dockerfile);
        if !manifest.is_file() {
            return Err(PublishError::ManifestMissing {
                name: name.clone(),
                path: manifest,
            });
        }

        let mut cmd = args(["build", "--file"]);
        cmd.push(path_arg(&manifest).map_err(|e| build_err(name, e))?);
        for tag in tags.as_slice() {
            cmd.push("--tag".to_owned());
            cmd.push(tag.clone());
        }
        for label in [
            format!("org.opencontainers.image.version={}", request.version),
            format!("org.opencontainers.image.source={}", request.entry.source_url),
        ] {
            cmd.push("--label".to_owned());
            cmd.push(label);
        }
        cmd.push(path_arg(request.build_context).map_err(|e| build_err(name, e))?);

        tracing::info!(name = %name, tags = tags.as_slice().len(), "building image");
        self.executor
            .exec_streaming(Tool::Docker, &cmd)
            .await
            .map_err(|e| build_err(name, e))
    }

    async fn login(&self, registry: &dyn Registry, name: &str) -> Result<(), PublishError> {
        let server = registry.login_server().to_owned();
        let credentials = registry.credentials().map_err(|e| PublishError::MissingCredentials {
            name: name.to_owned(),
            server: server.clone(),
            source: e,
        })?;

        let cmd = args([
            "login",
            &server,
            "--username",
            &credentials.username,
            "--password-stdin",
        ]);

        let mut attempt = 1;
        loop {
            match self
                .executor
                .exec_with_stdin(
                    Tool::Docker,
                    &cmd,
                    credentials.password.expose_secret().as_bytes(),
                )
                .await
            {
                Ok(_) => {
                    tracing::debug!(%server, attempt, "logged in");
                    return Ok(());
                }
                Err(e) if attempt < self.auth_attempts => {
                    tracing::warn!(%server, attempt, error = %e, "login failed; retrying");
                    tokio::time::sleep(self.auth_backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(PublishError::Authentication {
                        name: name.to_owned(),
                        server,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    async fn logout(&self, registry: &dyn Registry) {
        let server = registry.login_server();
        if let Err(e) = self
            .executor
            .exec(Tool::Docker, &args(["logout", server]))
            .await
        {
            tracing::warn!(%server, error = %e, "logout failed");
        }
    }

    /// Returns whether certificates were injected.
    async fn certify_and_push(
        &self,
        request: &PublishRequest<'_>,
        tags: &ImageTagSet,
    ) -> Result<bool, PublishError> {
        let injected = if request.entry.needs_certificates {
            self.inject_certificates(request, tags).await?
        } else {
            false
        };

        let name = &request.entry.name;
        for tag in tags.as_slice() {
            tracing::info!(name = %name, %tag, "pushing");
            self.executor
                .exec_streaming(Tool::Docker, &args(["push", tag]))
                .await
                .map_err(|e| PublishError::Push {
                    name: name.clone(),
                    tag: tag.clone(),
                    source: e,
                })?;
        }

        Ok(injected)
    }

    /// Replace every tag with a variant carrying the certificate bundle.
    ///
    /// An empty bundle is a warning, not an error: the original image is
    /// pushed unchanged.
    async fn inject_certificates(
        &self,
        request: &PublishRequest<'_>,
        tags: &ImageTagSet,
    ) -> Result<bool, PublishError> {
        let name = &request.entry.name;
        let settings = &request.certificates;
        let stage_err = |e| PublishError::CertificateStaging {
            name: name.clone(),
            source: e,
        };

        let bundle = CertificateBundle::discover(settings.source_dir).map_err(stage_err)?;
        if bundle.is_empty() {
            tracing::warn!(
                name = %name,
                dir = %settings.source_dir.display(),
                "entry needs certificates but none were found; pushing image unchanged"
            );
            return Ok(false);
        }

        let context = settings.staging_dir.join(name);
        for tag in tags.as_slice() {
            let inject_err = |e| PublishError::CertificateInjection {
                name: name.clone(),
                tag: tag.clone(),
                source: e,
            };

            let user = self.image_user(tag).await.map_err(inject_err)?;
            let dockerfile = CertLayerGenerator::new(tag, settings.install_path)
                .restore_user(user.as_deref())
                .render();
            let dockerfile_path =
                stage_context(&context, &bundle, &dockerfile).map_err(stage_err)?;

            let mut cmd = args(["build", "--file"]);
            cmd.push(path_arg(&dockerfile_path).map_err(inject_err)?);
            cmd.extend(args(["--tag", tag]));
            cmd.push(path_arg(&context).map_err(inject_err)?);

            tracing::info!(name = %name, %tag, certs = bundle.len(), "injecting certificates");
            self.executor
                .exec_streaming(Tool::Docker, &cmd)
                .await
                .map_err(inject_err)?;
        }

        Ok(true)
    }

    /// Configured `USER` of a local image, if any.
    async fn image_user(&self, tag: &str) -> Result<Option<String>, ToolError> {
        let output = self
            .executor
            .exec(
                Tool::Docker,
                &args(["image", "inspect", "--format", "{{.Config.User}}", tag]),
            )
            .await?;
        let user = output.trim();
        Ok((!user.is_empty()).then(|| user.to_owned()))
    }
}

fn build_err(name: &str, source: ToolError) -> PublishError {
    PublishError::Build {
        name: name.to_owned(),
        source,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("build manifest for '{name}' not found at {path}")]
    ManifestMissing { name: String, path: PathBuf },

    #[error("image build failed for '{name}'")]
    Build { name: String, source: ToolError },

    #[error("no login credentials for {server} while publishing '{name}'")]
    MissingCredentials {
        name: String,
        server: String,
        source: dockyard_core::Error,
    },

    #[error("login to {server} failed after {attempts} attempt(s) while publishing '{name}'")]
    Authentication {
        name: String,
        server: String,
        attempts: u32,
        source: ToolError,
    },

    #[error("failed to stage certificates for '{name}'")]
    CertificateStaging { name: String, source: CertError },

    #[error("certificate injection failed for '{name}' ({tag})")]
    CertificateInjection {
        name: String,
        tag: String,
        source: ToolError,
    },

    #[error("push failed for '{name}' ({tag})")]
    Push {
        name: String,
        tag: String,
        source: ToolError,
    },
}

impl PublishError {
    pub fn entry(&self) -> &str {
        match self {
            Self::ManifestMissing { name, .. }
            | Self::Build { name, .. }
            | Self::MissingCredentials { name, .. }
            | Self::Authentication { name, .. }
            | Self::CertificateStaging { name, .. }
            | Self::CertificateInjection { name, .. }
            | Self::Push { name, .. } => name,
        }
    }
}
