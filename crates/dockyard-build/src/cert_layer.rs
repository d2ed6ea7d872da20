use std::path::{Path, PathBuf};

use crate::certs::{CertError, CertificateBundle};

/// Directory inside the build context that holds the certificates.
const CONTEXT_CERT_DIR: &str = "certs";

/// Shell snippet that refreshes the system trust store on whatever
/// distribution the base image uses.
const TRUST_REFRESH: &str = "\
if command -v update-ca-certificates >/dev/null 2>&1; then update-ca-certificates; \\
    elif command -v update-ca-trust >/dev/null 2>&1; then update-ca-trust extract; \\
    elif command -v trust >/dev/null 2>&1; then trust extract-compat; \\
    else echo \"no trust store refresh command found\" >&2; exit 1; fi";

/// Renders the Dockerfile for a layer that installs trust certificates on
/// top of an already built image.
pub struct CertLayerGenerator<'a> {
    base_image: &'a str,
    install_path: &'a str,
    restore_user: Option<&'a str>,
}

impl<'a> CertLayerGenerator<'a> {
    pub fn new(base_image: &'a str, install_path: &'a str) -> Self {
        Self {
            base_image,
            install_path,
            restore_user: None,
        }
    }

    /// User to switch back to after the root-only refresh step.
    pub fn restore_user(mut self, user: Option<&'a str>) -> Self {
        self.restore_user = user.filter(|u| !u.trim().is_empty() && *u != "root" && *u != "0");
        self
    }

    pub fn render(&self) -> String {
        let restore = match self.restore_user {
            Some(user) => format!("USER {user}\n"),
            None => String::new(),
        };

        format!(
            r#"FROM {base}
USER root
COPY {cert_dir}/ {install_path}/
RUN {refresh}
{restore}"#,
            base = self.base_image,
            cert_dir = CONTEXT_CERT_DIR,
            install_path = self.install_path.trim_end_matches('/'),
            refresh = TRUST_REFRESH,
            restore = restore,
        )
    }
}

/// Rebuild `context_dir` from empty with the certificates and the rendered
/// Dockerfile. Returns the path of the written Dockerfile.
///
/// Certificates are copied with a `.crt` extension because that is the
/// only extension `update-ca-certificates` picks up.
pub fn stage_context(
    context_dir: &Path,
    bundle: &CertificateBundle,
    dockerfile_content: &str,
) -> Result<PathBuf, CertError> {
    if context_dir.exists() {
        std::fs::remove_dir_all(context_dir).map_err(|e| CertError::Cleanup {
            path: context_dir.to_path_buf(),
            source: e,
        })?;
    }
    let cert_dir = context_dir.join(CONTEXT_CERT_DIR);
    std::fs::create_dir_all(&cert_dir).map_err(|e| CertError::Create {
        path: cert_dir.clone(),
        source: e,
    })?;

    for src in bundle.files() {
        let dst = cert_dir.join(staged_name(src));
        std::fs::copy(src, &dst).map_err(|e| CertError::CopyFile {
            path: src.clone(),
            source: e,
        })?;
    }

    let dockerfile = context_dir.join("Dockerfile");
    std::fs::write(&dockerfile, dockerfile_content).map_err(|e| CertError::WriteDockerfile {
        path: dockerfile.clone(),
        source: e,
    })?;

    Ok(dockerfile)
}

/// `ca.crt` stays `ca.crt`; `ca.pem` becomes `ca.pem.crt` so two
/// certificates sharing a stem never collide.
fn staged_name(src: &Path) -> String {
    let file_name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "certificate".to_owned());
    let is_crt = src
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("crt"));
    if is_crt {
        file_name
    } else {
        format!("{file_name}.crt")
    }
}
