use std::path::{Path, PathBuf};

/// File extensions recognized as trust certificates.
pub const CERT_EXTENSIONS: &[&str] = &["crt", "pem", "cer"];

/// Trust certificates discovered in the assets directory.
///
/// Discovery is non-recursive: only regular files directly inside the
/// directory are considered. Files are kept in name order so the rendered
/// build context is stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateBundle {
    files: Vec<PathBuf>,
}

impl CertificateBundle {
    /// Scan `dir` for `.crt`, `.pem` and `.cer` files.
    ///
    /// A missing directory yields an empty bundle.
    pub fn discover(dir: &Path) -> Result<Self, CertError> {
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "certificate directory not found");
            return Ok(Self::default());
        }

        let read_err = |e| CertError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.is_file() && has_cert_extension(&path) {
                files.push(path);
            }
        }
        files.sort();

        tracing::debug!(dir = %dir.display(), count = files.len(), "certificates discovered");
        Ok(Self { files })
    }

    pub fn from_files(mut files: Vec<PathBuf>) -> Self {
        files.sort();
        Self { files }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn has_cert_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            CERT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("failed to read certificate directory {path}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to clean up build context {path}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create directory {path}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy certificate {path}")]
    CopyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write Dockerfile at {path}")]
    WriteDockerfile {
        path: PathBuf,
        source: std::io::Error,
    },
}
