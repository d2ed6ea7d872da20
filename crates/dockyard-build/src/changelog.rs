use std::path::{Path, PathBuf};

use dockyard_core::{ClonedRepository, SemanticVersion};

/// Changelog file kept next to the version file.
pub const CHANGELOG_FILE: &str = "CHANGELOG.md";

const CHANGELOG_HEADER: &str = "# Changelog";

/// Today's local date as `YYYY-MM-DD`.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Render one release section.
///
/// ```text
/// ## v1.1.0 - 2026-10-16
///
/// - **api**: Fix login redirect ([0123456](https://github.com/acme/api/commit/0123456…))
/// ```
pub fn render_section(version: SemanticVersion, date: &str, repos: &[ClonedRepository]) -> String {
    let mut out = format!("## v{version} - {date}\n\n");
    for repo in repos {
        let message = repo.head_commit_message.lines().next().unwrap_or("").trim();
        let short = repo.short_commit_id();
        if repo.web_url.starts_with("http") {
            out.push_str(&format!(
                "- **{name}**: {message} ([{short}]({url}/commit/{id}))\n",
                name = repo.name,
                url = repo.web_url,
                id = repo.head_commit_id,
            ));
        } else {
            out.push_str(&format!("- **{name}**: {message} ({short})\n", name = repo.name));
        }
    }
    out
}

/// Insert `section` as the newest entry of the changelog at `path`.
///
/// A leading `# Changelog` header stays on top; the file is created if it
/// does not exist.
pub fn prepend_section(path: &Path, section: &str) -> Result<(), ChangelogError> {
    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(ChangelogError::Read {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let body = existing
        .strip_prefix(CHANGELOG_HEADER)
        .map(|rest| rest.trim_start_matches('\n'))
        .unwrap_or(&existing);

    let mut updated = format!("{CHANGELOG_HEADER}\n\n{}", section.trim_end());
    if !body.trim().is_empty() {
        updated.push_str("\n\n");
        updated.push_str(body.trim_end());
    }
    updated.push('\n');

    std::fs::write(path, updated).map_err(|e| ChangelogError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ChangelogError {
    #[error("failed to read changelog {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write changelog {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
