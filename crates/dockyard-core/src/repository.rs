use std::path::PathBuf;

use serde::Serialize;

/// A freshly cloned working copy and the head revision it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClonedRepository {
    pub name: String,
    pub local_path: PathBuf,
    pub head_commit_id: String,
    pub head_commit_message: String,
    /// Browsable URL derived from the `origin` remote.
    pub web_url: String,
}

impl ClonedRepository {
    /// First seven characters of the head commit id.
    pub fn short_commit_id(&self) -> &str {
        let end = self
            .head_commit_id
            .char_indices()
            .nth(7)
            .map_or(self.head_commit_id.len(), |(i, _)| i);
        &self.head_commit_id[..end]
    }
}

/// Translate a git remote URL into a browsable `https://` URL.
///
/// | remote | web |
/// |---|---|
/// | `git@host:owner/repo.git` | `https://host/owner/repo` |
/// | `ssh://git@host:22/owner/repo.git` | `https://host/owner/repo` |
/// | `https://user:pw@host/owner/repo.git` | `https://host/owner/repo` |
///
/// Anything else is returned unchanged.
///
/// # Examples
///
/// ```
/// use dockyard_core::repository::web_url_from_remote;
///
/// assert_eq!(
///     web_url_from_remote("git@github.com:acme/api.git"),
///     "https://github.com/acme/api"
/// );
/// ```
pub fn web_url_from_remote(remote: &str) -> String {
    let remote = remote.trim();

    if let Some(rest) = remote.strip_prefix("ssh://") {
        let rest = strip_userinfo(rest);
        if let Some((authority, path)) = rest.split_once('/') {
            let host = authority.split(':').next().unwrap_or(authority);
            if !host.is_empty() && !path.is_empty() {
                return format!("https://{host}/{}", strip_git_suffix(path));
            }
        }
        return remote.to_owned();
    }

    for scheme in ["https://", "http://"] {
        if let Some(rest) = remote.strip_prefix(scheme) {
            let rest = strip_userinfo(rest);
            return format!("{scheme}{}", strip_git_suffix(rest.trim_end_matches('/')));
        }
    }

    // scp-like syntax: [user@]host:path (no scheme)
    if !remote.contains("://")
        && let Some((authority, path)) = remote.split_once(':')
    {
        let host = strip_userinfo(authority);
        if authority.contains('@') && !host.is_empty() && !path.is_empty() {
            return format!(
                "https://{host}/{}",
                strip_git_suffix(path.trim_start_matches('/'))
            );
        }
    }

    remote.to_owned()
}

fn strip_userinfo(s: &str) -> &str {
    // userinfo only counts when it precedes the first path separator
    let authority_end = s.find('/').unwrap_or(s.len());
    match s[..authority_end].rfind('@') {
        Some(at) => &s[at + 1..],
        None => s,
    }
}

fn strip_git_suffix(path: &str) -> &str {
    path.strip_suffix(".git").unwrap_or(path)
}
