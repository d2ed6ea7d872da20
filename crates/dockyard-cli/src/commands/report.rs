use std::fmt;

use serde::Serialize;

/// How a deploy run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployMode {
    /// Images pushed; version, changelog and release tag persisted.
    Commit,
    /// Images built locally; nothing pushed or persisted.
    DryRun,
}

/// Summary of one deploy run, printed in both modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub version: String,
    pub previous_version: String,
    pub mode: DeployMode,
    /// `false` when the persisted version was already current.
    pub persisted: bool,
    pub entries: Vec<EntryReport>,
    /// Human-readable progress, in order.
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub name: String,
    pub commit_id: String,
    pub commit_message: String,
    pub web_url: String,
    /// Tags pushed, or in a dry run the tags that would be pushed.
    pub tags: Vec<String>,
    pub certificates_injected: bool,
}

impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            DeployMode::Commit => writeln!(
                f,
                "Deployed v{} (previous v{})",
                self.version, self.previous_version
            )?,
            DeployMode::DryRun => writeln!(
                f,
                "Dry run for v{} (current v{}); nothing pushed or persisted",
                self.version, self.previous_version
            )?,
        }

        for entry in &self.entries {
            writeln!(f)?;
            let short = entry.commit_id.get(..7).unwrap_or(&entry.commit_id);
            writeln!(f, "{} @ {short}  {}", entry.name, entry.commit_message)?;
            writeln!(f, "  source: {}", entry.web_url)?;
            if entry.certificates_injected {
                writeln!(f, "  certificates: injected")?;
            }
            let verb = match self.mode {
                DeployMode::Commit => "pushed",
                DeployMode::DryRun => "would push",
            };
            for tag in &entry.tags {
                writeln!(f, "  {verb}: {tag}")?;
            }
        }
        Ok(())
    }
}
