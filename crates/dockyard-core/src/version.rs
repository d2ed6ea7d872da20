//! Persisted three-component semantic version.
//!
//! The version file holds a single `MAJOR.MINOR.PATCH` line. Parsing is
//! lossy-tolerant: a corrupted file never aborts a deployment, it is
//! normalized instead (see [`SemanticVersion::parse_lenient`]).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

/// File name of the persisted version state.
pub const VERSION_FILE: &str = "version.txt";

/// A `major.minor.patch` version.
///
/// # Examples
///
/// ```
/// use dockyard_core::{BumpKind, SemanticVersion};
///
/// let v = SemanticVersion::new(1, 4, 2);
/// assert_eq!(v.bump(BumpKind::Minor)?.to_string(), "1.5.0");
/// # Ok::<(), dockyard_core::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// Which version component a deployment run increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    #[default]
    Patch,
    Minor,
    Major,
}

/// A single component of a [`SemanticVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Major,
    Minor,
    Patch,
}

impl Component {
    fn name(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
        }
    }

    /// Value substituted when the component is missing or not numeric.
    ///
    /// Major falls back to `1`, not `0`, to match version files written by
    /// earlier deployments.
    fn fallback(self) -> u64 {
        match self {
            Self::Major => 1,
            Self::Minor | Self::Patch => 0,
        }
    }
}

impl SemanticVersion {
    /// Version written when no persisted state exists.
    pub const INITIAL: Self = Self::new(1, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `MAJOR.MINOR.PATCH`, replacing bad components with defaults.
    ///
    /// Returns the normalized version together with the components that were
    /// defaulted. Every defaulted component is also logged as a warning.
    /// Components past the third are ignored.
    pub fn parse_lenient(input: &str) -> (Self, Vec<Component>) {
        let mut parts = input.trim().split('.');
        let mut defaulted = Vec::new();

        let mut component = |which: Component, raw: Option<&str>| -> u64 {
            match raw.map(str::trim).map(str::parse::<u64>) {
                Some(Ok(value)) => value,
                other => {
                    let fallback = which.fallback();
                    tracing::warn!(
                        component = which.name(),
                        raw = ?raw,
                        fallback,
                        missing = other.is_none(),
                        "invalid version component; using default"
                    );
                    defaulted.push(which);
                    fallback
                }
            }
        };

        let major = component(Component::Major, parts.next());
        let minor = component(Component::Minor, parts.next());
        let patch = component(Component::Patch, parts.next());

        if parts.next().is_some() {
            tracing::warn!(input, "version has more than three components; extra ignored");
        }

        (Self::new(major, minor, patch), defaulted)
    }

    /// Apply one bump. Pure: the receiver is not modified.
    ///
    /// Fails with [`crate::Error::VersionOverflow`] when the bumped component
    /// is already `u64::MAX`.
    pub fn bump(self, kind: BumpKind) -> crate::Result<Self> {
        let overflow = |component: Component| crate::Error::VersionOverflow {
            version: self.to_string(),
            component: component.name(),
        };
        match kind {
            BumpKind::Major => self
                .major
                .checked_add(1)
                .map(|major| Self::new(major, 0, 0))
                .ok_or_else(|| overflow(Component::Major)),
            BumpKind::Minor => self
                .minor
                .checked_add(1)
                .map(|minor| Self::new(self.major, minor, 0))
                .ok_or_else(|| overflow(Component::Minor)),
            BumpKind::Patch => self
                .patch
                .checked_add(1)
                .map(|patch| Self::new(self.major, self.minor, patch))
                .ok_or_else(|| overflow(Component::Patch)),
        }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        })
    }
}

impl FromStr for BumpKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patch" => Ok(Self::Patch),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            other => Err(crate::Error::InvalidBumpKind(other.to_owned())),
        }
    }
}

/// Single source of truth for the deployed version.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by [`VERSION_FILE`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(VERSION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted version without creating anything.
    ///
    /// Returns `None` when the file does not exist.
    pub fn peek(&self) -> crate::Result<Option<SemanticVersion>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(SemanticVersion::parse_lenient(&content).0)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(crate::Error::VersionRead {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Read the persisted version, creating the file with
    /// [`SemanticVersion::INITIAL`] if it is absent.
    pub fn read(&self) -> crate::Result<SemanticVersion> {
        match self.peek()? {
            Some(version) => Ok(version),
            None => {
                tracing::info!(path = %self.path.display(), "version file missing; initializing");
                self.write(SemanticVersion::INITIAL)?;
                Ok(SemanticVersion::INITIAL)
            }
        }
    }

    /// Overwrite the persisted version.
    ///
    /// Writes to a sibling temp file and renames it over the target so a
    /// crash never leaves a half-written version behind.
    pub fn write(&self, version: SemanticVersion) -> crate::Result<()> {
        let write_err = |e| crate::Error::VersionWrite {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let tmp = self.path.with_extension("txt.tmp");
        std::fs::write(&tmp, format!("{version}\n")).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;

        tracing::debug!(path = %self.path.display(), %version, "version persisted");
        Ok(())
    }
}
