//! Build contexts, certificate layers, and changelog output for dockyard.
//!
//! # Certificate injection
//!
//! ```text
//! dockyard deploy (entry flagged <name>_needs_certs=true)
//!   1. Discover   ── assets/certs/*.{crt,pem,cer} (non-recursive)
//!   2. Stage      ── .dockyard/cert-context/<name>/{Dockerfile,certs/}
//!   3. Render     ── FROM <tag>; COPY certs/ <cert_install_path>/; RUN <trust refresh>
//!   4. Rebuild    ── docker build -t <tag> (replaces the original tag)
//! ```
//!
//! The trust refresh probes `update-ca-certificates`, `update-ca-trust` and
//! `trust` in that order, so the same layer works on Debian, Alpine and
//! RHEL-family base images.

pub mod cert_layer;
pub mod certs;
pub mod changelog;

pub use cert_layer::CertLayerGenerator;
pub use certs::{CertError, CertificateBundle};
pub use changelog::{CHANGELOG_FILE, ChangelogError};
