//! Core types and configuration for dockyard.
//!
//! This crate defines the `key=value` deployment config ([`ResolvedConfig`]),
//! the persisted semantic version ([`VersionStore`]), the registry backends
//! ([`RegistryTarget`]), cloned working copy metadata ([`ClonedRepository`]),
//! and shared error types. Nothing here spawns a process; tool invocation
//! lives in `dockyard-ops`.

pub mod config;
pub mod error;
pub mod registry;
pub mod repository;
pub mod version;

pub use config::{
    ConfigDirective, DEFAULT_CERT_DIR, DEFAULT_CERT_INSTALL_PATH, DEFAULT_CONFIG_FILE,
    DEFAULT_DOCKERFILE, DEFAULT_WORKSPACE_DIR, EntrySource, EnvMap, RepositoryEntry, ResolvedConfig,
    parse_directive,
};
pub use error::{Error, Result};
pub use registry::{
    GitHubRegistry, LoginCredentials, QuayRegistry, Registry, RegistryKind, RegistryTarget,
};
pub use repository::{ClonedRepository, web_url_from_remote};
pub use version::{BumpKind, Component, SemanticVersion, VERSION_FILE, VersionStore};
