//! git and docker operations for dockyard.
//!
//! Every external invocation goes through [`ToolExecutor`], so the clients
//! here ([`GitClient`], [`RepositorySet`], [`ImagePublisher`]) can be driven
//! by mocks in tests. Calls are awaited one after another; nothing in this
//! crate runs two tool invocations concurrently.

pub mod executor;
pub mod git;
pub mod publisher;
pub mod repository_set;
pub mod tags;
pub mod tool;

pub use executor::{RealExecutor, Tool, ToolExecutor};
pub use git::{GitClient, HeadCommit};
pub use publisher::{
    AUTH_ATTEMPTS, AUTH_BACKOFF, CertificateSettings, ImagePublisher, PublishError,
    PublishOutcome, PublishRequest,
};
pub use repository_set::{CloneError, RepositorySet};
pub use tags::ImageTagSet;
pub use tool::ToolError;
