//! imgmigrate runtime: registry access, local image stores and the
//! replication pipeline.

#![allow(clippy::result_large_err)]

pub mod home;
pub mod oci;
pub mod replicate;

// Re-export common types
pub use oci::{CredentialStore, ImageReference, ImageStore, RegistryAccess, RegistryAuth, StoredImage};
pub use replicate::{
    Backends, BatchReport, PlatformSelector, ReplicationOrchestrator, SettlePolicy, TaskReport,
};

/// imgmigrate runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
