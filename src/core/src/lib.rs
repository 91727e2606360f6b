//! imgmigrate core - foundational types shared by the runtime and the CLI.
//!
//! Platform descriptors, replication tasks and results, the batch
//! configuration file format, and the error taxonomy.

pub mod config;
pub mod error;
pub mod platform;
pub mod task;

// Re-export commonly used types
pub use config::{BatchConfig, ImageTaskConfig, RegistryConfig};
pub use error::{MigrateError, ReplicationStep, Result};
pub use platform::PlatformDescriptor;
pub use task::{ReplicationResult, ReplicationTask, TaggedArtifact};

/// imgmigrate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
