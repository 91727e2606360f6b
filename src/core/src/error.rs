use thiserror::Error;

/// Step of a single-platform replication that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationStep {
    /// Derived local reference collides with one already produced
    Name,
    /// Fetching the platform-specific content from the source
    Fetch,
    /// Applying the derived local tag
    Tag,
    /// Waiting for the local tag to resolve
    Verify,
    /// Saving the artifact to disk
    Persist,
    /// Pushing the artifact to its destination registry
    Publish,
}

impl std::fmt::Display for ReplicationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Name => "name",
            Self::Fetch => "fetch",
            Self::Tag => "tag",
            Self::Verify => "verify",
            Self::Persist => "persist",
            Self::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// imgmigrate error types
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Source platform index unavailable or unparsable
    #[error("Discovery failed for {reference}: {message}")]
    DiscoveryError { reference: String, message: String },

    /// Platform filter left nothing to replicate
    #[error("No matching platforms for {reference} (os: {operating_systems:?}, arch: {architectures:?})")]
    NoMatchError {
        reference: String,
        operating_systems: Vec<String>,
        architectures: Vec<String>,
    },

    /// One platform failed to replicate; the task carries on without it
    #[error("Replication of {reference} for {platform} failed at {step}: {message}")]
    ReplicationStepError {
        reference: String,
        platform: String,
        step: ReplicationStep,
        message: String,
    },

    /// Multi-platform index could not be created or published
    #[error("Index assembly failed for {reference}: {message}")]
    AssemblyError { reference: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// OCI image error
    #[error("OCI image error: {0}")]
    OciImageError(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    RegistryError { registry: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MigrateError {
    /// Whether this error aborts a whole task rather than a single platform.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ReplicationStepError { .. } | Self::AssemblyError { .. }
        )
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        MigrateError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for MigrateError {
    fn from(err: serde_yaml::Error) -> Self {
        MigrateError::SerializationError(err.to_string())
    }
}

/// Result type alias for imgmigrate operations
pub type Result<T> = std::result::Result<T, MigrateError>;
