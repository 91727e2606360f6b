//! Collaborator traits the replication pipeline drives.
//!
//! The pipeline only sequences calls; everything that touches a registry,
//! the local content store or the filesystem sits behind one of these traits.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use imgmigrate_core::config::RegistryConfig;
use imgmigrate_core::error::Result;
use imgmigrate_core::platform::PlatformDescriptor;

use crate::oci::{
    ArchiveSink, CredentialStore, ImageStore, LocalContentStore, LocalIndexStore, RegistryAccess,
    RegistryCatalog, RegistryPublisher,
};

/// Source of platform indexes.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Raw platform index document (OCI image index JSON) of a reference.
    async fn inspect(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Local content and tag namespace.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch `reference` into the local store, constrained to `platform` when given.
    async fn fetch(&self, reference: &str, platform: Option<&PlatformDescriptor>) -> Result<()>;

    /// Make `target` name the same content as `source`.
    async fn tag(&self, source: &str, target: &str) -> Result<()>;

    /// Whether `reference` currently resolves to local content.
    async fn resolve(&self, reference: &str) -> Result<bool>;

    /// Remove a local reference. Removing an absent reference succeeds.
    async fn remove_tag(&self, reference: &str) -> Result<()>;
}

/// Local multi-platform index drafts.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Create an index over local member references. Fails if one already exists.
    async fn create_index(&self, reference: &str, members: &[String]) -> Result<()>;

    /// Set the platform of one member entry.
    async fn annotate(
        &self,
        index: &str,
        member: &str,
        platform: &PlatformDescriptor,
    ) -> Result<()>;

    /// Remove an index. Removing an absent index succeeds.
    async fn remove_index(&self, reference: &str) -> Result<()>;

    /// Copy an index under another reference, replacing any index there.
    async fn tag_index(&self, source: &str, target: &str) -> Result<()>;

    /// Push an index to its registry, then purge the local draft.
    async fn publish_index(&self, reference: &str) -> Result<()>;

    /// Raw index document.
    async fn inspect_index(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Pushes local references to their registry.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn push(&self, reference: &str) -> Result<()>;
}

/// Writes local content to archives on disk.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Save one local reference. Returns bytes written.
    async fn save(&self, reference: &str, path: &Path, compress: bool) -> Result<u64>;

    /// Save an index draft with its members' content. Returns bytes written.
    async fn save_index(&self, index: &str, path: &Path, compress: bool) -> Result<u64>;
}

/// The full set of collaborators a pipeline runs against.
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn CatalogSource>,
    pub content: Arc<dyn ContentStore>,
    pub indexes: Arc<dyn IndexStore>,
    pub publisher: Arc<dyn Publisher>,
    pub sink: Arc<dyn ArtifactSink>,
}

impl Backends {
    /// Registry-backed collaborators over the stores in the workspace home.
    ///
    /// `registry` holds explicitly configured credentials and transport
    /// settings; other registries fall back to stored logins.
    pub fn local(registry: Option<RegistryConfig>) -> Result<Self> {
        Self::open(&crate::home::imgmigrate_home(), registry)
    }

    /// Registry-backed collaborators over the stores under `home`.
    pub fn open(home: &Path, registry: Option<RegistryConfig>) -> Result<Self> {
        let access = Arc::new(RegistryAccess::new(
            registry,
            CredentialStore::new(home.join("auth").join("credentials.json")),
        ));
        let images = Arc::new(ImageStore::new(&home.join("images"))?);
        let indexes = Arc::new(LocalIndexStore::new(
            home.join("manifests"),
            images.clone(),
            access.clone(),
        )?);

        Ok(Self {
            catalog: Arc::new(RegistryCatalog::new(access.clone())),
            content: Arc::new(LocalContentStore::new(images.clone(), access.clone())),
            indexes: indexes.clone(),
            publisher: Arc::new(RegistryPublisher::new(images.clone(), access)),
            sink: Arc::new(ArchiveSink::new(images, indexes)),
        })
    }
}
