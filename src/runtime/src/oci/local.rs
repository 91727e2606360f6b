//! Registry-backed implementations of the replication collaborators.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use imgmigrate_core::error::{MigrateError, Result};
use imgmigrate_core::platform::PlatformDescriptor;

use super::archive;
use super::index::LocalIndexStore;
use super::reference::ImageReference;
use super::registry::RegistryAccess;
use super::store::{ImageStore, StoredImage};
use crate::replicate::{ArtifactSink, CatalogSource, ContentStore, Publisher};

/// Reads platform indexes straight from registries.
pub struct RegistryCatalog {
    access: Arc<RegistryAccess>,
}

impl RegistryCatalog {
    pub fn new(access: Arc<RegistryAccess>) -> Self {
        Self { access }
    }
}

#[async_trait]
impl CatalogSource for RegistryCatalog {
    async fn inspect(&self, reference: &str) -> Result<Vec<u8>> {
        let parsed = ImageReference::parse(reference)?;
        let index = self.access.puller(&parsed, None).inspect(&parsed).await?;
        Ok(serde_json::to_vec(&index)?)
    }
}

/// Content store over the on-disk [`ImageStore`], filled from registries.
pub struct LocalContentStore {
    images: Arc<ImageStore>,
    access: Arc<RegistryAccess>,
}

impl LocalContentStore {
    pub fn new(images: Arc<ImageStore>, access: Arc<RegistryAccess>) -> Self {
        Self { images, access }
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn fetch(&self, reference: &str, platform: Option<&PlatformDescriptor>) -> Result<()> {
        let parsed = ImageReference::parse(reference)?;

        // Staged inside the store so the final copy stays on one filesystem
        let staging = tempfile::Builder::new()
            .prefix(".pull-")
            .tempdir_in(self.images.store_dir())?;

        let digest = self
            .access
            .puller(&parsed, platform.cloned())
            .pull(&parsed, platform, staging.path())
            .await?;

        self.images
            .put(&parsed.full_reference(), &digest, platform.cloned(), staging.path())
            .await?;
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.images.tag(source, target).await.map(|_| ())
    }

    async fn resolve(&self, reference: &str) -> Result<bool> {
        Ok(self.images.get(reference).await.is_some())
    }

    async fn remove_tag(&self, reference: &str) -> Result<()> {
        if self.images.get(reference).await.is_none() {
            return Ok(());
        }
        self.images.remove(reference).await
    }
}

/// Pushes stored images to the registry named by their reference.
pub struct RegistryPublisher {
    images: Arc<ImageStore>,
    access: Arc<RegistryAccess>,
}

impl RegistryPublisher {
    pub fn new(images: Arc<ImageStore>, access: Arc<RegistryAccess>) -> Self {
        Self { images, access }
    }
}

#[async_trait]
impl Publisher for RegistryPublisher {
    async fn push(&self, reference: &str) -> Result<()> {
        let image = stored(&self.images, reference).await?;
        let parsed = ImageReference::parse(reference)?;
        self.access
            .pusher(&parsed)
            .push(&parsed, &image.path)
            .await
            .map(|_| ())
    }
}

/// Saves stored images and index drafts as tar archives.
pub struct ArchiveSink {
    images: Arc<ImageStore>,
    indexes: Arc<LocalIndexStore>,
}

impl ArchiveSink {
    pub fn new(images: Arc<ImageStore>, indexes: Arc<LocalIndexStore>) -> Self {
        Self { images, indexes }
    }
}

#[async_trait]
impl ArtifactSink for ArchiveSink {
    async fn save(&self, reference: &str, path: &Path, compress: bool) -> Result<u64> {
        let image = stored(&self.images, reference).await?;
        let size = archive::save_layout(&image.path, path, compress)?;
        tracing::info!(reference = %reference, path = %path.display(), size, "Saved image");
        Ok(size)
    }

    async fn save_index(&self, index: &str, path: &Path, compress: bool) -> Result<u64> {
        let draft = self.indexes.load(index)?;
        let member_dirs = self.indexes.member_dirs(&draft).await?;
        let size = archive::save_index_layout(&draft.document(), &member_dirs, path, compress)?;
        tracing::info!(reference = %index, path = %path.display(), size, "Saved image index");
        Ok(size)
    }
}

async fn stored(images: &ImageStore, reference: &str) -> Result<StoredImage> {
    images
        .get(reference)
        .await
        .ok_or_else(|| MigrateError::OciImageError(format!("Image not found: {}", reference)))
}
