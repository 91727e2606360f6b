//! Local drafts of multi-platform image indexes.
//!
//! Each draft is one JSON file under the manifests directory recording the
//! member references and the OCI index entry built for each of them. A draft
//! only becomes visible to anyone else once it is published.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use imgmigrate_core::error::{MigrateError, Result};
use imgmigrate_core::platform::PlatformDescriptor;
use serde::{Deserialize, Serialize};

use super::layout::{self, Descriptor, IndexDocument};
use super::reference::ImageReference;
use super::registry::RegistryAccess;
use super::store::ImageStore;
use crate::replicate::IndexStore;

/// One member of an index draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMember {
    /// Normalized local reference of the member image
    pub reference: String,
    /// Index entry for the member manifest
    pub descriptor: Descriptor,
}

/// An index draft as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIndex {
    pub reference: String,
    pub members: Vec<IndexMember>,
}

impl LocalIndex {
    /// The OCI image index document for this draft.
    pub fn document(&self) -> IndexDocument {
        IndexDocument::new(self.members.iter().map(|m| m.descriptor.clone()).collect())
    }
}

/// Disk-backed index draft store.
pub struct LocalIndexStore {
    dir: PathBuf,
    images: Arc<ImageStore>,
    access: Arc<RegistryAccess>,
}

impl LocalIndexStore {
    pub fn new(dir: PathBuf, images: Arc<ImageStore>, access: Arc<RegistryAccess>) -> Result<Self> {
        std::fs::create_dir_all(&dir).map_err(|e| {
            MigrateError::OciImageError(format!(
                "Failed to create manifest directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir, images, access })
    }

    /// Load a draft, failing if it does not exist.
    pub fn load(&self, reference: &str) -> Result<LocalIndex> {
        let path = self.draft_path(reference);
        let data = std::fs::read_to_string(&path).map_err(|e| {
            MigrateError::OciImageError(format!("No such image index {}: {}", reference, e))
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Member layout directories of a draft, in entry order.
    pub async fn member_dirs(&self, index: &LocalIndex) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::with_capacity(index.members.len());
        for member in &index.members {
            let image = self.images.get(&member.reference).await.ok_or_else(|| {
                MigrateError::OciImageError(format!("Image not found: {}", member.reference))
            })?;
            dirs.push(image.path);
        }
        Ok(dirs)
    }

    fn save(&self, index: &LocalIndex) -> Result<()> {
        let data = serde_json::to_string_pretty(index)?;
        std::fs::write(self.draft_path(&index.reference), data)?;
        Ok(())
    }

    fn draft_path(&self, reference: &str) -> PathBuf {
        draft_path(&self.dir, reference)
    }
}

fn draft_path(dir: &Path, reference: &str) -> PathBuf {
    let name: String = ImageStore::key(reference)
        .chars()
        .map(|c| match c {
            '/' | ':' | '@' => '_',
            c => c,
        })
        .collect();
    dir.join(format!("{}.json", name))
}

#[async_trait]
impl IndexStore for LocalIndexStore {
    async fn create_index(&self, reference: &str, members: &[String]) -> Result<()> {
        if self.draft_path(reference).exists() {
            return Err(MigrateError::OciImageError(format!(
                "Image index {} already exists",
                reference
            )));
        }

        let mut entries = Vec::with_capacity(members.len());
        for member in members {
            let image = self.images.get(member).await.ok_or_else(|| {
                MigrateError::OciImageError(format!("Image not found: {}", member))
            })?;
            let mut descriptor = layout::manifest_descriptor(&image.path)?;
            if descriptor.platform.is_none() {
                descriptor.platform = image.platform.clone();
            }
            entries.push(IndexMember {
                reference: image.reference,
                descriptor,
            });
        }

        self.save(&LocalIndex {
            reference: ImageStore::key(reference),
            members: entries,
        })?;

        tracing::debug!(reference = %reference, members = members.len(), "Created image index");
        Ok(())
    }

    async fn annotate(
        &self,
        index: &str,
        member: &str,
        platform: &PlatformDescriptor,
    ) -> Result<()> {
        let mut draft = self.load(index)?;
        let key = ImageStore::key(member);
        let entry = draft
            .members
            .iter_mut()
            .find(|m| m.reference == key)
            .ok_or_else(|| {
                MigrateError::OciImageError(format!("{} is not a member of {}", member, index))
            })?;
        entry.descriptor.platform = Some(platform.clone());
        self.save(&draft)
    }

    async fn remove_index(&self, reference: &str) -> Result<()> {
        let path = self.draft_path(reference);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    async fn tag_index(&self, source: &str, target: &str) -> Result<()> {
        let mut draft = self.load(source)?;
        draft.reference = ImageStore::key(target);
        self.save(&draft)
    }

    async fn publish_index(&self, reference: &str) -> Result<()> {
        let draft = self.load(reference)?;
        let parsed = ImageReference::parse(reference)?;

        self.access
            .pusher(&parsed)
            .push_index(&parsed, &draft.document())
            .await?;

        self.remove_index(reference).await
    }

    async fn inspect_index(&self, reference: &str) -> Result<Vec<u8>> {
        let draft = self.load(reference)?;
        Ok(serde_json::to_vec_pretty(&draft.document())?)
    }
}
