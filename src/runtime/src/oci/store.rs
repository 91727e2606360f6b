//! Disk-based local content store.
//!
//! Pulled images are kept as OCI image layouts under `sha256/<manifest digest>/`.
//! An in-memory reference index, persisted as `index.json`, maps every local
//! reference (pulled or tagged) to its layout. Tagging adds a reference to an
//! existing layout; removing the last reference deletes the layout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use imgmigrate_core::error::{MigrateError, Result};
use imgmigrate_core::platform::PlatformDescriptor;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::reference::ImageReference;

/// Metadata for a stored image reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    /// Normalized reference (e.g., "docker.io/library/nginx:1.25-linux-arm64")
    pub reference: String,
    /// Manifest digest of the stored layout
    pub digest: String,
    /// Platform the content was fetched for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformDescriptor>,
    /// Total size in bytes
    pub size_bytes: u64,
    /// When the reference was created
    pub created_at: DateTime<Utc>,
    /// Path to the OCI image layout on disk
    pub path: PathBuf,
}

/// Persistent index stored as JSON on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    images: Vec<StoredImage>,
}

/// Disk-based image store with an in-memory reference index.
pub struct ImageStore {
    /// Root directory for image storage
    store_dir: PathBuf,
    /// In-memory index: normalized reference → StoredImage
    index: Arc<RwLock<HashMap<String, StoredImage>>>,
}

impl ImageStore {
    /// Open a store, creating the directory and loading any existing index.
    pub fn new(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir).map_err(|e| {
            MigrateError::OciImageError(format!(
                "Failed to create image store directory {}: {}",
                store_dir.display(),
                e
            ))
        })?;

        let index = Self::load_index(store_dir)?;
        Ok(Self {
            store_dir: store_dir.to_path_buf(),
            index: Arc::new(RwLock::new(index)),
        })
    }

    /// Normalize a reference into its index key.
    pub fn key(reference: &str) -> String {
        ImageReference::parse(reference)
            .map(|r| r.full_reference())
            .unwrap_or_else(|_| reference.trim().to_string())
    }

    /// Get a stored image by reference.
    pub async fn get(&self, reference: &str) -> Option<StoredImage> {
        self.index.read().await.get(&Self::key(reference)).cloned()
    }

    /// Store a layout from `source_dir` under `reference`.
    ///
    /// The layout is copied into `sha256/<digest>/` unless that directory already
    /// exists. Any previous entry for the reference is replaced.
    pub async fn put(
        &self,
        reference: &str,
        digest: &str,
        platform: Option<PlatformDescriptor>,
        source_dir: &Path,
    ) -> Result<StoredImage> {
        let digest_hex = digest.strip_prefix("sha256:").unwrap_or(digest);
        let target_dir = self.store_dir.join("sha256").join(digest_hex);

        if !target_dir.exists() {
            copy_dir_recursive(source_dir, &target_dir).map_err(|e| {
                MigrateError::OciImageError(format!("Failed to copy image to store: {}", e))
            })?;
        }

        let stored = StoredImage {
            reference: Self::key(reference),
            digest: digest.to_string(),
            platform,
            size_bytes: dir_size(&target_dir),
            created_at: Utc::now(),
            path: target_dir,
        };

        self.index
            .write()
            .await
            .insert(stored.reference.clone(), stored.clone());
        self.save_index().await?;

        Ok(stored)
    }

    /// Point `target` at the content of `source`. No data is copied.
    pub async fn tag(&self, source: &str, target: &str) -> Result<StoredImage> {
        let source_image = self.get(source).await.ok_or_else(|| {
            MigrateError::OciImageError(format!("Image not found: {}", source))
        })?;

        let tagged = StoredImage {
            reference: Self::key(target),
            created_at: Utc::now(),
            ..source_image
        };

        self.index
            .write()
            .await
            .insert(tagged.reference.clone(), tagged.clone());
        self.save_index().await?;

        tracing::debug!(source = %source, target = %tagged.reference, "Tagged image");
        Ok(tagged)
    }

    /// Remove a reference. The layout is deleted once no reference points at it.
    pub async fn remove(&self, reference: &str) -> Result<()> {
        let key = Self::key(reference);
        let mut index = self.index.write().await;
        let Some(image) = index.remove(&key) else {
            return Err(MigrateError::OciImageError(format!(
                "Image not found: {}",
                reference
            )));
        };
        let digest_still_used = index.values().any(|img| img.digest == image.digest);
        drop(index);

        if !digest_still_used && image.path.exists() {
            std::fs::remove_dir_all(&image.path).map_err(|e| {
                MigrateError::OciImageError(format!(
                    "Failed to remove image directory {}: {}",
                    image.path.display(),
                    e
                ))
            })?;
        }

        self.save_index().await
    }

    /// List all stored references.
    pub async fn list(&self) -> Vec<StoredImage> {
        let mut images: Vec<StoredImage> = self.index.read().await.values().cloned().collect();
        images.sort_by(|a, b| a.reference.cmp(&b.reference));
        images
    }

    /// Get the store directory path.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn load_index(store_dir: &Path) -> Result<HashMap<String, StoredImage>> {
        let index_path = store_dir.join("index.json");
        if !index_path.exists() {
            return Ok(HashMap::new());
        }

        let data = std::fs::read_to_string(&index_path).map_err(|e| {
            MigrateError::OciImageError(format!(
                "Failed to read image store index {}: {}",
                index_path.display(),
                e
            ))
        })?;
        let store_index: StoreIndex = serde_json::from_str(&data).map_err(|e| {
            MigrateError::OciImageError(format!("Failed to parse image store index: {}", e))
        })?;

        // Drop entries whose layout vanished from disk
        Ok(store_index
            .images
            .into_iter()
            .filter(|image| image.path.exists())
            .map(|image| (image.reference.clone(), image))
            .collect())
    }

    async fn save_index(&self) -> Result<()> {
        let store_index = StoreIndex {
            images: self.list().await,
        };
        let data = serde_json::to_string_pretty(&store_index)?;
        let index_path = self.store_dir.join("index.json");

        tokio::fs::write(&index_path, data).await.map_err(|e| {
            MigrateError::OciImageError(format!(
                "Failed to write image store index {}: {}",
                index_path.display(),
                e
            ))
        })
    }
}

/// Recursively copy a directory.
fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Calculate total size of a directory recursively.
fn dir_size(path: &Path) -> u64 {
    let mut total = 0;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                total += dir_size(&path);
            } else if let Ok(meta) = path.metadata() {
                total += meta.len();
            }
        }
    }
    total
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn create_test_oci_layout(dir: &Path) {
        std::fs::create_dir_all(dir.join("blobs/sha256")).unwrap();
        std::fs::write(dir.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
        std::fs::write(dir.join("index.json"), r#"{"schemaVersion":2,"manifests":[]}"#).unwrap();
        std::fs::write(dir.join("blobs/sha256/testblob"), "x".repeat(1024)).unwrap();
    }

    #[tokio::test]
    async fn test_new_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let store_dir = tmp.path().join("images");
        let store = ImageStore::new(&store_dir).unwrap();
        assert!(store_dir.exists());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_put_and_get_normalizes_reference() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);
        let store = ImageStore::new(&tmp.path().join("store")).unwrap();

        let stored = store
            .put(
                "nginx:1.25",
                "sha256:abc123",
                Some(PlatformDescriptor::new("linux", "amd64")),
                &source_dir,
            )
            .await
            .unwrap();

        assert_eq!(stored.reference, "docker.io/library/nginx:1.25");
        assert!(stored.size_bytes > 0);
        assert!(stored.path.exists());

        let fetched = store.get("docker.io/library/nginx:1.25").await.unwrap();
        assert_eq!(fetched.digest, "sha256:abc123");
        assert_eq!(fetched.platform, Some(PlatformDescriptor::new("linux", "amd64")));
    }

    #[tokio::test]
    async fn test_put_replaces_previous_platform() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);
        let store = ImageStore::new(&tmp.path().join("store")).unwrap();

        store
            .put("nginx", "sha256:aaa", Some(PlatformDescriptor::new("linux", "amd64")), &source_dir)
            .await
            .unwrap();
        store
            .put("nginx", "sha256:bbb", Some(PlatformDescriptor::new("linux", "arm64")), &source_dir)
            .await
            .unwrap();

        let current = store.get("nginx").await.unwrap();
        assert_eq!(current.digest, "sha256:bbb");
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_tag_shares_layout() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);
        let store = ImageStore::new(&tmp.path().join("store")).unwrap();

        let original = store
            .put("nginx:1.25", "sha256:abc", None, &source_dir)
            .await
            .unwrap();
        let tagged = store.tag("nginx:1.25", "nginx:1.25-linux-amd64").await.unwrap();

        assert_eq!(tagged.path, original.path);
        assert_eq!(tagged.digest, original.digest);
        assert_eq!(store.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_tag_missing_source() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path()).unwrap();
        assert!(store.tag("missing:v1", "other:v1").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_keeps_shared_layout() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);
        let store = ImageStore::new(&tmp.path().join("store")).unwrap();

        let stored = store.put("nginx", "sha256:abc", None, &source_dir).await.unwrap();
        store.tag("nginx", "nginx:copy").await.unwrap();

        store.remove("nginx").await.unwrap();
        assert!(stored.path.exists());

        store.remove("nginx:copy").await.unwrap();
        assert!(!stored.path.exists());
    }

    #[tokio::test]
    async fn test_remove_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path()).unwrap();
        assert!(store.remove("nonexistent").await.is_err());
    }

    #[tokio::test]
    async fn test_index_persistence() {
        let tmp = TempDir::new().unwrap();
        let store_dir = tmp.path().join("store");
        let source_dir = tmp.path().join("source");
        create_test_oci_layout(&source_dir);

        {
            let store = ImageStore::new(&store_dir).unwrap();
            store
                .put("nginx:latest", "sha256:persist", None, &source_dir)
                .await
                .unwrap();
            store.tag("nginx:latest", "nginx:latest-linux-amd64").await.unwrap();
        }

        let store = ImageStore::new(&store_dir).unwrap();
        let image = store.get("nginx:latest-linux-amd64").await.unwrap();
        assert_eq!(image.digest, "sha256:persist");
    }
}
