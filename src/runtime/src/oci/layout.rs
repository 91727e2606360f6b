//! OCI image layout on disk.
//!
//! ```text
//! image/
//! ├── oci-layout           (layout marker)
//! ├── index.json           (image index)
//! └── blobs/sha256/<hex>   (manifests, configs, layers)
//! ```
//!
//! The same index document type describes a single pulled image (one manifest)
//! and an assembled multi-platform index (one manifest per platform).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use imgmigrate_core::error::{MigrateError, Result};
use imgmigrate_core::platform::PlatformDescriptor;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Contents of the `oci-layout` marker file.
pub const OCI_LAYOUT_MARKER: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

/// Media type of an OCI image index.
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// Media type of an OCI image manifest.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Annotation naming the reference a manifest entry was created from.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// Content descriptor, as found in `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// OCI image index document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

impl IndexDocument {
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(OCI_INDEX_MEDIA_TYPE.to_string()),
            manifests,
        }
    }
}

/// Compute the `sha256:<hex>` digest of some bytes.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Get the path to a blob by digest.
pub fn blob_path(root_dir: &Path, digest: &str) -> PathBuf {
    match digest.split_once(':') {
        Some((algorithm, hash)) => root_dir.join("blobs").join(algorithm).join(hash),
        None => root_dir.join("blobs").join("sha256").join(digest),
    }
}

/// Write a blob under its sha256 digest. Returns the digest.
pub fn write_blob(root_dir: &Path, data: &[u8]) -> Result<String> {
    let digest = sha256_digest(data);
    let path = blob_path(root_dir, &digest);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, data).map_err(|e| {
        MigrateError::OciImageError(format!("Failed to write blob {}: {}", digest, e))
    })?;
    Ok(digest)
}

/// Write the `oci-layout` marker and `index.json`.
pub fn write_layout(root_dir: &Path, index: &IndexDocument) -> Result<()> {
    std::fs::create_dir_all(root_dir.join("blobs").join("sha256"))?;
    std::fs::write(root_dir.join("oci-layout"), OCI_LAYOUT_MARKER)?;
    std::fs::write(
        root_dir.join("index.json"),
        serde_json::to_string_pretty(index)?,
    )?;
    Ok(())
}

/// Read `index.json` of a layout, checking the marker first.
pub fn read_index(root_dir: &Path) -> Result<IndexDocument> {
    if !root_dir.join("oci-layout").exists() {
        return Err(MigrateError::OciImageError(format!(
            "Not a valid OCI layout: missing oci-layout file in {}",
            root_dir.display()
        )));
    }

    let index_path = root_dir.join("index.json");
    let content = std::fs::read_to_string(&index_path).map_err(|e| {
        MigrateError::OciImageError(format!(
            "Failed to read index.json at {}: {}",
            index_path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        MigrateError::OciImageError(format!("Failed to parse index.json: {}", e))
    })
}

/// Descriptor of the image manifest of a single-image layout.
pub fn manifest_descriptor(root_dir: &Path) -> Result<Descriptor> {
    read_index(root_dir)?
        .manifests
        .into_iter()
        .next()
        .ok_or_else(|| {
            MigrateError::OciImageError(format!(
                "No manifest in index.json at {}",
                root_dir.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_digest() {
        assert_eq!(
            sha256_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_blob_path() {
        let root = Path::new("/img");
        assert_eq!(
            blob_path(root, "sha256:abc"),
            PathBuf::from("/img/blobs/sha256/abc")
        );
        assert_eq!(blob_path(root, "abc"), PathBuf::from("/img/blobs/sha256/abc"));
    }

    #[test]
    fn test_write_and_read_layout() {
        let dir = TempDir::new().unwrap();
        let digest = write_blob(dir.path(), br#"{"schemaVersion":2}"#).unwrap();
        let index = IndexDocument::new(vec![Descriptor {
            media_type: OCI_MANIFEST_MEDIA_TYPE.to_string(),
            digest: digest.clone(),
            size: 19,
            platform: Some(PlatformDescriptor::new("linux", "arm64")),
            annotations: BTreeMap::new(),
        }]);
        write_layout(dir.path(), &index).unwrap();

        assert!(blob_path(dir.path(), &digest).exists());
        assert_eq!(read_index(dir.path()).unwrap(), index);

        let manifest = manifest_descriptor(dir.path()).unwrap();
        assert_eq!(manifest.digest, digest);
        assert_eq!(manifest.platform.unwrap().architecture, "arm64");
    }

    #[test]
    fn test_read_index_requires_marker() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.json"), r#"{"schemaVersion":2}"#).unwrap();
        assert!(read_index(dir.path()).is_err());
    }

    #[test]
    fn test_manifest_descriptor_empty_index() {
        let dir = TempDir::new().unwrap();
        write_layout(dir.path(), &IndexDocument::new(Vec::new())).unwrap();
        assert!(manifest_descriptor(dir.path()).is_err());
    }

    #[test]
    fn test_index_document_serialization() {
        let json = serde_json::to_value(IndexDocument::new(Vec::new())).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["mediaType"], OCI_INDEX_MEDIA_TYPE);
    }
}
