//! Tar archives of OCI layouts.
//!
//! A saved image is its whole layout directory in a tar stream, gzip-wrapped
//! when compression is requested. A saved index is a fresh layout whose
//! `index.json` is the index document and whose blobs are the members' blobs.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use imgmigrate_core::error::{MigrateError, Result};
use tar::{Builder, Header};

use super::layout::{IndexDocument, OCI_LAYOUT_MARKER};

/// Archive file for a local reference: `/` becomes `-`, suffix `.tar` or `.tar.gz`.
pub fn archive_path(dir: &Path, local_ref: &str, compress: bool) -> PathBuf {
    let suffix = if compress { ".tar.gz" } else { ".tar" };
    dir.join(format!("{}{}", local_ref.replace('/', "-"), suffix))
}

/// Archive an OCI layout directory. Returns the archive size in bytes.
pub fn save_layout(layout_dir: &Path, out: &Path, compress: bool) -> Result<u64> {
    if !layout_dir.join("oci-layout").exists() {
        return Err(MigrateError::OciImageError(format!(
            "Not a valid OCI layout: {}",
            layout_dir.display()
        )));
    }

    write_archive(out, compress, |builder| {
        builder.append_dir_all(".", layout_dir)
    })
}

/// Archive an image index together with its members' blobs.
pub fn save_index_layout(
    index: &IndexDocument,
    member_dirs: &[PathBuf],
    out: &Path,
    compress: bool,
) -> Result<u64> {
    let index_json = serde_json::to_vec_pretty(index)?;

    write_archive(out, compress, |builder| {
        append_file(builder, "oci-layout", OCI_LAYOUT_MARKER.as_bytes())?;
        append_file(builder, "index.json", &index_json)?;

        let mut written = BTreeSet::new();
        for dir in member_dirs {
            let blobs_dir = dir.join("blobs").join("sha256");
            for entry in std::fs::read_dir(&blobs_dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if written.insert(name.clone()) {
                    builder.append_path_with_name(
                        entry.path(),
                        format!("blobs/sha256/{}", name),
                    )?;
                }
            }
        }
        Ok(())
    })
}

fn append_file(builder: &mut Builder<&mut dyn Write>, name: &str, data: &[u8]) -> std::io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data)
}

fn write_archive<F>(out: &Path, compress: bool, fill: F) -> Result<u64>
where
    F: FnOnce(&mut Builder<&mut dyn Write>) -> std::io::Result<()>,
{
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let to_error = |e: std::io::Error| {
        MigrateError::OciImageError(format!("Failed to write archive {}: {}", out.display(), e))
    };

    let mut file = File::create(out).map_err(to_error)?;
    if compress {
        let mut encoder = GzEncoder::new(file, Compression::default());
        {
            let mut builder = Builder::new(&mut encoder as &mut dyn Write);
            fill(&mut builder).map_err(to_error)?;
            builder.finish().map_err(to_error)?;
        }
        encoder.finish().map_err(to_error)?;
    } else {
        let mut builder = Builder::new(&mut file as &mut dyn Write);
        fill(&mut builder).map_err(to_error)?;
        builder.finish().map_err(to_error)?;
    }

    let size = std::fs::metadata(out)?.len();
    tracing::debug!(archive = %out.display(), size, compress, "Wrote archive");
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::layout::{write_blob, write_layout, Descriptor, OCI_MANIFEST_MEDIA_TYPE};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn entry_names<R: Read>(reader: R) -> Vec<String> {
        let mut archive = tar::Archive::new(reader);
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let path = e.path().unwrap().to_string_lossy().into_owned();
                path.trim_start_matches("./").to_string()
            })
            .filter(|p| !p.is_empty() && !p.ends_with('/'))
            .collect();
        names.sort();
        names
    }

    fn make_layout(dir: &Path, payload: &[u8]) -> String {
        let digest = write_blob(dir, payload).unwrap();
        write_layout(
            dir,
            &IndexDocument::new(vec![Descriptor {
                media_type: OCI_MANIFEST_MEDIA_TYPE.to_string(),
                digest: digest.clone(),
                size: payload.len() as u64,
                platform: None,
                annotations: Default::default(),
            }]),
        )
        .unwrap();
        digest
    }

    #[test]
    fn test_archive_path() {
        let dir = Path::new("/out");
        assert_eq!(
            archive_path(dir, "ghcr.io/org/app:1.0-linux-amd64", false),
            PathBuf::from("/out/ghcr.io-org-app:1.0-linux-amd64.tar")
        );
        assert_eq!(
            archive_path(dir, "nginx:latest-linux-arm-v7", true),
            PathBuf::from("/out/nginx:latest-linux-arm-v7.tar.gz")
        );
    }

    #[test]
    fn test_save_layout_plain() {
        let tmp = TempDir::new().unwrap();
        let layout_dir = tmp.path().join("layout");
        let digest = make_layout(&layout_dir, b"manifest");
        let out = tmp.path().join("out").join("image.tar");

        let size = save_layout(&layout_dir, &out, false).unwrap();
        assert!(size > 0);

        let names = entry_names(File::open(&out).unwrap());
        assert!(names.contains(&"oci-layout".to_string()));
        assert!(names.contains(&"index.json".to_string()));
        let hex = digest.trim_start_matches("sha256:");
        assert!(names.contains(&format!("blobs/sha256/{}", hex)));
    }

    #[test]
    fn test_save_layout_compressed() {
        let tmp = TempDir::new().unwrap();
        let layout_dir = tmp.path().join("layout");
        make_layout(&layout_dir, b"manifest");
        let out = tmp.path().join("image.tar.gz");

        save_layout(&layout_dir, &out, true).unwrap();

        let names = entry_names(GzDecoder::new(File::open(&out).unwrap()));
        assert!(names.contains(&"index.json".to_string()));
    }

    #[test]
    fn test_save_layout_rejects_non_layout() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("x.tar");
        assert!(save_layout(tmp.path(), &out, false).is_err());
    }

    #[test]
    fn test_save_index_layout_merges_member_blobs() {
        let tmp = TempDir::new().unwrap();
        let amd = tmp.path().join("amd64");
        let arm = tmp.path().join("arm64");
        let amd_digest = make_layout(&amd, b"amd64 manifest");
        let arm_digest = make_layout(&arm, b"arm64 manifest");
        // shared blob
        write_blob(&amd, b"shared layer").unwrap();
        write_blob(&arm, b"shared layer").unwrap();

        let index = IndexDocument::new(Vec::new());
        let out = tmp.path().join("index.tar.gz");
        save_index_layout(&index, &[amd, arm], &out, true).unwrap();

        let names = entry_names(GzDecoder::new(File::open(&out).unwrap()));
        assert_eq!(names.len(), 5);
        assert!(names.contains(&format!("blobs/sha256/{}", amd_digest.trim_start_matches("sha256:"))));
        assert!(names.contains(&format!("blobs/sha256/{}", arm_digest.trim_start_matches("sha256:"))));
        assert!(names.contains(&"oci-layout".to_string()));
    }
}
