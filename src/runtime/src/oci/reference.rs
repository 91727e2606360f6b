//! OCI image reference parsing.
//!
//! Parses image references like `registry.example.com/org/app:v1` into structured
//! components, and splits user-facing names into base and tag for local naming.

use imgmigrate_core::error::{MigrateError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
pub const DEFAULT_TAG: &str = "latest";

/// Parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/app")
    pub repository: String,
    /// Tag (e.g., "latest", "v0.1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `myuser/myimage` → docker.io/myuser/myimage:latest
    /// - `ghcr.io/org/image:tag` → ghcr.io/org/image:tag
    /// - `ghcr.io/org/image@sha256:abc...` → ghcr.io/org/image@sha256:abc...
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(MigrateError::OciImageError(
                "Empty image reference".to_string(),
            ));
        }

        let (name_tag, digest) = split_digest(reference)?;
        let (name, tag) = split_tag(name_tag);
        let (registry, repository) = Self::split_registry_repository(name)?;

        // Apply default tag if no tag and no digest
        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag.map(str::to_string),
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Split a name into registry and repository components.
    fn split_registry_repository(name: &str) -> Result<(String, String)> {
        // The first component is a registry if it looks like a hostname
        if let Some(slash_pos) = name.find('/') {
            let first = &name[..slash_pos];
            if first.contains('.') || first.contains(':') || first == "localhost" {
                let registry = first.to_string();
                let repo = name[slash_pos + 1..].to_string();
                if repo.is_empty() {
                    return Err(MigrateError::OciImageError(format!(
                        "Empty repository in reference '{}'",
                        name
                    )));
                }
                return Ok((registry, repo));
            }
        }

        let repository = if name.contains('/') {
            name.to_string()
        } else {
            // Single name like "nginx" → "library/nginx" for Docker Hub
            format!("library/{}", name)
        };

        Ok((DEFAULT_REGISTRY.to_string(), repository))
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Split a reference as the user wrote it into `(base name, tag)`.
///
/// No registry or `library/` normalization is applied, so derived local names keep
/// the user's spelling. Digests are dropped and a missing tag becomes `latest`.
pub fn split_name_tag(reference: &str) -> (String, String) {
    let reference = reference.trim();
    let name_tag = reference
        .rfind('@')
        .map_or(reference, |at_pos| &reference[..at_pos]);
    let (name, tag) = split_tag(name_tag);
    (
        name.to_string(),
        tag.filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TAG)
            .to_string(),
    )
}

/// Whether a reference names a remote location (contains a path separator).
pub fn is_qualified(reference: &str) -> bool {
    reference.contains('/')
}

/// Split off `@algorithm:hex`.
fn split_digest(reference: &str) -> Result<(&str, Option<String>)> {
    match reference.rfind('@') {
        Some(at_pos) => {
            let digest_part = &reference[at_pos + 1..];
            if !digest_part.contains(':') {
                return Err(MigrateError::OciImageError(format!(
                    "Invalid digest format in reference '{}': expected algorithm:hex",
                    reference
                )));
            }
            Ok((&reference[..at_pos], Some(digest_part.to_string())))
        }
        None => Ok((reference, None)),
    }
}

/// Split `name[:tag]`, only looking for the tag after the last `/`.
///
/// Without a `/`, a purely numeric suffix is a registry port, not a tag.
fn split_tag(name_tag: &str) -> (&str, Option<&str>) {
    match name_tag.rfind('/') {
        Some(slash_pos) => {
            let after_slash = &name_tag[slash_pos + 1..];
            match after_slash.rfind(':') {
                Some(colon_pos) => (
                    &name_tag[..slash_pos + 1 + colon_pos],
                    Some(&after_slash[colon_pos + 1..]),
                ),
                None => (name_tag, None),
            }
        }
        None => match name_tag.rfind(':') {
            Some(colon_pos) => {
                let after_colon = &name_tag[colon_pos + 1..];
                if !after_colon.is_empty() && after_colon.chars().all(|c| c.is_ascii_digit()) {
                    (name_tag, None)
                } else {
                    (&name_tag[..colon_pos], Some(after_colon))
                }
            }
            None => (name_tag, None),
        },
    }
}
