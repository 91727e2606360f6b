//! Discovery of the platforms a source image is published for.

use std::sync::Arc;

use imgmigrate_core::error::{MigrateError, Result};
use imgmigrate_core::platform::PlatformDescriptor;
use serde::Deserialize;

use super::backend::{CatalogSource, ContentStore};

/// Only the parts of an index document discovery looks at.
#[derive(Debug, Deserialize)]
struct RawIndex {
    #[serde(default)]
    manifests: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    platform: Option<PlatformDescriptor>,
}

/// Lists the platform variants of a source reference.
pub struct PlatformCatalog {
    source: Arc<dyn CatalogSource>,
    content: Arc<dyn ContentStore>,
}

impl PlatformCatalog {
    pub fn new(source: Arc<dyn CatalogSource>, content: Arc<dyn ContentStore>) -> Self {
        Self { source, content }
    }

    /// Platforms of `reference`, in the order the source lists them.
    ///
    /// A digest reference whose index cannot be read is fetched once and
    /// inspected a second time. Tag references are not retried.
    pub async fn discover(&self, reference: &str) -> Result<Vec<PlatformDescriptor>> {
        let raw = match self.source.inspect(reference).await {
            Ok(raw) => raw,
            Err(e) if reference.contains('@') => {
                tracing::warn!(
                    reference = %reference,
                    error = %e,
                    "Inspect failed for digest reference, fetching and retrying"
                );
                if let Err(fetch_err) = self.content.fetch(reference, None).await {
                    tracing::debug!(reference = %reference, error = %fetch_err, "Pre-fetch failed");
                }
                self.source
                    .inspect(reference)
                    .await
                    .map_err(|e| discovery_error(reference, e))?
            }
            Err(e) => return Err(discovery_error(reference, e)),
        };

        let platforms = parse_platforms(&raw).map_err(|e| discovery_error(reference, e))?;
        if platforms.is_empty() {
            return Err(MigrateError::DiscoveryError {
                reference: reference.to_string(),
                message: "platform index lists no platforms".to_string(),
            });
        }

        tracing::info!(
            reference = %reference,
            platforms = %platforms.iter().map(|p| p.constraint()).collect::<Vec<_>>().join(","),
            "Discovered platforms"
        );
        Ok(platforms)
    }
}

/// Platform descriptors of a raw index document. Entries without a platform are skipped.
pub fn parse_platforms(raw: &[u8]) -> Result<Vec<PlatformDescriptor>> {
    let index: RawIndex = serde_json::from_slice(raw)?;
    Ok(index
        .manifests
        .into_iter()
        .filter_map(|entry| entry.platform)
        .collect())
}

fn discovery_error(reference: &str, err: MigrateError) -> MigrateError {
    match err {
        MigrateError::DiscoveryError { .. } => err,
        other => MigrateError::DiscoveryError {
            reference: reference.to_string(),
            message: other.to_string(),
        },
    }
}
