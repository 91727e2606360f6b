//! Replication of one platform of a source image.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use imgmigrate_core::error::{MigrateError, ReplicationStep, Result};
use imgmigrate_core::platform::PlatformDescriptor;
use imgmigrate_core::task::TaggedArtifact;

use super::backend::{ArtifactSink, Backends, ContentStore, Publisher};
use super::naming::NamingScheme;
use crate::oci::archive::archive_path;

/// How long to wait for a fresh local tag to become resolvable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Number of resolve checks, at least one
    pub attempts: u32,
    /// Pause between checks
    pub interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_millis(200),
        }
    }
}

impl SettlePolicy {
    /// A single check with no waiting.
    pub fn immediate() -> Self {
        Self {
            attempts: 1,
            interval: Duration::ZERO,
        }
    }
}

/// Where a replicated platform goes after it has been tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Save to an archive under `dir`
    Persist { dir: PathBuf, compress: bool },
    /// Push to the registry named by the local reference
    Publish,
}

/// A successfully replicated platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replicated {
    pub artifact: TaggedArtifact,
    /// Archive written for [`Destination::Persist`]
    pub saved: Option<PathBuf>,
}

/// Runs fetch, tag, verify, then persist or publish for one platform.
pub struct ArtifactReplicator {
    content: Arc<dyn ContentStore>,
    publisher: Arc<dyn Publisher>,
    sink: Arc<dyn ArtifactSink>,
    settle: SettlePolicy,
}

impl ArtifactReplicator {
    pub fn new(backends: &Backends, settle: SettlePolicy) -> Self {
        Self {
            content: backends.content.clone(),
            publisher: backends.publisher.clone(),
            sink: backends.sink.clone(),
            settle,
        }
    }

    /// Replicate `platform` of `source` under `naming`.
    ///
    /// Every failure is a [`MigrateError::ReplicationStepError`] naming the step.
    pub async fn replicate(
        &self,
        source: &str,
        platform: &PlatformDescriptor,
        naming: &NamingScheme,
        destination: &Destination,
    ) -> Result<Replicated> {
        let fail = |step: ReplicationStep, err: MigrateError| MigrateError::ReplicationStepError {
            reference: source.to_string(),
            platform: platform.constraint(),
            step,
            message: err.to_string(),
        };

        tracing::info!(reference = %source, platform = %platform, "Fetching platform");
        self.content
            .fetch(source, Some(platform))
            .await
            .map_err(|e| fail(ReplicationStep::Fetch, e))?;

        let local_ref = naming.local_ref(platform);
        self.content
            .tag(source, &local_ref)
            .await
            .map_err(|e| fail(ReplicationStep::Tag, e))?;

        match self.finish(&local_ref, destination).await {
            Ok(saved) => {
                tracing::info!(
                    reference = %source,
                    platform = %platform,
                    local_ref = %local_ref,
                    "Replicated platform"
                );
                Ok(Replicated {
                    artifact: TaggedArtifact::new(platform.clone(), local_ref),
                    saved,
                })
            }
            Err((step, e)) => {
                // A half-replicated platform must not stay tagged
                if let Err(cleanup) = self.content.remove_tag(&local_ref).await {
                    tracing::debug!(local_ref = %local_ref, error = %cleanup, "Could not remove local tag");
                }
                Err(fail(step, e))
            }
        }
    }

    /// Verify `local_ref`, then send it to `destination`.
    async fn finish(
        &self,
        local_ref: &str,
        destination: &Destination,
    ) -> std::result::Result<Option<PathBuf>, (ReplicationStep, MigrateError)> {
        let settled = self
            .settle(local_ref)
            .await
            .map_err(|e| (ReplicationStep::Verify, e))?;
        if !settled {
            return Err((
                ReplicationStep::Verify,
                MigrateError::Other(format!(
                    "{} did not resolve after {} checks",
                    local_ref,
                    self.settle.attempts.max(1)
                )),
            ));
        }

        match destination {
            Destination::Persist { dir, compress } => {
                let path = archive_path(dir, local_ref, *compress);
                self.sink
                    .save(local_ref, &path, *compress)
                    .await
                    .map_err(|e| (ReplicationStep::Persist, e))?;
                Ok(Some(path))
            }
            Destination::Publish => {
                self.publisher
                    .push(local_ref)
                    .await
                    .map_err(|e| (ReplicationStep::Publish, e))?;
                Ok(None)
            }
        }
    }

    /// Poll until `reference` resolves or the policy runs out.
    pub async fn settle(&self, reference: &str) -> Result<bool> {
        let attempts = self.settle.attempts.max(1);
        for attempt in 1..=attempts {
            if self.content.resolve(reference).await? {
                return Ok(true);
            }
            tracing::debug!(reference = %reference, attempt, "Local reference not resolvable yet");
            if attempt < attempts && !self.settle.interval.is_zero() {
                tokio::time::sleep(self.settle.interval).await;
            }
        }
        Ok(false)
    }
}
