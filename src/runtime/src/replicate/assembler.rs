//! Assembly of per-platform references into one multi-platform index.

use std::path::PathBuf;
use std::sync::Arc;

use imgmigrate_core::error::MigrateError;
use imgmigrate_core::task::TaggedArtifact;

use super::backend::{ArtifactSink, Backends, ContentStore, IndexStore};
use crate::oci::reference::is_qualified;

/// Extra work done around an assembled index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyOptions {
    /// Also copy the index under this reference (published when qualified)
    pub alias: Option<String>,
    /// Save the index with its members to this archive before publishing
    pub archive: Option<PathBuf>,
    pub compress: bool,
}

/// An index that was created (and published, when its reference is qualified).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledIndex {
    pub reference: String,
    /// Members that made it into the index
    pub members: Vec<TaggedArtifact>,
    pub published: bool,
    /// Alias that was created, if any
    pub alias: Option<String>,
    /// Archive written, if any
    pub archive: Option<PathBuf>,
}

/// Result of an assembly attempt. Problems are warnings, never fatal.
#[derive(Debug, Default)]
pub struct AssemblyOutcome {
    pub index: Option<AssembledIndex>,
    pub warnings: Vec<MigrateError>,
}

/// Builds multi-platform indexes from tagged artifacts.
pub struct IndexAssembler {
    content: Arc<dyn ContentStore>,
    indexes: Arc<dyn IndexStore>,
    sink: Arc<dyn ArtifactSink>,
}

impl IndexAssembler {
    pub fn new(backends: &Backends) -> Self {
        Self {
            content: backends.content.clone(),
            indexes: backends.indexes.clone(),
            sink: backends.sink.clone(),
        }
    }

    /// Assemble `reference` over `members`.
    ///
    /// Members that no longer resolve are dropped. Any previous index under
    /// the same reference is replaced. Each entry is annotated with the
    /// platform carried by its artifact.
    pub async fn assemble(
        &self,
        reference: &str,
        members: &[TaggedArtifact],
        options: &AssemblyOptions,
    ) -> AssemblyOutcome {
        let mut outcome = AssemblyOutcome::default();
        let warn = |message: String| MigrateError::AssemblyError {
            reference: reference.to_string(),
            message,
        };

        let mut survivors = Vec::with_capacity(members.len());
        for member in members {
            match self.content.resolve(&member.local_ref).await {
                Ok(true) => survivors.push(member.clone()),
                Ok(false) => outcome.warnings.push(warn(format!(
                    "member {} no longer resolves, dropped",
                    member.local_ref
                ))),
                Err(e) => outcome.warnings.push(warn(format!(
                    "member {} could not be checked, dropped: {}",
                    member.local_ref, e
                ))),
            }
        }
        if survivors.is_empty() {
            tracing::info!(reference = %reference, "No members left, skipping index assembly");
            return self.log_warnings(outcome);
        }

        if let Err(e) = self.indexes.remove_index(reference).await {
            tracing::debug!(reference = %reference, error = %e, "Could not remove previous index");
        }

        let member_refs: Vec<String> = survivors.iter().map(|m| m.local_ref.clone()).collect();
        if let Err(e) = self.indexes.create_index(reference, &member_refs).await {
            outcome.warnings.push(warn(format!("create failed: {}", e)));
            return self.log_warnings(outcome);
        }

        for member in &survivors {
            if let Err(e) = self
                .indexes
                .annotate(reference, &member.local_ref, &member.platform)
                .await
            {
                outcome.warnings.push(warn(format!(
                    "annotating {} as {} failed: {}",
                    member.local_ref, member.platform, e
                )));
            }
        }

        let mut alias = None;
        if let Some(name) = &options.alias {
            if let Err(e) = self.indexes.remove_index(name).await {
                tracing::debug!(reference = %name, error = %e, "Could not remove previous alias");
            }
            match self.indexes.tag_index(reference, name).await {
                Ok(()) => alias = Some(name.clone()),
                Err(e) => outcome
                    .warnings
                    .push(warn(format!("alias {} failed: {}", name, e))),
            }
        }

        let mut archive = None;
        if let Some(path) = &options.archive {
            match self.sink.save_index(reference, path, options.compress).await {
                Ok(_) => archive = Some(path.clone()),
                Err(e) => outcome.warnings.push(warn(format!(
                    "saving index to {} failed: {}",
                    path.display(),
                    e
                ))),
            }
        }

        let published = is_qualified(reference);
        if published {
            if let Err(e) = self.indexes.publish_index(reference).await {
                outcome.warnings.push(warn(format!("publish failed: {}", e)));
                if let Some(name) = &alias {
                    self.discard(name).await;
                }
                return self.log_warnings(outcome);
            }
        } else {
            match self.indexes.inspect_index(reference).await {
                Ok(raw) => tracing::info!(
                    reference = %reference,
                    manifest = %String::from_utf8_lossy(&raw),
                    "Local image index"
                ),
                Err(e) => outcome
                    .warnings
                    .push(warn(format!("inspecting local index failed: {}", e))),
            }
        }

        if let Some(name) = alias.clone() {
            if is_qualified(&name) {
                if let Err(e) = self.indexes.publish_index(&name).await {
                    outcome
                        .warnings
                        .push(warn(format!("publishing alias {} failed: {}", name, e)));
                    self.discard(&name).await;
                    alias = None;
                }
            }
        }

        tracing::info!(
            reference = %reference,
            members = survivors.len(),
            published,
            "Assembled image index"
        );

        outcome.index = Some(AssembledIndex {
            reference: reference.to_string(),
            members: survivors,
            published,
            alias,
            archive,
        });
        self.log_warnings(outcome)
    }

    /// Drop a local index draft that will not be published.
    async fn discard(&self, reference: &str) {
        if let Err(e) = self.indexes.remove_index(reference).await {
            tracing::debug!(reference = %reference, error = %e, "Could not remove index draft");
        }
    }

    fn log_warnings(&self, outcome: AssemblyOutcome) -> AssemblyOutcome {
        for warning in &outcome.warnings {
            tracing::warn!(error = %warning, "Index assembly problem");
        }
        outcome
    }
}
