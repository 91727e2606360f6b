//! End-to-end replication of a task, and of a batch of tasks.

use std::collections::HashSet;

use imgmigrate_core::error::{MigrateError, ReplicationStep, Result};
use imgmigrate_core::platform::PlatformDescriptor;
use imgmigrate_core::task::{ReplicationResult, ReplicationTask};

use super::assembler::{AssemblyOptions, IndexAssembler};
use super::backend::Backends;
use super::catalog::PlatformCatalog;
use super::naming::NamingScheme;
use super::replicator::{ArtifactReplicator, Destination, SettlePolicy};
use super::selector::PlatformSelector;
use crate::oci::archive::archive_path;

/// One pass over the selected platforms towards a single destination.
struct Flow {
    naming: NamingScheme,
    destination: Destination,
    assemble: bool,
    options: AssemblyOptions,
}

/// Drives validate → discover → select → replicate each → assemble.
pub struct ReplicationOrchestrator {
    backends: Backends,
    settle: SettlePolicy,
}

impl ReplicationOrchestrator {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            settle: SettlePolicy::default(),
        }
    }

    pub fn with_settle_policy(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Run one task.
    ///
    /// Returns an error only when the task is invalid, discovery fails or no
    /// platform is selected. Per-platform and index problems are reported as
    /// warnings in the result.
    pub async fn run(&self, task: &ReplicationTask) -> Result<ReplicationResult> {
        task.validate()?;

        tracing::info!(
            source = %task.source,
            destination = task.target.as_deref().unwrap_or("-"),
            persist = task.persist,
            "Starting replication"
        );

        let catalog = PlatformCatalog::new(
            self.backends.catalog.clone(),
            self.backends.content.clone(),
        )
        .discover(&task.source)
        .await?;
        let selected = PlatformSelector::for_task(task).select(&task.source, &catalog)?;

        let mut result = ReplicationResult::default();

        if task.persist {
            let naming = NamingScheme::from_reference(&task.source);
            // A local-only run never assembles an index
            let assemble = task.assemble_index && task.target.is_some();
            let archive = (assemble && task.compress)
                .then(|| archive_path(&task.persist_dir, &naming.index_ref(), true));
            let flow = Flow {
                destination: Destination::Persist {
                    dir: task.persist_dir.clone(),
                    compress: task.compress,
                },
                assemble,
                options: AssemblyOptions {
                    alias: None,
                    archive,
                    compress: task.compress,
                },
                naming,
            };
            result.merge(self.run_flow(task, &selected, &flow).await);
        }

        if let Some(target) = &task.target {
            let flow = Flow {
                naming: NamingScheme::from_reference(target),
                destination: Destination::Publish,
                assemble: task.assemble_index,
                options: AssemblyOptions {
                    alias: Some(target.clone()),
                    ..Default::default()
                },
            };
            result.merge(self.run_flow(task, &selected, &flow).await);
        }

        tracing::info!(
            source = %task.source,
            succeeded = result.succeeded.len(),
            warnings = result.warnings.len(),
            index = result.index_ref.as_deref().unwrap_or("-"),
            "Replication finished"
        );
        Ok(result)
    }

    async fn run_flow(
        &self,
        task: &ReplicationTask,
        platforms: &[PlatformDescriptor],
        flow: &Flow,
    ) -> ReplicationResult {
        let replicator = ArtifactReplicator::new(&self.backends, self.settle);
        let mut result = ReplicationResult::default();
        let mut produced = HashSet::new();

        for platform in platforms {
            let local_ref = flow.naming.local_ref(platform);
            if produced.contains(&local_ref) {
                let warning = MigrateError::ReplicationStepError {
                    reference: task.source.clone(),
                    platform: platform.constraint(),
                    step: ReplicationStep::Name,
                    message: format!("{} was already produced by another platform", local_ref),
                };
                tracing::warn!(error = %warning, "Skipping platform");
                result.warnings.push(warning);
                continue;
            }

            match replicator
                .replicate(&task.source, platform, &flow.naming, &flow.destination)
                .await
            {
                Ok(replicated) => {
                    produced.insert(local_ref);
                    result.succeeded.push(replicated.artifact);
                    result.saved_files.extend(replicated.saved);
                }
                Err(e) => {
                    tracing::warn!(
                        reference = %task.source,
                        platform = %platform,
                        error = %e,
                        "Platform replication failed"
                    );
                    result.warnings.push(e);
                }
            }
        }

        if flow.assemble && !result.succeeded.is_empty() {
            let outcome = IndexAssembler::new(&self.backends)
                .assemble(&flow.naming.index_ref(), &result.succeeded, &flow.options)
                .await;
            result.warnings.extend(outcome.warnings);
            if let Some(index) = outcome.index {
                result.saved_files.extend(index.archive);
                result.index_ref = Some(index.reference);
            }
        }

        result
    }

    /// Run tasks one after another. A failing task does not stop the batch.
    pub async fn run_batch(&self, tasks: &[ReplicationTask]) -> BatchReport {
        let mut reports = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            tracing::info!(position = i + 1, total = tasks.len(), source = %task.source, "Processing task");
            let outcome = self.run(task).await;
            if let Err(e) = &outcome {
                tracing::warn!(position = i + 1, source = %task.source, error = %e, "Task failed");
            }
            reports.push(TaskReport {
                position: i + 1,
                source: task.source.clone(),
                outcome,
            });
        }
        BatchReport { reports }
    }
}

/// Outcome of one task in a batch.
#[derive(Debug)]
pub struct TaskReport {
    /// 1-based position in the batch
    pub position: usize,
    pub source: String,
    pub outcome: Result<ReplicationResult>,
}

/// Outcomes of a batch, in task order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<TaskReport>,
}

impl BatchReport {
    /// Whether any task failed outright.
    pub fn has_failures(&self) -> bool {
        self.reports.iter().any(|r| r.outcome.is_err())
    }

    pub fn failure_count(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_err()).count()
    }
}
