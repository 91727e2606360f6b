//! Replication tasks and their results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::platform::PlatformDescriptor;

/// One replication request: a source image, what to select from it, and where it goes.
///
/// Built once per CLI invocation or config entry and never mutated while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationTask {
    /// Source image reference (e.g., "nginx:1.25")
    pub source: String,
    /// Destination image reference for the publish flow
    pub target: Option<String>,
    /// Architecture tokens, matched by substring against `arch[/variant]`
    pub architectures: Vec<String>,
    /// Ignore `architectures` and take every architecture
    pub select_all: bool,
    /// Operating systems, matched exactly (empty matches all)
    pub operating_systems: Vec<String>,
    /// Save each replicated platform to disk
    pub persist: bool,
    /// Directory for saved archives
    pub persist_dir: PathBuf,
    /// Write `.tar.gz` instead of `.tar`
    pub compress: bool,
    /// Assemble a multi-platform index from the replicated platforms
    pub assemble_index: bool,
}

impl ReplicationTask {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: None,
            architectures: Vec::new(),
            select_all: false,
            operating_systems: Vec::new(),
            persist: false,
            persist_dir: PathBuf::from("."),
            compress: false,
            assemble_index: false,
        }
    }

    /// Set the publish destination. An empty string clears it.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        self.target = if target.trim().is_empty() {
            None
        } else {
            Some(target)
        };
        self
    }

    pub fn with_architectures<I, S>(mut self, architectures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.architectures = architectures.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_operating_systems<I, S>(mut self, operating_systems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operating_systems = operating_systems.into_iter().map(Into::into).collect();
        self
    }

    pub fn select_all(mut self, select_all: bool) -> Self {
        self.select_all = select_all;
        self
    }

    /// Enable saving to `dir`.
    pub fn persist_to(mut self, dir: impl Into<PathBuf>, compress: bool) -> Self {
        self.persist = true;
        self.persist_dir = dir.into();
        self.compress = compress;
        self
    }

    pub fn assemble_index(mut self, assemble: bool) -> Self {
        self.assemble_index = assemble;
        self
    }

    /// Check the task can run at all.
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(MigrateError::ConfigError(
                "source image is required".to_string(),
            ));
        }
        if !self.select_all && self.architectures.iter().all(|a| a.trim().is_empty()) {
            return Err(MigrateError::ConfigError(format!(
                "{}: either all architectures must be selected or at least one architecture must be specified",
                self.source
            )));
        }
        if !self.persist && self.target.is_none() {
            return Err(MigrateError::ConfigError(format!(
                "{}: either a target must be specified or saving must be enabled",
                self.source
            )));
        }
        Ok(())
    }
}

/// A platform that was fetched, tagged under its derived local reference, and verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedArtifact {
    /// Platform this artifact was fetched for
    pub platform: PlatformDescriptor,
    /// Derived local reference (e.g., "nginx:1.25-linux-arm64")
    pub local_ref: String,
}

impl TaggedArtifact {
    pub fn new(platform: PlatformDescriptor, local_ref: impl Into<String>) -> Self {
        Self {
            platform,
            local_ref: local_ref.into(),
        }
    }
}

/// Outcome of one replication task.
#[derive(Debug, Default)]
pub struct ReplicationResult {
    /// Artifacts that made it through every step, in processing order
    pub succeeded: Vec<TaggedArtifact>,
    /// Reference of the assembled index, if one was assembled
    pub index_ref: Option<String>,
    /// Non-fatal failures (per-platform steps, index assembly)
    pub warnings: Vec<MigrateError>,
    /// Archives written to disk
    pub saved_files: Vec<PathBuf>,
}

impl ReplicationResult {
    /// Fold a later flow's result into this one. The later index reference wins.
    pub fn merge(&mut self, other: ReplicationResult) {
        self.succeeded.extend(other.succeeded);
        self.warnings.extend(other.warnings);
        self.saved_files.extend(other.saved_files);
        if other.index_ref.is_some() {
            self.index_ref = other.index_ref;
        }
    }
}
