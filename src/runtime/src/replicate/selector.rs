//! Filtering a platform catalog down to the requested platforms.

use imgmigrate_core::error::{MigrateError, Result};
use imgmigrate_core::platform::PlatformDescriptor;
use imgmigrate_core::task::ReplicationTask;

/// OS and architecture constraints.
///
/// OS names match exactly. Architecture tokens match by substring against
/// `arch` or `arch/variant`, so `arm` selects `arm/v7` and `arm64` alike.
/// An empty constraint matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformSelector {
    operating_systems: Vec<String>,
    architectures: Vec<String>,
}

impl PlatformSelector {
    /// Build a selector. `select_all` drops the architecture constraint.
    pub fn new(operating_systems: &[String], architectures: &[String], select_all: bool) -> Self {
        let clean = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        };

        Self {
            operating_systems: clean(operating_systems),
            architectures: if select_all {
                Vec::new()
            } else {
                clean(architectures)
            },
        }
    }

    pub fn for_task(task: &ReplicationTask) -> Self {
        Self::new(&task.operating_systems, &task.architectures, task.select_all)
    }

    /// Whether no constraint is in effect.
    pub fn is_unconstrained(&self) -> bool {
        self.operating_systems.is_empty() && self.architectures.is_empty()
    }

    pub fn matches(&self, platform: &PlatformDescriptor) -> bool {
        let os_ok = self.operating_systems.is_empty()
            || self.operating_systems.iter().any(|os| *os == platform.os);

        let arch_ok = self.architectures.is_empty() || {
            let candidate = platform.arch_with_variant();
            self.architectures
                .iter()
                .any(|token| candidate.contains(token.as_str()))
        };

        os_ok && arch_ok
    }

    /// Filter `catalog`, keeping its order.
    ///
    /// Fails with [`MigrateError::NoMatchError`] when a constraint leaves nothing.
    pub fn select(
        &self,
        reference: &str,
        catalog: &[PlatformDescriptor],
    ) -> Result<Vec<PlatformDescriptor>> {
        if self.is_unconstrained() {
            return Ok(catalog.to_vec());
        }

        let selected: Vec<PlatformDescriptor> =
            catalog.iter().filter(|p| self.matches(p)).cloned().collect();

        if selected.is_empty() {
            return Err(MigrateError::NoMatchError {
                reference: reference.to_string(),
                operating_systems: self.operating_systems.clone(),
                architectures: self.architectures.clone(),
            });
        }

        tracing::info!(
            reference = %reference,
            selected = selected.len(),
            available = catalog.len(),
            "Selected platforms"
        );
        Ok(selected)
    }
}
