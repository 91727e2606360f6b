//! Platform descriptors for multi-platform images.

use serde::{Deserialize, Serialize};

/// One build of a multi-platform image: OS, CPU architecture and optional variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    /// Operating system (e.g., "linux", "windows")
    pub os: String,
    /// CPU architecture (e.g., "amd64", "arm64", "arm")
    pub architecture: String,
    /// Architecture variant (e.g., "v7", "v8")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl PlatformDescriptor {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
        }
    }

    /// Attach a variant. Empty strings are treated as no variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        let variant = variant.into();
        self.variant = if variant.is_empty() { None } else { Some(variant) };
        self
    }

    /// Architecture with the variant appended (`arm/v7`), as matched by selectors.
    pub fn arch_with_variant(&self) -> String {
        match self.variant.as_deref() {
            Some(v) if !v.is_empty() => format!("{}/{}", self.architecture, v),
            _ => self.architecture.clone(),
        }
    }

    /// Fetch constraint in `os/arch[/variant]` form.
    pub fn constraint(&self) -> String {
        format!("{}/{}", self.os, self.arch_with_variant())
    }

    /// Tag suffix in `os-arch[-variant]` form.
    pub fn tag_component(&self) -> String {
        self.constraint().replace('/', "-")
    }
}

impl std::fmt::Display for PlatformDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.constraint())
    }
}
