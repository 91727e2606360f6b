//! Derived local names for replicated platforms and indexes.

use imgmigrate_core::platform::PlatformDescriptor;

use crate::oci::reference::split_name_tag;

/// Tag suffix of an assembled multi-platform index.
pub const INDEX_TAG_SUFFIX: &str = "allarch";

/// Base name and tag that every local reference of one flow is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    base: String,
    tag: String,
}

impl NamingScheme {
    /// Derive from a reference as written (`name[:tag][@digest]`).
    pub fn from_reference(reference: &str) -> Self {
        let (base, tag) = split_name_tag(reference);
        Self { base, tag }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// `{base}:{tag}-{os}-{arch}[-{variant}]`
    pub fn local_ref(&self, platform: &PlatformDescriptor) -> String {
        format!("{}:{}-{}", self.base, self.tag, platform.tag_component())
    }

    /// `{base}:{tag}-allarch`
    pub fn index_ref(&self) -> String {
        format!("{}:{}-{}", self.base, self.tag, INDEX_TAG_SUFFIX)
    }
}
