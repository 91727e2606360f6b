//! Multi-platform image replication pipeline.
//!
//! ```text
//! ReplicationOrchestrator
//!   ├── PlatformCatalog      discover the source's platforms (once)
//!   ├── PlatformSelector     filter by OS / architecture (once)
//!   └── per flow (persist, then publish):
//!         ├── ArtifactReplicator   fetch → tag → settle → save | push, per platform
//!         └── IndexAssembler       create → annotate → alias → publish
//! ```
//!
//! Every step runs to completion before the next starts. The pipeline talks to
//! registries and disk only through the traits in [`backend`].

mod assembler;
pub mod backend;
mod catalog;
mod naming;
mod orchestrator;
mod replicator;
mod selector;

#[cfg(test)]
pub(crate) mod fakes;

pub use assembler::{AssembledIndex, AssemblyOptions, AssemblyOutcome, IndexAssembler};
pub use backend::{ArtifactSink, Backends, CatalogSource, ContentStore, IndexStore, Publisher};
pub use catalog::{parse_platforms, PlatformCatalog};
pub use naming::{NamingScheme, INDEX_TAG_SUFFIX};
pub use orchestrator::{BatchReport, ReplicationOrchestrator, TaskReport};
pub use replicator::{ArtifactReplicator, Destination, Replicated, SettlePolicy};
pub use selector::PlatformSelector;
