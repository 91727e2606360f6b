//! OCI image handling: references, registry access and local stores.
//!
//! # Layout
//!
//! ```text
//! <home>/
//! ├── images/
//! │   ├── index.json            (reference → manifest digest)
//! │   └── sha256/<digest>/      (one OCI image layout per platform image)
//! ├── manifests/
//! │   └── <reference>.json      (multi-platform index drafts)
//! └── auth/credentials.json     (registry logins)
//! ```
//!
//! Pulls always resolve a multi-platform source to one platform. Tagging adds a
//! reference to an existing layout. Index drafts list member references and are
//! pushed as OCI image indexes.

pub mod archive;
pub mod credentials;
mod index;
pub mod layout;
mod local;
pub mod reference;
pub mod registry;
pub mod store;

pub use credentials::CredentialStore;
pub use index::{IndexMember, LocalIndex, LocalIndexStore};
pub use local::{ArchiveSink, LocalContentStore, RegistryCatalog, RegistryPublisher};
pub use reference::ImageReference;
pub use registry::{PushResult, RegistryAccess, RegistryAuth, RegistryPuller, RegistryPusher};
pub use store::{ImageStore, StoredImage};
