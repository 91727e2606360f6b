//! OCI registry client for inspecting, pulling and pushing images.
//!
//! Uses the `oci-distribution` crate to talk to container registries
//! (Docker Hub, GHCR, private registries). Pulls are always resolved to a
//! single platform and written as an OCI image layout on disk.

use std::path::Path;

use imgmigrate_core::config::RegistryConfig;
use imgmigrate_core::error::{MigrateError, Result};
use imgmigrate_core::platform::PlatformDescriptor;
use oci_distribution::client::{ClientConfig, ClientProtocol, Config, ImageLayer, PushResponse};
use oci_distribution::manifest::{ImageIndexEntry, OciImageIndex, OciImageManifest, OciManifest};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use olpc_cjson::CanonicalFormatter;
use serde::Serialize;

use super::credentials::{normalize_registry, CredentialStore};
use super::layout::{self, Descriptor, IndexDocument, OCI_MANIFEST_MEDIA_TYPE};
use super::reference::ImageReference;

/// Authentication credentials for a container registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Create authentication from environment variables.
    ///
    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    /// Falls back to anonymous if not set.
    pub fn from_env() -> Self {
        let username = std::env::var("REGISTRY_USERNAME").ok();
        let password = std::env::var("REGISTRY_PASSWORD").ok();

        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    /// Convert to oci-distribution auth type.
    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// Per-registry credentials and transport settings.
///
/// Lookup order for a registry: explicitly configured login (when its URL
/// names the same registry), then the credential store, then the
/// `REGISTRY_USERNAME`/`REGISTRY_PASSWORD` environment, then anonymous.
#[derive(Debug, Clone)]
pub struct RegistryAccess {
    explicit: Option<RegistryConfig>,
    credentials: CredentialStore,
}

impl RegistryAccess {
    pub fn new(explicit: Option<RegistryConfig>, credentials: CredentialStore) -> Self {
        Self {
            explicit,
            credentials,
        }
    }

    /// Explicit configuration, if it applies to `registry`.
    fn explicit_for(&self, registry: &str) -> Option<&RegistryConfig> {
        self.explicit
            .as_ref()
            .filter(|cfg| !cfg.url.is_empty())
            .filter(|cfg| normalize_registry(&cfg.url) == normalize_registry(registry))
    }

    /// Resolve credentials for a registry host.
    pub fn auth_for(&self, registry: &str) -> RegistryAuth {
        if let Some(cfg) = self.explicit_for(registry).filter(|cfg| cfg.has_credentials()) {
            return RegistryAuth::basic(&cfg.username, &cfg.password);
        }
        match self.credentials.get(registry) {
            Ok(Some(login)) => return RegistryAuth::basic(login.username, login.password),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(registry = %registry, error = %e, "Ignoring unreadable credential store")
            }
        }
        RegistryAuth::from_env()
    }

    /// Transport protocol for a registry host. Insecure registries use plain HTTP.
    pub fn protocol_for(&self, registry: &str) -> ClientProtocol {
        let insecure = self
            .explicit_for(registry)
            .map(|cfg| cfg.insecure)
            .or_else(|| {
                self.credentials
                    .get(registry)
                    .ok()
                    .flatten()
                    .map(|login| login.insecure)
            })
            .unwrap_or(false);

        if insecure {
            ClientProtocol::HttpsExcept(vec![registry.to_string()])
        } else {
            ClientProtocol::Https
        }
    }

    /// Puller for a reference's registry, resolving to `platform`.
    pub fn puller(
        &self,
        reference: &ImageReference,
        platform: Option<PlatformDescriptor>,
    ) -> RegistryPuller {
        RegistryPuller::configure(
            self.auth_for(&reference.registry),
            self.protocol_for(&reference.registry),
            platform,
        )
    }

    /// Pusher for a reference's registry.
    pub fn pusher(&self, reference: &ImageReference) -> RegistryPusher {
        RegistryPusher::configure(
            self.auth_for(&reference.registry),
            self.protocol_for(&reference.registry),
        )
    }
}

/// Pulls OCI images from container registries.
pub struct RegistryPuller {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryPuller {
    /// Create a puller that resolves multi-platform indexes to `platform`
    /// (or to linux on the host architecture when `None`).
    pub fn configure(
        auth: RegistryAuth,
        protocol: ClientProtocol,
        platform: Option<PlatformDescriptor>,
    ) -> Self {
        let resolver: Box<dyn Fn(&[ImageIndexEntry]) -> Option<String> + Send + Sync> =
            match platform {
                Some(wanted) => Box::new(move |entries: &[ImageIndexEntry]| {
                    resolve_platform(entries, &wanted)
                }),
                None => Box::new(host_platform_resolver),
            };
        let config = ClientConfig {
            protocol,
            platform_resolver: Some(resolver),
            ..Default::default()
        };

        Self {
            client: Client::new(config),
            auth,
        }
    }

    /// Fetch the platform index of an image.
    ///
    /// Multi-platform images return their index as published. A single-platform
    /// image is described by a one-entry index whose platform comes from the
    /// image config.
    pub async fn inspect(&self, reference: &ImageReference) -> Result<IndexDocument> {
        let oci_ref = to_oci_reference(reference)?;
        let auth = self.auth.to_oci_auth();

        let (manifest, digest) = self
            .client
            .pull_manifest(&oci_ref, &auth)
            .await
            .map_err(|e| registry_error(reference, "Failed to inspect manifest", e))?;

        match manifest {
            OciManifest::ImageIndex(index) => {
                let value = serde_json::to_value(&index)?;
                Ok(serde_json::from_value(value)?)
            }
            OciManifest::Image(image) => {
                let (_, _, config) = self
                    .client
                    .pull_manifest_and_config(&oci_ref, &auth)
                    .await
                    .map_err(|e| registry_error(reference, "Failed to pull image config", e))?;
                let config: serde_json::Value = serde_json::from_str(&config)?;

                let platform = config["os"].as_str().zip(config["architecture"].as_str()).map(
                    |(os, arch)| {
                        let platform = PlatformDescriptor::new(os, arch);
                        match config["variant"].as_str() {
                            Some(variant) => platform.with_variant(variant),
                            None => platform,
                        }
                    },
                );

                Ok(IndexDocument::new(vec![Descriptor {
                    media_type: image
                        .media_type
                        .clone()
                        .unwrap_or_else(|| OCI_MANIFEST_MEDIA_TYPE.to_string()),
                    digest,
                    size: canonical_json(&image)?.len() as u64,
                    platform,
                    annotations: Default::default(),
                }]))
            }
        }
    }

    /// Pull an image and write it as an OCI image layout to `target_dir`.
    ///
    /// The layout's `index.json` lists one manifest, tagged with `platform`.
    /// Returns the manifest digest of the layout.
    pub async fn pull(
        &self,
        reference: &ImageReference,
        platform: Option<&PlatformDescriptor>,
        target_dir: &Path,
    ) -> Result<String> {
        let oci_ref = to_oci_reference(reference)?;

        tracing::info!(
            reference = %reference,
            target = %target_dir.display(),
            "Pulling image from registry"
        );

        // Resolves multi-platform indexes through the configured resolver
        let auth = self.auth.to_oci_auth();
        let (image_manifest, registry_digest) = self
            .client
            .pull_image_manifest(&oci_ref, &auth)
            .await
            .map_err(|e| registry_error(reference, "Failed to pull manifest", e))?;

        self.pull_image_content(&oci_ref, &image_manifest, target_dir, reference)
            .await?;

        let manifest_digest = write_manifest(target_dir, &image_manifest, platform)?;

        tracing::info!(
            reference = %reference,
            digest = %registry_digest,
            "Image pulled successfully"
        );

        Ok(manifest_digest)
    }

    /// Pull config and layers for an image manifest, writing blobs to disk.
    async fn pull_image_content(
        &self,
        oci_ref: &Reference,
        manifest: &OciImageManifest,
        target_dir: &Path,
        reference: &ImageReference,
    ) -> Result<()> {
        let mut config_data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(oci_ref, &manifest.config, &mut config_data)
            .await
            .map_err(|e| registry_error(reference, "Failed to pull config blob", e))?;
        write_blob_at(target_dir, &manifest.config.digest, &config_data)?;

        for layer in &manifest.layers {
            tracing::debug!(
                digest = %layer.digest,
                size = layer.size,
                "Pulling layer"
            );

            let mut layer_data: Vec<u8> = Vec::new();
            self.client
                .pull_blob(oci_ref, layer, &mut layer_data)
                .await
                .map_err(|e| {
                    registry_error(reference, &format!("Failed to pull layer {}", layer.digest), e)
                })?;
            write_blob_at(target_dir, &layer.digest, &layer_data)?;
        }

        Ok(())
    }
}

/// Result of a successful image push.
#[derive(Debug, Clone)]
pub struct PushResult {
    /// URL of the pushed config blob.
    pub config_url: String,
    /// URL of the pushed manifest.
    pub manifest_url: String,
}

/// Pushes OCI images and image indexes to container registries.
pub struct RegistryPusher {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryPusher {
    pub fn configure(auth: RegistryAuth, protocol: ClientProtocol) -> Self {
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            auth,
        }
    }

    /// Push a local OCI image layout to a registry.
    ///
    /// Reads the OCI layout from `image_dir` (index.json → manifest → config + layers),
    /// then pushes all blobs and the manifest to the target registry.
    pub async fn push(&self, reference: &ImageReference, image_dir: &Path) -> Result<PushResult> {
        let oci_ref = to_oci_reference(reference)?;

        tracing::info!(
            reference = %reference,
            source = %image_dir.display(),
            "Pushing image to registry"
        );

        let manifest_desc = layout::manifest_descriptor(image_dir)?;
        let manifest_data = read_blob_at(image_dir, &manifest_desc.digest, "manifest")?;
        let manifest: OciImageManifest = serde_json::from_slice(&manifest_data)?;

        let config_data = read_blob_at(image_dir, &manifest.config.digest, "config")?;
        let config = Config::new(config_data, manifest.config.media_type.clone(), None);

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for layer_desc in &manifest.layers {
            let layer_data = read_blob_at(image_dir, &layer_desc.digest, "layer")?;

            tracing::debug!(
                digest = %layer_desc.digest,
                size = layer_data.len(),
                "Read layer for push"
            );

            layers.push(ImageLayer::new(
                layer_data,
                layer_desc.media_type.clone(),
                None,
            ));
        }

        let auth = self.auth.to_oci_auth();
        let response: PushResponse = self
            .client
            .push(&oci_ref, &layers, config, &auth, Some(manifest))
            .await
            .map_err(|e| registry_error(reference, "Failed to push image", e))?;

        tracing::info!(
            reference = %reference,
            manifest_url = %response.manifest_url,
            "Image pushed successfully"
        );

        Ok(PushResult {
            config_url: response.config_url,
            manifest_url: response.manifest_url,
        })
    }

    /// Push an image index. Every member manifest must already exist in the
    /// target repository. Returns the manifest URL.
    pub async fn push_index(
        &self,
        reference: &ImageReference,
        index: &IndexDocument,
    ) -> Result<String> {
        let oci_ref = to_oci_reference(reference)?;
        let oci_index: OciImageIndex = serde_json::from_value(serde_json::to_value(index)?)?;

        let url = self
            .client
            .push_manifest_list(&oci_ref, &self.auth.to_oci_auth(), oci_index)
            .await
            .map_err(|e| registry_error(reference, "Failed to push image index", e))?;

        tracing::info!(
            reference = %reference,
            members = index.manifests.len(),
            manifest_url = %url,
            "Image index pushed successfully"
        );

        Ok(url)
    }
}

/// Convert an ImageReference to an oci-distribution Reference.
fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    let ref_str = reference.full_reference();
    ref_str.parse::<Reference>().map_err(|e| {
        MigrateError::OciImageError(format!("Invalid OCI reference '{}': {}", ref_str, e))
    })
}

fn registry_error(
    reference: &ImageReference,
    context: &str,
    err: impl std::fmt::Display,
) -> MigrateError {
    MigrateError::RegistryError {
        registry: reference.registry.clone(),
        message: format!("{}: {}", context, err),
    }
}

/// Write `manifest` and an `index.json` naming it. Returns the manifest digest.
///
/// The manifest is stored in the form the pusher sends, so index entries name
/// digests the target registry actually receives.
fn write_manifest(
    target_dir: &Path,
    manifest: &OciImageManifest,
    platform: Option<&PlatformDescriptor>,
) -> Result<String> {
    let manifest_json = canonical_json(manifest)?;
    let manifest_digest = layout::write_blob(target_dir, &manifest_json)?;

    let index = IndexDocument::new(vec![Descriptor {
        media_type: manifest
            .media_type
            .clone()
            .unwrap_or_else(|| OCI_MANIFEST_MEDIA_TYPE.to_string()),
        digest: manifest_digest.clone(),
        size: manifest_json.len() as u64,
        platform: platform.cloned(),
        annotations: Default::default(),
    }]);
    layout::write_layout(target_dir, &index)?;
    Ok(manifest_digest)
}

/// Serialize with sorted keys and no whitespace, matching how manifests are
/// sent on push.
fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut body, CanonicalFormatter::new());
    value.serialize(&mut ser)?;
    Ok(body)
}

fn write_blob_at(root_dir: &Path, digest: &str, data: &[u8]) -> Result<()> {
    let path = layout::blob_path(root_dir, digest);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, data).map_err(|e| {
        MigrateError::OciImageError(format!("Failed to write blob {}: {}", digest, e))
    })
}

fn read_blob_at(root_dir: &Path, digest: &str, kind: &str) -> Result<Vec<u8>> {
    std::fs::read(layout::blob_path(root_dir, digest)).map_err(|e| {
        MigrateError::OciImageError(format!("Failed to read {} blob {}: {}", kind, digest, e))
    })
}

/// Pick the index entry whose platform matches `wanted`.
///
/// A wanted platform without a variant accepts any variant.
fn resolve_platform(entries: &[ImageIndexEntry], wanted: &PlatformDescriptor) -> Option<String> {
    entries
        .iter()
        .find(|entry| {
            entry.platform.as_ref().map_or(false, |p| {
                p.os == wanted.os
                    && p.architecture == wanted.architecture
                    && wanted
                        .variant
                        .as_ref()
                        .map_or(true, |v| p.variant.as_deref() == Some(v.as_str()))
            })
        })
        .map(|entry| entry.digest.clone())
}

/// Platform resolver selecting linux images matching the host architecture.
fn host_platform_resolver(entries: &[ImageIndexEntry]) -> Option<String> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    resolve_platform(entries, &PlatformDescriptor::new("linux", arch))
}
