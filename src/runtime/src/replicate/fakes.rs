//! In-memory collaborators for pipeline tests.
//!
//! One [`FakeRegistry`] plays every collaborator. It records each call as a
//! line such as `fetch nginx:1.25 linux/amd64` and fails any call that starts
//! with an injected pattern.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use imgmigrate_core::error::{MigrateError, Result};
use imgmigrate_core::platform::PlatformDescriptor;

use super::backend::{ArtifactSink, Backends, CatalogSource, ContentStore, IndexStore, Publisher};

/// Raw index document listing `platforms`.
pub fn index_json(platforms: &[PlatformDescriptor]) -> Vec<u8> {
    let manifests: Vec<serde_json::Value> = platforms
        .iter()
        .enumerate()
        .map(|(i, p)| {
            serde_json::json!({
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": format!("sha256:{:064x}", i),
                "size": 512,
                "platform": p,
            })
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({"schemaVersion": 2, "manifests": manifests}))
        .unwrap()
}

/// A fake index: members in order plus the platform annotated on each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeIndex {
    pub members: Vec<String>,
    pub platforms: BTreeMap<String, PlatformDescriptor>,
}

#[derive(Default)]
struct State {
    calls: Vec<String>,
    failures: Vec<String>,
    failures_once: Vec<String>,
    remote: HashMap<String, Vec<u8>>,
    after_fetch: HashMap<String, Vec<u8>>,
    local: HashMap<String, Option<PlatformDescriptor>>,
    never_resolve: HashSet<String>,
    resolve_delay: HashMap<String, usize>,
    local_indexes: HashMap<String, FakeIndex>,
    remote_indexes: HashMap<String, FakeIndex>,
    pushed: Vec<String>,
    saved: Vec<PathBuf>,
}

#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<State>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn backends(self: &Arc<Self>) -> Backends {
        Backends {
            catalog: self.clone(),
            content: self.clone(),
            indexes: self.clone(),
            publisher: self.clone(),
            sink: self.clone(),
        }
    }

    /// Make `reference` a remote multi-platform image.
    pub fn publish_index(&self, reference: &str, platforms: &[PlatformDescriptor]) {
        self.lock().remote.insert(reference.to_string(), index_json(platforms));
    }

    /// Make `reference` inspectable only after it has been fetched once.
    pub fn publish_raw_after_fetch(&self, reference: &str, raw: Vec<u8>) {
        self.lock().after_fetch.insert(reference.to_string(), raw);
    }

    /// Fail every call whose recorded line starts with `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.lock().failures.push(pattern.to_string());
    }

    /// Fail only the next call whose recorded line starts with `pattern`.
    pub fn fail_once(&self, pattern: &str) {
        self.lock().failures_once.push(pattern.to_string());
    }

    /// `resolve(reference)` always answers false.
    pub fn never_resolve(&self, reference: &str) {
        self.lock().never_resolve.insert(reference.to_string());
    }

    /// `resolve(reference)` answers false for the next `polls` calls.
    pub fn resolve_after(&self, reference: &str, polls: usize) {
        self.lock().resolve_delay.insert(reference.to_string(), polls);
    }

    /// Drop a local reference behind the pipeline's back.
    pub fn forget_local(&self, reference: &str) {
        self.lock().local.remove(reference);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn has_local(&self, reference: &str) -> bool {
        self.lock().local.contains_key(reference)
    }

    pub fn local_index(&self, reference: &str) -> Option<FakeIndex> {
        self.lock().local_indexes.get(reference).cloned()
    }

    pub fn remote_index(&self, reference: &str) -> Option<FakeIndex> {
        self.lock().remote_indexes.get(reference).cloned()
    }

    pub fn pushed(&self) -> Vec<String> {
        self.lock().pushed.clone()
    }

    pub fn saved(&self) -> Vec<PathBuf> {
        self.lock().saved.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Record a call and apply injected failures.
    fn record(&self, call: String) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(call.clone());
        if state.failures.iter().any(|p| call.starts_with(p.as_str())) {
            return Err(MigrateError::Other(format!("injected failure: {}", call)));
        }
        if let Some(pos) = state
            .failures_once
            .iter()
            .position(|p| call.starts_with(p.as_str()))
        {
            state.failures_once.remove(pos);
            return Err(MigrateError::Other(format!("injected failure: {}", call)));
        }
        Ok(state)
    }
}

fn not_found(what: &str, reference: &str) -> MigrateError {
    MigrateError::OciImageError(format!("{} not found: {}", what, reference))
}

#[async_trait]
impl CatalogSource for FakeRegistry {
    async fn inspect(&self, reference: &str) -> Result<Vec<u8>> {
        let state = self.record(format!("inspect {}", reference))?;
        state
            .remote
            .get(reference)
            .cloned()
            .ok_or_else(|| not_found("manifest", reference))
    }
}

#[async_trait]
impl ContentStore for FakeRegistry {
    async fn fetch(&self, reference: &str, platform: Option<&PlatformDescriptor>) -> Result<()> {
        let call = match platform {
            Some(p) => format!("fetch {} {}", reference, p.constraint()),
            None => format!("fetch {}", reference),
        };
        let mut state = self.record(call)?;

        if let Some(raw) = state.after_fetch.remove(reference) {
            state.remote.insert(reference.to_string(), raw);
        }
        let raw = state
            .remote
            .get(reference)
            .cloned()
            .ok_or_else(|| not_found("manifest", reference))?;

        if let Some(wanted) = platform {
            let available = super::catalog::parse_platforms(&raw)?;
            if !available.contains(wanted) {
                return Err(not_found("platform", &wanted.constraint()));
            }
        }
        state.local.insert(reference.to_string(), platform.cloned());
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        let mut state = self.record(format!("tag {} {}", source, target))?;
        let platform = state
            .local
            .get(source)
            .cloned()
            .ok_or_else(|| not_found("image", source))?;
        state.local.insert(target.to_string(), platform);
        Ok(())
    }

    async fn resolve(&self, reference: &str) -> Result<bool> {
        let mut state = self.record(format!("resolve {}", reference))?;
        if state.never_resolve.contains(reference) {
            return Ok(false);
        }
        if let Some(remaining) = state.resolve_delay.get_mut(reference) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
        }
        Ok(state.local.contains_key(reference))
    }

    async fn remove_tag(&self, reference: &str) -> Result<()> {
        let mut state = self.record(format!("remove_tag {}", reference))?;
        state.local.remove(reference);
        Ok(())
    }
}

#[async_trait]
impl IndexStore for FakeRegistry {
    async fn create_index(&self, reference: &str, members: &[String]) -> Result<()> {
        let mut state = self.record(format!("create_index {}", reference))?;
        if state.local_indexes.contains_key(reference) {
            return Err(MigrateError::OciImageError(format!(
                "index {} already exists",
                reference
            )));
        }

        let mut index = FakeIndex::default();
        for member in members {
            let platform = state
                .local
                .get(member)
                .cloned()
                .ok_or_else(|| not_found("image", member))?;
            if let Some(platform) = platform {
                index.platforms.insert(member.clone(), platform);
            }
            index.members.push(member.clone());
        }
        state.local_indexes.insert(reference.to_string(), index);
        Ok(())
    }

    async fn annotate(
        &self,
        index: &str,
        member: &str,
        platform: &PlatformDescriptor,
    ) -> Result<()> {
        let mut state =
            self.record(format!("annotate {} {} {}", index, member, platform.constraint()))?;
        let draft = state
            .local_indexes
            .get_mut(index)
            .ok_or_else(|| not_found("index", index))?;
        if !draft.members.iter().any(|m| m == member) {
            return Err(not_found("member", member));
        }
        draft.platforms.insert(member.to_string(), platform.clone());
        Ok(())
    }

    async fn remove_index(&self, reference: &str) -> Result<()> {
        let mut state = self.record(format!("remove_index {}", reference))?;
        state.local_indexes.remove(reference);
        Ok(())
    }

    async fn tag_index(&self, source: &str, target: &str) -> Result<()> {
        let mut state = self.record(format!("tag_index {} {}", source, target))?;
        let draft = state
            .local_indexes
            .get(source)
            .cloned()
            .ok_or_else(|| not_found("index", source))?;
        state.local_indexes.insert(target.to_string(), draft);
        Ok(())
    }

    async fn publish_index(&self, reference: &str) -> Result<()> {
        let mut state = self.record(format!("publish_index {}", reference))?;
        let draft = state
            .local_indexes
            .remove(reference)
            .ok_or_else(|| not_found("index", reference))?;
        state.remote_indexes.insert(reference.to_string(), draft);
        Ok(())
    }

    async fn inspect_index(&self, reference: &str) -> Result<Vec<u8>> {
        let state = self.record(format!("inspect_index {}", reference))?;
        let draft = state
            .local_indexes
            .get(reference)
            .ok_or_else(|| not_found("index", reference))?;
        let platforms: Vec<PlatformDescriptor> = draft
            .members
            .iter()
            .filter_map(|m| draft.platforms.get(m).cloned())
            .collect();
        Ok(index_json(&platforms))
    }
}

#[async_trait]
impl Publisher for FakeRegistry {
    async fn push(&self, reference: &str) -> Result<()> {
        let mut state = self.record(format!("push {}", reference))?;
        if !state.local.contains_key(reference) {
            return Err(not_found("image", reference));
        }
        state.pushed.push(reference.to_string());
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for FakeRegistry {
    async fn save(&self, reference: &str, path: &Path, _compress: bool) -> Result<u64> {
        let mut state = self.record(format!("save {} {}", reference, path.display()))?;
        if !state.local.contains_key(reference) {
            return Err(not_found("image", reference));
        }
        state.saved.push(path.to_path_buf());
        Ok(1024)
    }

    async fn save_index(&self, index: &str, path: &Path, _compress: bool) -> Result<u64> {
        let mut state = self.record(format!("save_index {} {}", index, path.display()))?;
        if !state.local_indexes.contains_key(index) {
            return Err(not_found("index", index));
        }
        state.saved.push(path.to_path_buf());
        Ok(2048)
    }
}
