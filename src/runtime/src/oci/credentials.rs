//! Persistent credential store for container registries.
//!
//! `imgmigrate login` records one [`RegistryConfig`] per registry in
//! `<home>/auth/credentials.json` (see [`crate::home`]). Pushes consult it when
//! no explicit credentials were given for the destination registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use imgmigrate_core::config::RegistryConfig;
use imgmigrate_core::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};

/// On-disk format: normalized registry name → login.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    registries: BTreeMap<String, StoredLogin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredLogin {
    username: String,
    password: String,
    #[serde(default)]
    insecure: bool,
}

/// Registry logins persisted between runs.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Credential store at `<home>/auth/credentials.json`.
    pub fn default_path() -> Self {
        Self::new(crate::home::credentials_path())
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a login, replacing any previous one for the same registry.
    pub fn store(&self, login: &RegistryConfig) -> Result<()> {
        if login.url.trim().is_empty() {
            return Err(MigrateError::ConfigError(
                "registry server is required to store credentials".to_string(),
            ));
        }
        if !login.has_credentials() {
            return Err(MigrateError::ConfigError(
                "username and password are required".to_string(),
            ));
        }

        let mut file = self.load()?;
        file.registries.insert(
            normalize_registry(&login.url),
            StoredLogin {
                username: login.username.clone(),
                password: login.password.clone(),
                insecure: login.insecure,
            },
        );
        self.save(&file)
    }

    /// Look up the login for a registry.
    pub fn get(&self, registry: &str) -> Result<Option<RegistryConfig>> {
        let key = normalize_registry(registry);
        let file = self.load()?;
        Ok(file.registries.get(&key).map(|login| RegistryConfig {
            url: key.clone(),
            username: login.username.clone(),
            password: login.password.clone(),
            insecure: login.insecure,
        }))
    }

    /// Forget the login for a registry. Returns true if one existed.
    pub fn remove(&self, registry: &str) -> Result<bool> {
        let mut file = self.load()?;
        let removed = file
            .registries
            .remove(&normalize_registry(registry))
            .is_some();
        if removed {
            self.save(&file)?;
        }
        Ok(removed)
    }

    fn load(&self) -> Result<CredentialFile> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            MigrateError::Other(format!(
                "Failed to read credential store {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            MigrateError::Other(format!(
                "Failed to parse credential store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Write to a sibling temp file, then rename over the store.
    fn save(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(file)?)?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            MigrateError::Other(format!(
                "Failed to replace credential store {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

/// Normalize registry names; every Docker Hub alias maps to "index.docker.io".
pub(crate) fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    let r = r
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    if r == "docker.io" || r == "registry-1.docker.io" {
        "index.docker.io".to_string()
    } else {
        r.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn login(url: &str, username: &str, password: &str) -> RegistryConfig {
        RegistryConfig {
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            insecure: false,
        }
    }

    #[test]
    fn test_store_and_get() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));

        store.store(&login("registry.example.com", "admin", "secret")).unwrap();
        let found = store.get("registry.example.com").unwrap().unwrap();
        assert_eq!(found.username, "admin");
        assert_eq!(found.password, "secret");
        assert!(!found.insecure);
    }

    #[test]
    fn test_get_nonexistent() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        assert!(store.get("ghcr.io").unwrap().is_none());
    }

    #[test]
    fn test_overwrite_keeps_latest_login() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));

        store.store(&login("ghcr.io", "user1", "pass1")).unwrap();
        let mut second = login("ghcr.io", "user2", "pass2");
        second.insecure = true;
        store.store(&second).unwrap();

        let found = store.get("ghcr.io").unwrap().unwrap();
        assert_eq!(found.username, "user2");
        assert!(found.insecure);
    }

    #[test]
    fn test_store_rejects_incomplete_login() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));

        assert!(store.store(&login("ghcr.io", "user", "")).is_err());
        assert!(store.store(&login("", "user", "pass")).is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));

        store.store(&login("ghcr.io", "user", "pass")).unwrap();
        assert!(store.remove("ghcr.io").unwrap());
        assert!(!store.remove("ghcr.io").unwrap());
        assert!(store.get("ghcr.io").unwrap().is_none());
    }

    #[test]
    fn test_docker_hub_aliases() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));

        store.store(&login("docker.io", "user", "pass")).unwrap();
        assert!(store.get("index.docker.io").unwrap().is_some());
        assert!(store.get("registry-1.docker.io").unwrap().is_some());
    }

    #[test]
    fn test_scheme_and_case_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));

        store.store(&login("https://Registry.Example.com/", "u", "p")).unwrap();
        let found = store.get("registry.example.com").unwrap().unwrap();
        assert_eq!(found.url, "registry.example.com");
    }

    #[test]
    fn test_persistence_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth").join("credentials.json");

        CredentialStore::new(path.clone())
            .store(&login("quay.io", "user", "pass"))
            .unwrap();

        let found = CredentialStore::new(path).get("quay.io").unwrap();
        assert!(found.is_some());
    }
}
