//! Batch configuration file (YAML).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::task::ReplicationTask;

/// Operating system assumed when a config entry lists none.
pub const DEFAULT_OS: &str = "linux";

/// Batch configuration: optional registry credentials and a list of image tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Credentials for the destination registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryConfig>,

    /// Image tasks, processed in order
    #[serde(rename = "images", default)]
    pub images: Vec<ImageTaskConfig>,
}

/// Registry credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry host the credentials belong to (e.g., "registry.example.com")
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Talk plain HTTP to this registry
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
}

impl RegistryConfig {
    /// Whether both username and password are present.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// One image entry of the batch file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTaskConfig {
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_architectures: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub save: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub compress: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operating_systems: Vec<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_multi_arch: bool,
}

impl ImageTaskConfig {
    /// Build the replication task this entry describes.
    pub fn to_task(&self) -> ReplicationTask {
        let operating_systems = if self.operating_systems.is_empty() {
            vec![DEFAULT_OS.to_string()]
        } else {
            self.operating_systems.clone()
        };

        let mut task = ReplicationTask::new(self.source.clone())
            .with_target(self.target.clone().unwrap_or_default())
            .with_architectures(self.architectures.iter().cloned())
            .with_operating_systems(operating_systems)
            .select_all(self.all_architectures)
            .assemble_index(self.create_multi_arch);

        if self.save {
            let dir = self.output_dir.clone().unwrap_or_else(|| ".".to_string());
            task = task.persist_to(dir, self.compress);
        }
        task
    }
}

impl BatchConfig {
    /// Load a batch configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&data).map_err(|e| {
            MigrateError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Tasks in file order.
    pub fn tasks(&self) -> Vec<ReplicationTask> {
        self.images.iter().map(ImageTaskConfig::to_task).collect()
    }

    /// An example configuration covering a local save and a registry push.
    pub fn sample() -> Self {
        Self {
            registry: Some(RegistryConfig {
                url: "registry.example.com".to_string(),
                username: "username".to_string(),
                password: "password".to_string(),
                insecure: false,
            }),
            images: vec![
                ImageTaskConfig {
                    source: "nginx:latest".to_string(),
                    all_architectures: true,
                    save: true,
                    output_dir: Some("./output".to_string()),
                    compress: true,
                    operating_systems: vec![DEFAULT_OS.to_string()],
                    create_multi_arch: true,
                    ..Default::default()
                },
                ImageTaskConfig {
                    source: "ubuntu:latest".to_string(),
                    target: Some("registry.example.com/ubuntu:v1".to_string()),
                    architectures: vec!["amd64".to_string(), "arm64".to_string()],
                    operating_systems: vec![DEFAULT_OS.to_string()],
                    create_multi_arch: true,
                    ..Default::default()
                },
            ],
        }
    }

    /// Write the sample configuration to `path`.
    pub fn write_sample(path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(&Self::sample())?;
        std::fs::write(path, data).map_err(|e| {
            MigrateError::ConfigError(format!(
                "Failed to write sample config {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::info!(path = %path.display(), "Sample configuration written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
registry:
  url: registry.example.com
  username: admin
  password: secret
  insecure: true
images:
  - source: nginx:1.25
    all_architectures: true
    save: true
    output_dir: ./out
    compress: true
  - source: ubuntu:22.04
    target: registry.example.com/ubuntu:v1
    architectures: [amd64, arm]
    operating_systems: [linux, windows]
    create_multi_arch: true
"#;

    #[test]
    fn test_parse_config() {
        let config = BatchConfig::from_yaml(CONFIG).unwrap();
        let registry = config.registry.as_ref().unwrap();
        assert_eq!(registry.url, "registry.example.com");
        assert!(registry.insecure);
        assert!(registry.has_credentials());
        assert_eq!(config.images.len(), 2);
        assert_eq!(config.images[1].architectures, vec!["amd64", "arm"]);
    }

    #[test]
    fn test_save_entry_to_task() {
        let config = BatchConfig::from_yaml(CONFIG).unwrap();
        let task = config.images[0].to_task();
        assert_eq!(task.source, "nginx:1.25");
        assert!(task.persist);
        assert!(task.compress);
        assert!(task.select_all);
        assert_eq!(task.persist_dir, std::path::PathBuf::from("./out"));
        assert_eq!(task.operating_systems, vec![DEFAULT_OS]);
        assert_eq!(task.target, None);
        assert!(!task.assemble_index);
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_push_entry_to_task() {
        let config = BatchConfig::from_yaml(CONFIG).unwrap();
        let task = config.images[1].to_task();
        assert_eq!(task.target.as_deref(), Some("registry.example.com/ubuntu:v1"));
        assert!(!task.persist);
        assert!(task.assemble_index);
        assert_eq!(task.operating_systems, vec!["linux", "windows"]);
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_entry_without_destination_fails_validation() {
        let config = BatchConfig::from_yaml("images:\n  - source: alpine\n    all_architectures: true\n").unwrap();
        let tasks = config.tasks();
        assert!(matches!(
            tasks[0].validate(),
            Err(MigrateError::ConfigError(_))
        ));
    }

    #[test]
    fn test_empty_config() {
        let config = BatchConfig::from_yaml("{}").unwrap();
        assert!(config.registry.is_none());
        assert!(config.tasks().is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(BatchConfig::from_yaml("images: [unclosed").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = BatchConfig::load(Path::new("/nonexistent/imgmigrate.yaml")).unwrap_err();
        assert!(matches!(err, MigrateError::ConfigError(_)));
    }

    #[test]
    fn test_sample_roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.yaml");
        BatchConfig::write_sample(&path).unwrap();

        let loaded = BatchConfig::load(&path).unwrap();
        assert_eq!(loaded, BatchConfig::sample());
        assert!(loaded.tasks().iter().all(|t| t.validate().is_ok()));
    }
}
