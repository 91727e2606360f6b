//! Workspace home directory layout.

use std::path::PathBuf;

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "IMGMIGRATE_HOME";

/// Get the imgmigrate home directory (`$IMGMIGRATE_HOME`, else `~/.imgmigrate`).
pub fn imgmigrate_home() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV) {
        if !home.is_empty() {
            return PathBuf::from(home);
        }
    }

    dirs::home_dir()
        .map(|h| h.join(".imgmigrate"))
        .unwrap_or_else(|| PathBuf::from(".imgmigrate"))
}

/// Credential file (`<home>/auth/credentials.json`).
pub fn credentials_path() -> PathBuf {
    imgmigrate_home().join("auth").join("credentials.json")
}
