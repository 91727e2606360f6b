//! `imgmigrate push` command.

use std::path::PathBuf;

use clap::Args;
use imgmigrate_core::config::RegistryConfig;
use imgmigrate_core::task::ReplicationTask;
use imgmigrate_runtime::ImageReference;

use super::PlatformArgs;

#[derive(Args)]
pub struct PushArgs {
    /// Source image reference
    #[arg(short, long)]
    pub source: String,

    /// Destination image reference (e.g., "registry.example.com/mirror/nginx:1.25")
    #[arg(short, long)]
    pub target: String,

    /// Registry the credentials below apply to (default: the target's registry)
    #[arg(short, long)]
    pub registry: Option<String>,

    /// Registry username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Registry password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Use plain HTTP for the registry
    #[arg(long)]
    pub insecure: bool,

    /// Also save each platform to disk
    #[arg(long)]
    pub save: bool,

    /// Directory for the saved archives
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Write .tar.gz instead of .tar
    #[arg(short = 'z', long)]
    pub compress: bool,

    #[command(flatten)]
    pub platforms: PlatformArgs,
}

impl PushArgs {
    pub fn to_task(&self) -> ReplicationTask {
        let task = self
            .platforms
            .apply(ReplicationTask::new(&self.source))
            .with_target(&self.target);
        if self.save {
            task.persist_to(&self.output, self.compress)
        } else {
            task
        }
    }

    /// Explicit registry settings, if any flag asks for them.
    pub fn registry_config(&self) -> Result<Option<RegistryConfig>, Box<dyn std::error::Error>> {
        if self.username.is_none() && self.password.is_none() && !self.insecure {
            return Ok(None);
        }

        let url = match &self.registry {
            Some(url) => url.clone(),
            None => ImageReference::parse(&self.target)?.registry,
        };

        Ok(Some(RegistryConfig {
            url,
            username: self.username.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            insecure: self.insecure,
        }))
    }
}

pub async fn execute(args: PushArgs) -> Result<(), Box<dyn std::error::Error>> {
    let task = args.to_task();
    let registry = args.registry_config()?;

    println!("Replicating {} to {}...", task.source, args.target);
    super::run_task(&task, registry).await?;

    Ok(())
}
