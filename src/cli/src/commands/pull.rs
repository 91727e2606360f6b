//! `imgmigrate pull` command.

use std::path::PathBuf;

use clap::Args;
use imgmigrate_core::task::ReplicationTask;

use super::PlatformArgs;

#[derive(Args)]
pub struct PullArgs {
    /// Source image reference (e.g., "nginx:1.25", "ghcr.io/org/image:tag")
    #[arg(short, long)]
    pub source: String,

    /// Directory for the saved archives
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Write .tar.gz instead of .tar
    #[arg(short = 'z', long)]
    pub compress: bool,

    #[command(flatten)]
    pub platforms: PlatformArgs,
}

impl PullArgs {
    pub fn to_task(&self) -> ReplicationTask {
        self.platforms
            .apply(ReplicationTask::new(&self.source))
            .persist_to(&self.output, self.compress)
    }
}

pub async fn execute(args: PullArgs) -> Result<(), Box<dyn std::error::Error>> {
    let task = args.to_task();

    println!("Pulling {}...", task.source);
    super::run_task(&task, None).await?;

    Ok(())
}
