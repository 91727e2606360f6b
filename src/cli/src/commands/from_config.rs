//! `imgmigrate from-config` command - run a batch of tasks from YAML.

use std::path::PathBuf;

use clap::Args;
use imgmigrate_core::config::BatchConfig;
use imgmigrate_runtime::{Backends, ReplicationOrchestrator};

#[derive(Args)]
pub struct FromConfigArgs {
    /// Configuration file to run
    #[arg(short, long, required_unless_present = "generate")]
    pub file: Option<PathBuf>,

    /// Write a sample configuration file to this path and exit
    #[arg(short, long, conflicts_with = "file")]
    pub generate: Option<PathBuf>,
}

pub async fn execute(args: FromConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = args.generate {
        BatchConfig::write_sample(&path)?;
        println!("Sample configuration written to {}", path.display());
        return Ok(());
    }

    let Some(file) = args.file else {
        return Err("a configuration file is required (--file)".into());
    };

    let config = BatchConfig::load(&file)?;
    let tasks = config.tasks();
    tracing::info!(file = %file.display(), tasks = tasks.len(), "Loaded configuration");
    if tasks.is_empty() {
        println!("No images configured in {}", file.display());
        return Ok(());
    }

    let orchestrator = ReplicationOrchestrator::new(Backends::local(config.registry.clone())?);
    let report = orchestrator.run_batch(&tasks).await;
    crate::output::print_batch(&report);

    if report.has_failures() {
        return Err(format!(
            "{} of {} tasks failed",
            report.failure_count(),
            report.reports.len()
        )
        .into());
    }
    Ok(())
}
