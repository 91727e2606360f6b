//! CLI command definitions and dispatch.

mod from_config;
mod login;
mod logout;
mod pull;
mod push;

use clap::{Args, Parser, Subcommand};
use imgmigrate_core::config::{RegistryConfig, DEFAULT_OS};
use imgmigrate_core::task::{ReplicationResult, ReplicationTask};
use imgmigrate_runtime::{Backends, ReplicationOrchestrator};

/// imgmigrate: replicate multi-platform container images.
#[derive(Parser)]
#[command(name = "imgmigrate", version, about)]
pub struct Cli {
    /// Log progress (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Pull every selected platform of an image and save it to disk
    Pull(pull::PullArgs),
    /// Pull every selected platform of an image and push it to another registry
    Push(push::PushArgs),
    /// Run the tasks listed in a YAML configuration file
    FromConfig(from_config::FromConfigArgs),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
}

/// Platform selection flags shared by `pull` and `push`.
#[derive(Args, Debug, Clone)]
pub struct PlatformArgs {
    /// Architectures to replicate, matched by substring (e.g., "amd64,arm64,arm/v7")
    #[arg(short, long = "arch", value_delimiter = ',', default_values = ["amd64", "arm64"])]
    pub architectures: Vec<String>,

    /// Operating systems to replicate
    #[arg(long = "os", value_delimiter = ',', default_values = [DEFAULT_OS])]
    pub operating_systems: Vec<String>,

    /// Replicate every architecture the image provides
    #[arg(long)]
    pub all_arch: bool,

    /// Assemble a multi-platform index from the replicated platforms
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub create_multi_arch: bool,
}

impl PlatformArgs {
    /// Apply the selection flags to a task.
    pub fn apply(&self, task: ReplicationTask) -> ReplicationTask {
        task.with_architectures(self.architectures.iter().cloned())
            .with_operating_systems(self.operating_systems.iter().cloned())
            .select_all(self.all_arch)
            .assemble_index(self.create_multi_arch)
    }
}

/// Run one task against the registry-backed stores and print its result.
pub(crate) async fn run_task(
    task: &ReplicationTask,
    registry: Option<RegistryConfig>,
) -> Result<ReplicationResult, Box<dyn std::error::Error>> {
    let orchestrator = ReplicationOrchestrator::new(Backends::local(registry)?);
    let result = orchestrator.run(task).await?;
    crate::output::print_result(&task.source, &result);
    Ok(result)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Pull(args) => pull::execute(args).await,
        Command::Push(args) => push::execute(args).await,
        Command::FromConfig(args) => from_config::execute(args).await,
        Command::Login(args) => login::execute(args).await,
        Command::Logout(args) => logout::execute(args).await,
    }
}
