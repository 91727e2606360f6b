//! `imgmigrate login` command - Store registry credentials.

use std::io::BufRead;

use clap::Args;
use imgmigrate_core::config::RegistryConfig;
use imgmigrate_runtime::CredentialStore;

#[derive(Args)]
pub struct LoginArgs {
    /// Registry server (default: index.docker.io)
    pub server: Option<String>,

    /// Username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Read password from stdin
    #[arg(long)]
    pub password_stdin: bool,

    /// Reach this registry over plain HTTP
    #[arg(long)]
    pub insecure: bool,
}

fn prompt(label: &str) -> std::io::Result<String> {
    if !label.is_empty() {
        eprint!("{label}: ");
    }
    let mut input = String::new();
    std::io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

pub async fn execute(args: LoginArgs) -> Result<(), Box<dyn std::error::Error>> {
    let server = args.server.unwrap_or_else(|| "index.docker.io".to_string());

    let username = match args.username {
        Some(u) => u,
        None => prompt("Username")?,
    };

    let password = if args.password_stdin {
        prompt("")?
    } else {
        match args.password {
            Some(p) => p,
            None => prompt("Password")?,
        }
    };

    let login = RegistryConfig {
        url: server,
        username,
        password,
        insecure: args.insecure,
    };
    if !login.has_credentials() {
        return Err("Username and password are required".into());
    }

    CredentialStore::default_path().store(&login)?;

    println!("Login Succeeded");
    Ok(())
}
