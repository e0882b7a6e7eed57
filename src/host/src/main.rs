//! Shellmesh Host - Main Binary
//!
//! Loads remote modules into named mount points for the current session:
//! - Manifest or development-table discovery
//! - Role-gated loading
//! - Mock or externally supplied identity tokens

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shellmesh_authz::{IdentityProvider, MockIdentityProvider, StaticTokenProvider};
use shellmesh_federation::manifest::HttpManifestTransport;
use shellmesh_federation::RemoteComponent;
use shellmesh_host::{builtin, HostConfig, Mode, MountState, Shell};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Shellmesh host CLI
#[derive(Parser)]
#[command(name = "shellmesh-host")]
#[command(about = "Shellmesh host - role-gated runtime module composition")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "shellmesh.toml", env = "SHELLMESH_CONFIG")]
    config: PathBuf,

    /// Manifest URL (overrides config)
    #[arg(long, env = "SHELLMESH_MANIFEST_URL")]
    manifest_url: Option<String>,

    /// Resolution mode (overrides config)
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Session token from the identity provider
    #[arg(long, env = "SHELLMESH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List modules visible to the current session
    Modules,

    /// Load a module export and print its rendered view
    Load {
        /// Logical module name
        name: String,

        /// Export path inside the remote
        #[arg(default_value = "./App")]
        export: String,

        /// Roles that grant access (any one suffices)
        #[arg(long = "require", value_delimiter = ',')]
        required: Vec<String>,
    },

    /// Show the current session and derived roles
    Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},shellmesh_host=debug", log_level).into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut config = HostConfig::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // Apply CLI overrides
    if let Some(url) = cli.manifest_url {
        config.manifest_url = url;
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }

    let identity: Box<dyn IdentityProvider> = if config.use_mock_auth {
        warn!(sub = %config.mock_user.sub, "using mock authentication");
        Box::new(MockIdentityProvider::new(config.mock_claims()).with_ttl(config.mock_ttl()))
    } else {
        Box::new(StaticTokenProvider::new(cli.token))
    };

    let transport = Arc::new(
        HttpManifestTransport::new(config.manifest_timeout())
            .context("Failed to build manifest HTTP client")?,
    );
    let shell = Shell::start(
        &config,
        transport,
        Arc::new(builtin::catalog()),
        identity.as_ref(),
        &[],
    )
    .await?;

    match cli.command {
        Command::Whoami => {
            let view = builtin::SessionPanel.render(&shell.auth_context())?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Modules => {
            let modules = shell.visible_modules().await?;
            for module in &modules {
                let title = if module.display_name.is_empty() {
                    module.name.as_str()
                } else {
                    module.display_name.as_str()
                };
                println!("{:<24} {:<40} {}", module.name, title, module.url);
            }
            if modules.is_empty() {
                println!("No modules visible to this session");
            }
        }
        Command::Load {
            name,
            export,
            required,
        } => {
            let state = shell.mount("main", &name, &export, required.as_slice()).await;
            println!("{}", serde_json::to_string_pretty(&shell.render("main")?)?);
            if !matches!(state, MountState::Ready(_)) {
                anyhow::bail!("'{}' could not be mounted ({})", name, state.label());
            }
        }
    }

    Ok(())
}
