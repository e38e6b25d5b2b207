mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;

use realmsync_core::{AdminClient, DockerTopology, Reconciler};

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Before parsing, so dotenv values feed the env-backed flags
    let dotenv_files = config::load_dotenv();

    if let Err(e) = run(dotenv_files).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(dotenv_files: Vec<std::path::PathBuf>) -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(&cli.log_level);
    for path in &dotenv_files {
        tracing::debug!(path = %path.display(), "loaded dotenv file");
    }

    if matches!(&cli.command, Commands::Delete(args) if !args.yes) {
        anyhow::bail!("Refusing to delete realms without --yes");
    }

    let file = config::load_file_config(cli.config.as_deref())?;
    let settings = config::resolve_settings(&cli, file)?;
    tracing::debug!(?settings, "settings resolved");

    let client = AdminClient::authenticate(&settings.connection)
        .await
        .with_context(|| format!("Cannot authenticate against {}", settings.connection.base_url))?;
    let topology = DockerTopology::new(&settings.network);
    let reconciler = Reconciler::new(&client, &topology, &settings);

    match &cli.command {
        Commands::Sync => commands::sync::sync(&reconciler).await?,
        Commands::Plan(args) => commands::sync::plan(&reconciler, args.documents).await?,
        Commands::Ensure => commands::realms::ensure(&reconciler).await?,
        Commands::Delete(_) => commands::realms::delete(&reconciler).await?,
        Commands::TrustedHosts(args) => {
            commands::trusted_hosts::trusted_hosts(&client, &reconciler, args).await?
        }
        Commands::Fixture(args) => {
            commands::fixture::fixture(&reconciler, &args.realm, &settings.fixture.username).await?
        }
    }

    Ok(())
}
