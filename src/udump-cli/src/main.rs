mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "udump=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            dump,
            base,
            config,
            output,
        } => {
            commands::generate::handle(&dump, base, &config, &output)?;
        }

        Commands::Info { project } => {
            commands::info::handle(&project)?;
        }

        Commands::Layout { project, name } => {
            commands::layout::handle(&project, &name)?;
        }

        Commands::Names { project, filter } => {
            commands::names::handle(&project, filter.as_deref())?;
        }
    }

    Ok(())
}
