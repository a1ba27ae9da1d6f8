mod archive;
mod cli;
mod config;
mod jobs;
mod story;
mod translate;
mod utils;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Translate(args) => translate::run(args).await?,
        Commands::Text(args) => translate::run_text(args).await?,
        Commands::Estimate(args) => translate::estimate(args)?,
        Commands::Languages => translate::list_languages(),
        Commands::Config(args) => config::commands::run(args)?,
    }

    Ok(())
}
