use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pagewarm_core::config::{AppConfig, LogFormat};

mod app;
mod args;
mod commands;
mod error;
mod format;

use args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(cli.config.as_deref())?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    match cli.log_format.map(LogFormat::from).unwrap_or(config.log_format) {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }

    tracing::debug!(command = ?cli.command, "starting pagewarm");

    let app = app::App::build(config).await?;
    let mut stdout = std::io::stdout();
    commands::run(&app, cli.command, &mut stdout).await
}
