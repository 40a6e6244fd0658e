//! StreamLens CLI entry point.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use streamlens::cli::{commands, Cli, Commands};
use streamlens::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(Settings::default_config_path);
    let settings = Settings::load_from(Some(&config_path))?;

    // -v flags win over general.log_level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr; stdout carries the NDJSON stream.
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("streamlens={}", log_level)),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    std::fs::create_dir_all(settings.data_dir())?;

    match &cli.command {
        Commands::Serve { host, port } => {
            commands::run_serve(host.clone(), *port, settings).await?;
        }

        Commands::Invoke {
            prompt,
            session,
            user,
            timezone,
            last_k,
        } => {
            commands::run_invoke(
                prompt,
                session.clone(),
                user.clone(),
                timezone.clone(),
                *last_k,
                settings,
            )
            .await?;
        }

        Commands::Audit { limit, id } => {
            commands::run_audit(*limit, id.as_deref(), &settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, config_path)?;
        }
    }

    Ok(())
}
