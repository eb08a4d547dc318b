use anyhow::Result;
use clap::{Parser, Subcommand};
use surveys_core::{config::Config, migration, server, telemetry};
use tracing::info;

/// Surveys service
#[derive(Parser)]
#[command(name = "surveys-core", version)]
#[command(about = "Tenant-scoped surveys, responses and configs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create the database if missing and apply migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let prometheus_handle = telemetry::init(&config.telemetry);

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(version = env!("CARGO_PKG_VERSION"), "Starting Surveys Core Service");
            server::run(config, prometheus_handle).await
        }
        Command::Migrate => migration::run_migrations(&config).await,
    };

    telemetry::shutdown();
    result
}
