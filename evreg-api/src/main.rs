use std::env;

use anyhow::{Context, anyhow};
use tracing::{error, info};

use evreg_api::{config::ApiConfig, startup::Application};
use evreg_config::{load_config, shared::PgConnectionConfig};
use evreg_telemetry::tracing::init_tracing;

/// Entry point for the evreg API service.
fn main() -> anyhow::Result<()> {
    // Initialize tracing from the binary name
    init_tracing(env!("CARGO_BIN_NAME"))?;

    // We start the runtime.
    actix_web::rt::System::new().block_on(async_main())?;

    Ok(())
}

/// Supports two modes: server mode (no arguments) and migration mode
/// (`migrate` argument).
async fn async_main() -> anyhow::Result<()> {
    let mut args = env::args();
    match args.len() {
        // Run the application server
        1 => {
            let config = load_config::<ApiConfig>()
                .context("loading API configuration for server startup")?;
            config.validate()?;
            log_pg_connection_config(&config.database);

            let application = Application::build(config).await?;
            info!(port = application.port(), "starting API server");
            application.run_until_stopped().await?;
        }
        2 => {
            let command = args.nth(1).unwrap();
            match command.as_str() {
                "migrate" => {
                    let config = load_config::<ApiConfig>()
                        .context("loading configuration for migrations")?;
                    log_pg_connection_config(&config.database);
                    Application::migrate_database(config.database).await?;
                    info!("database migrated successfully");
                }
                _ => {
                    error!(%command, "invalid command");
                    return Err(anyhow!("invalid command: {command}"));
                }
            }
        }
        _ => {
            error!("invalid number of command line arguments");
            return Err(anyhow!("invalid number of command line arguments"));
        }
    }

    Ok(())
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    info!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        require_tls = config.require_tls,
        "pg database options",
    );
}
