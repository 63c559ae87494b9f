use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sample_inventory::config::InventoryConfig;
use sample_inventory::db::XlsxBackend;
use sample_inventory::inventory::{MAX_LABELS, RowStore, build_label_codes};
use sample_inventory::settings::Settings;
use sample_inventory::web::{AppState, start_server};

const DEFAULT_LOG_FILTER: &str = "sample_inventory=info,tower_http=info";

#[derive(Parser)]
#[command(
    name = "sample-inventory",
    version,
    about = "Sample intake ledger backed by a single .xlsx workbook."
)]
struct Cli {
    /// Settings file (TOML). Environment variables override its values.
    #[arg(long, global = true, env = "SAMPLE_INVENTORY_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the workbook with the canonical header row, or repair its headers.
    Init,
    /// Print the label codes expanded from a sample number.
    Labels {
        base: String,
        #[arg(default_value_t = 1)]
        quantity: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let settings = Settings::load(cli.config.as_deref())?;
    let mut config = InventoryConfig::resolve(&settings)?;
    let store = RowStore::new(Arc::new(XlsxBackend::new(&config.workbook_path)));

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
                .parse()
                .with_context(|| {
                    format!(
                        "invalid listen address {}:{}",
                        config.server.host, config.server.port
                    )
                })?;

            store
                .ensure_workbook()
                .await
                .context("failed to open ledger workbook")?;
            tracing::info!("Ledger workbook: {}", config.workbook_path.display());

            let state = Arc::new(AppState::new(store, config));
            start_server(addr, state.clone()).await?;

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            state.shutdown().await;
        }
        Command::Init => {
            let workbook = store.ensure_workbook().await?;
            // Header repairs are only persisted on write.
            store.backend().save(&workbook).await?;
            println!("{}", config.workbook_path.display());
        }
        Command::Labels { base, quantity } => {
            if quantity > MAX_LABELS {
                anyhow::bail!("quantity {quantity} exceeds the label limit of {MAX_LABELS}");
            }
            for code in build_label_codes(&base, quantity) {
                println!("{code}");
            }
        }
    }

    Ok(())
}
