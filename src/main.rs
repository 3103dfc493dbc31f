// File: src/main.rs
// Fabric block inspector: CLI table/JSON view, web explorer and demo block generator

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use fabric_block_inspector::{cli_interface, data_models::AppConfig, logging, samples, web_server};

/// Command-line interface for the Fabric block inspector
#[derive(Parser)]
#[command(name = "fabric-block-inspector")]
#[command(about = "Decode Hyperledger Fabric blocks into flat transaction records")]
#[command(version)]
pub struct Cli {
    /// Block file, or directory of *.block / *.pb files (raw common.Block encoding)
    #[arg(short = 'p', long, value_name = "BLOCKS_PATH")]
    pub blocks: PathBuf,

    /// Log level or filter directive (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Interface mode selection
    #[command(subcommand)]
    pub mode: InterfaceMode,
}

#[derive(Subcommand)]
pub enum InterfaceMode {
    /// Print decoded blocks as a table, or a single block in detail
    Cli {
        /// Show last N blocks
        #[arg(short, long, default_value = "10")]
        count: usize,

        /// Show specific block with transaction details
        #[arg(short, long)]
        detail: Option<u64>,

        /// Show blocks in range (format: start-end)
        #[arg(short, long)]
        range: Option<String>,

        /// Print decoded summaries as JSON instead of tables
        #[arg(short, long)]
        json: bool,
    },

    /// Web server with block explorer API and live updates (axum + WebSocket)
    Web {
        /// Server port
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Bind address
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,

        /// Enable CORS for development
        #[arg(short, long)]
        cors: bool,
    },

    /// Write demo block files into the blocks directory
    Demo {
        /// Number of blocks to generate
        #[arg(short, long, default_value = "5")]
        count: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let config = AppConfig {
        blocks_path: cli.blocks,
    };

    match cli.mode {
        InterfaceMode::Cli { count, detail, range, json } => {
            if !config.blocks_path.exists() {
                anyhow::bail!("Blocks path does not exist: {:?}", config.blocks_path);
            }
            cli_interface::run_cli_mode(&config, count, detail, range, json).await
        },

        InterfaceMode::Web { port, bind, cors } => {
            if !config.blocks_path.exists() {
                warn!("Blocks path does not exist: {:?}, writing demo blocks", config.blocks_path);
                samples::write_demo_blocks(&config.blocks_path, 5)?;
            }
            web_server::run_web_mode(&config, &bind, port, cors).await
        },

        InterfaceMode::Demo { count } => {
            let written = samples::write_demo_blocks(&config.blocks_path, count)?;
            info!("Wrote {} demo blocks to {}", written.len(), config.blocks_path.display());
            Ok(())
        },
    }
}
