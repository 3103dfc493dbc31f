// File: src/logging.rs
// Tracing subscriber setup

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with the given level directive.
///
/// `RUST_LOG` takes precedence when set. Logs go to stderr so that table and
/// JSON output on stdout stays clean for piping.
///
/// # Arguments
/// * `level` - Log level or filter directive (e.g. `info`, `fabric_block_inspector=debug`)
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|e| {
            eprintln!("Invalid log level '{}': {}. Falling back to 'info'", level, e);
            EnvFilter::new("info")
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}
