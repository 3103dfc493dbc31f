// File: src/cli_interface.rs
// CLI interface: block tables, block detail and JSON output

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::block_store::{BlockFilter, BlockStore, load_blocks};
use crate::data_models::AppConfig;
use crate::model::{BlockSummary, Tx};

/// Execute CLI mode operations
pub async fn run_cli_mode(
    config: &AppConfig,
    count: usize,
    detail: Option<u64>,
    range: Option<String>,
    json: bool,
) -> Result<()> {
    let store = load_blocks(&config.blocks_path)?;
    report_load_problems(&store);

    match detail {
        Some(height) => show_block_detail(&store, height, json),
        None => show_block_list(&store, count, range, json),
    }
}

/// Display detailed information for a specific block
fn show_block_detail(store: &BlockStore, height: u64, json: bool) -> Result<()> {
    let block = store
        .get(height)
        .ok_or_else(|| anyhow::anyhow!("Block {} not found", height))?;

    if json {
        println!("{}", serde_json::to_string_pretty(block)?);
    } else {
        print_block_detail(block);
    }
    Ok(())
}

/// Display a list of blocks based on filter criteria
fn show_block_list(store: &BlockStore, count: usize, range: Option<String>, json: bool) -> Result<()> {
    let filter = create_block_filter(count, range)?;
    let blocks = store.filter(filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&blocks)?);
        return Ok(());
    }

    if blocks.is_empty() {
        println!("No blocks found matching the criteria.");
        return Ok(());
    }

    print_blocks_table(&blocks);
    print_block_statistics(&blocks);
    Ok(())
}

fn report_load_problems(store: &BlockStore) {
    for path in &store.skipped {
        eprintln!("⏭  Skipped genesis block: {}", path.display());
    }
    for failure in &store.failures {
        eprintln!("❌ {}: {}", failure.path.display(), failure.error);
    }
}

/// Create appropriate block filter from CLI arguments
fn create_block_filter(count: usize, range: Option<String>) -> Result<BlockFilter> {
    match range {
        Some(range_str) => parse_range_filter(&range_str),
        None => Ok(BlockFilter::LastN(count)),
    }
}

/// Parse range string into BlockFilter
fn parse_range_filter(range_str: &str) -> Result<BlockFilter> {
    let parts: Vec<&str> = range_str.split('-').collect();
    if parts.len() != 2 {
        anyhow::bail!("Invalid range format. Use: start-end (e.g., 100-110)");
    }

    let start = parts[0].trim().parse::<u64>()?;
    let end = parts[1].trim().parse::<u64>()?;

    if start > end {
        anyhow::bail!("Start height must be <= end height");
    }

    Ok(BlockFilter::Range(start, end))
}

/// Print blocks in a formatted table
fn print_blocks_table(blocks: &[&BlockSummary]) {
    println!();
    print_table_header();
    print_table_separator();

    for (i, block) in blocks.iter().enumerate() {
        println!("│ {:>8} │ {:>5} │ {:>5} │ {:<23} │ {:<64} │ {:>10} │",
            block.height,
            block.transactions.len(),
            block.valid_transaction_count(),
            format_timestamp(block.timestamp),
            block.data_hash,
            calculate_interval(blocks, i)
        );
    }

    print_table_footer();
}

fn print_table_header() {
    println!("╭─{:─<8}─┬─{:─<5}─┬─{:─<5}─┬─{:─<23}─┬─{:─<64}─┬─{:─<10}─╮", "", "", "", "", "", "");
    println!("│ {:^8} │ {:^5} │ {:^5} │ {:^23} │ {:^64} │ {:^10} │",
        "Height", "Txs", "Valid", "Timestamp", "Data Hash", "Interval");
}

fn print_table_separator() {
    println!("├─{:─<8}─┼─{:─<5}─┼─{:─<5}─┼─{:─<23}─┼─{:─<64}─┼─{:─<10}─┤", "", "", "", "", "", "");
}

fn print_table_footer() {
    println!("╰─{:─<8}─┴─{:─<5}─┴─{:─<5}─┴─{:─<23}─┴─{:─<64}─┴─{:─<10}─╯", "", "", "", "", "", "");
}

/// Time between a block's last transaction and the previous block's
fn calculate_interval(blocks: &[&BlockSummary], index: usize) -> String {
    if index == 0 {
        return "─".to_string();
    }

    match (blocks[index - 1].timestamp, blocks[index].timestamp) {
        (Some(prev), Some(curr)) => {
            let diff = (curr - prev).num_seconds();
            if diff > 0 { format_duration(diff) } else { "⚠ -time".to_string() }
        }
        _ => "─".to_string(),
    }
}

/// Print block statistics summary
fn print_block_statistics(blocks: &[&BlockSummary]) {
    let total: usize = blocks.iter().map(|b| b.transactions.len()).sum();
    let valid: usize = blocks.iter().map(|b| b.valid_transaction_count()).sum();

    println!();
    println!("📊 Transactions: {} total, {} valid, {} invalid", total, valid, total - valid);

    let intervals = calculate_valid_intervals(blocks);
    if let (Some(min), Some(max)) = (intervals.iter().min(), intervals.iter().max()) {
        let avg = intervals.iter().sum::<i64>() / intervals.len() as i64;
        println!("📊 Block Intervals: avg {}, min {}, max {}",
            format_duration(avg),
            format_duration(*min),
            format_duration(*max)
        );
    }
}

fn calculate_valid_intervals(blocks: &[&BlockSummary]) -> Vec<i64> {
    blocks.windows(2)
        .filter_map(|pair| Some((pair[1].timestamp? - pair[0].timestamp?).num_seconds()))
        .filter(|&diff| diff > 0)
        .collect()
}

fn format_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "─".to_string())
}

/// Format duration in seconds to human-readable string
fn format_duration(seconds: i64) -> String {
    match seconds {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => {
            let mins = s / 60;
            let secs = s % 60;
            if secs == 0 { format!("{}m", mins) } else { format!("{}m {}s", mins, secs) }
        },
        s => {
            let hours = s / 3600;
            let mins = (s % 3600) / 60;
            format!("{}h {}m", hours, mins)
        }
    }
}

/// Print detailed block information
fn print_block_detail(block: &BlockSummary) {
    println!();
    println!("🔍 Block Detail View");

    print_block_header(block);
    for (i, tx) in block.transactions.iter().enumerate() {
        print_transaction(i, tx);
    }

    println!("╰─{:─<70}─╯", "");
}

fn print_block_header(block: &BlockSummary) {
    println!("╭─{:─<70}─╮", "");
    println!("│ Height: {:>8}  Transactions: {:>4} ({} valid)", block.height,
        block.transactions.len(), block.valid_transaction_count());
    println!("│ Timestamp: {}", format_timestamp(block.timestamp));
    println!("│ Data Hash: {}", truncate_hash(&block.data_hash, 58));
    println!("│ Previous Hash: {}", truncate_hash(&block.previous_hash, 54));
    println!("├─{:─<70}─┤", "");
}

fn print_transaction(index: usize, tx: &Tx) {
    println!("│ #{} {} [{}]", index, truncate_hash(&tx.id, 24), tx.validation_code);
    println!("│   Channel: {}  Type: {}  Creator: {}", tx.channel_id, tx.header_type, tx.msp_id);
    println!("│   Time: {}", tx.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("│   Chaincode: {}:{} ({}){}", tx.chaincode_name, tx.chaincode_version,
        tx.chaincode_type, if tx.is_init { " init" } else { "" });
    println!("│   Args: {:?}", tx.input_args);

    if !tx.transient_map.is_empty() {
        let keys: Vec<&str> = tx.transient_map.keys().map(String::as_str).collect();
        println!("│   Transient keys: {:?}", keys);
    }
    if let Some(response) = &tx.response {
        println!("│   Response: {} {}", response.status, response.message);
    }
    if !tx.event_name.is_empty() {
        println!("│   Event: {} ({} bytes)", tx.event_name, tx.event_payload.len());
    }
    println!("├─{:─<70}─┤", "");
}

/// Truncate hash string to specified length
fn truncate_hash(hash: &str, max_len: usize) -> String {
    hash.chars().take(max_len).collect()
}
