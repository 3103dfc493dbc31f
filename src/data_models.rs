// File: src/data_models.rs
// Shared data structures for the CLI and Web interfaces

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::BlockSummary;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// A block file, or a directory of `*.block` / `*.pb` files
    pub blocks_path: PathBuf,
}

/// Block overview for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockInfo {
    pub height: u64,
    pub data_hash: String,
    pub previous_hash: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub transaction_count: usize,
    pub valid_transaction_count: usize,
    pub interval_seconds: Option<i64>,
}

impl From<&BlockSummary> for BlockInfo {
    fn from(block: &BlockSummary) -> Self {
        Self {
            height: block.height,
            data_hash: block.data_hash.clone(),
            previous_hash: block.previous_hash.clone(),
            timestamp: block.timestamp,
            transaction_count: block.transactions.len(),
            valid_transaction_count: block.valid_transaction_count(),
            interval_seconds: None,
        }
    }
}

/// WebSocket requests from the browser
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Request the block index
    GetIndex,

    /// Request a decoded block
    GetBlock { height: u64 },

    /// Ping for connection health
    Ping,
}

/// WebSocket messages pushed to the browser
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Block index, newest first; also pushed when block files change
    Index { blocks: Vec<BlockInfo> },

    /// Decoded block response
    Block { block: BlockSummary },

    /// Error response
    Error { message: String },

    Pong,
}
