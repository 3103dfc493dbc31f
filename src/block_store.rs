// File: src/block_store.rs
// Loads block files from disk and indexes their decoded summaries

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::data_models::BlockInfo;
use crate::decoder::decode_block_bytes;
use crate::model::{BlockSummary, Tx};

/// File extensions recognised as raw `common.Block` encodings
pub const BLOCK_EXTENSIONS: [&str; 2] = ["block", "pb"];

#[derive(Debug, Clone, Copy)]
pub enum BlockFilter {
    LastN(usize),     // Last N blocks by height
    Range(u64, u64),  // Inclusive height range
    Specific(u64),    // One height
}

/// A block file that could not be decoded
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Decoded blocks keyed by height
#[derive(Debug, Default, Clone)]
pub struct BlockStore {
    blocks: BTreeMap<u64, BlockSummary>,
    /// Genesis (height 0) files, which carry no transactions to summarize
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<LoadFailure>,
}

impl BlockStore {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, height: u64) -> Option<&BlockSummary> {
        self.blocks.get(&height)
    }

    pub fn latest_height(&self) -> Option<u64> {
        self.blocks.keys().next_back().copied()
    }

    /// Blocks matching the filter, in ascending height order.
    pub fn filter(&self, filter: BlockFilter) -> Vec<&BlockSummary> {
        match filter {
            BlockFilter::LastN(n) => {
                let mut last: Vec<_> = self.blocks.values().rev().take(n).collect();
                last.reverse();
                last
            }
            BlockFilter::Range(start, end) if start <= end => {
                self.blocks.range(start..=end).map(|(_, b)| b).collect()
            }
            BlockFilter::Range(..) => Vec::new(),
            BlockFilter::Specific(height) => self.get(height).into_iter().collect(),
        }
    }

    /// Locate a transaction by id across all loaded blocks, with its
    /// position inside the block.
    pub fn find_transaction(&self, tx_id: &str) -> Option<(&BlockSummary, usize, &Tx)> {
        self.blocks.values().find_map(|block| {
            block
                .find_transaction(tx_id)
                .map(|(index, tx)| (block, index, tx))
        })
    }

    /// Overviews newest first, with the interval to the preceding block.
    pub fn overviews(&self) -> Vec<BlockInfo> {
        let mut infos: Vec<BlockInfo> = self.blocks.values().rev().map(BlockInfo::from).collect();
        for i in 0..infos.len().saturating_sub(1) {
            if let (Some(current), Some(previous)) = (infos[i].timestamp, infos[i + 1].timestamp) {
                infos[i].interval_seconds = Some((current - previous).num_seconds());
            }
        }
        infos
    }

    fn insert(&mut self, path: &Path, summary: BlockSummary) {
        if self.blocks.contains_key(&summary.height) {
            warn!(path = %path.display(), height = summary.height, "Duplicate block height, keeping first");
            return;
        }
        self.blocks.insert(summary.height, summary);
    }

    fn record_failure(&mut self, path: PathBuf, error: anyhow::Error) {
        let error = format!("{:#}", error);
        warn!(path = %path.display(), error = %error, "Failed to load block file");
        self.failures.push(LoadFailure { path, error });
    }

    /// Read and decode each file; read and decode errors are recorded per file.
    fn load_files(&mut self, files: Vec<PathBuf>) {
        for file in files {
            match std::fs::read(&file) {
                Ok(bytes) => self.index(file, &bytes),
                Err(e) => {
                    let error = anyhow::Error::new(e).context("Failed to read block file");
                    self.record_failure(file, error);
                }
            }
        }
    }

    fn index(&mut self, file: PathBuf, bytes: &[u8]) {
        match decode_block_bytes(bytes) {
            Ok(Some(summary)) => {
                debug!(path = %file.display(), height = summary.height, txs = summary.transactions.len(), "Decoded block");
                self.insert(&file, summary);
            }
            Ok(None) => {
                debug!(path = %file.display(), "Skipping genesis block");
                self.skipped.push(file);
            }
            Err(e) => self.record_failure(file, anyhow::Error::new(e)),
        }
    }
}

/// True if the path has one of [`BLOCK_EXTENSIONS`].
pub fn is_block_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BLOCK_EXTENSIONS.contains(&ext))
}

/// Load a single block file or every block file in a directory.
///
/// In directory mode, files that cannot be read or decoded are recorded in
/// `failures` rather than aborting the load. A missing or unreadable
/// top-level path is an error.
pub fn load_blocks(path: &Path) -> Result<BlockStore> {
    let mut store = BlockStore::default();

    if !path.is_dir() {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read block file {}", path.display()))?;
        store.index(path.to_path_buf(), &bytes);
        return Ok(store);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)
        .with_context(|| format!("Failed to read directory {}", path.display()))?
    {
        match entry {
            Ok(entry) => {
                let entry_path = entry.path();
                if entry_path.is_file() && is_block_file(&entry_path) {
                    files.push(entry_path);
                }
            }
            Err(e) => {
                let error = anyhow::Error::new(e).context("Failed to read directory entry");
                store.record_failure(path.to_path_buf(), error);
            }
        }
    }
    files.sort();
    store.load_files(files);

    Ok(store)
}
