//! Progress tracking for wallet synchronization.
//!
//! The `SyncProgressTracker` counts what the orchestrator committed: applied blocks, rolled
//! back blocks, reorganizations and staged UTXO writes. It logs at a fixed block interval and
//! exposes a `SyncStats` snapshot for callers.

use chrono::{DateTime, Utc};
use tracing::info;

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// Height the tracker started from
    start_height: u64,
    /// Height of the last committed checkpoint
    current_height: u64,
    blocks_applied: u64,
    blocks_rolled_back: u64,
    /// Number of rollback runs
    reorgs: u64,
    utxos_created: u64,
    utxos_deleted: u64,
    /// Last height at which we logged progress
    last_logged_height: u64,
    log_interval: u64,
    started_at: DateTime<Utc>,
}

impl SyncProgressTracker {
    /// Create a new progress tracker starting from the given height.
    pub fn new(start_height: u64, log_interval: u64) -> Self {
        Self {
            start_height,
            current_height: start_height,
            blocks_applied: 0,
            blocks_rolled_back: 0,
            reorgs: 0,
            utxos_created: 0,
            utxos_deleted: 0,
            last_logged_height: start_height,
            log_interval: log_interval.max(1),
            started_at: Utc::now(),
        }
    }

    /// Record a committed forward application.
    pub fn record_applied(&mut self, height: u64, created: usize, deleted: usize) {
        self.current_height = height;
        self.blocks_applied += 1;
        self.utxos_created += created as u64;
        self.utxos_deleted += deleted as u64;
    }

    /// Record a committed rollback run of `blocks` blocks ending at `height`.
    pub fn record_rollback(&mut self, height: u64, blocks: usize, restored: usize, removed: usize) {
        self.current_height = height;
        self.blocks_rolled_back += blocks as u64;
        self.reorgs += 1;
        self.utxos_created += restored as u64;
        self.utxos_deleted += removed as u64;
        self.last_logged_height = self.last_logged_height.min(height);
    }

    /// Log progress every `log_interval` blocks or when forced.
    pub fn log_progress(&mut self, force: bool) {
        let since_last_log = self.current_height.saturating_sub(self.last_logged_height);
        if force || since_last_log >= self.log_interval {
            info!("Sync progress: {}", self.get_stats().summary());
            self.last_logged_height = self.current_height;
        }
    }

    /// Get sync statistics as a SyncStats struct
    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            start_height: self.start_height,
            current_height: self.current_height,
            blocks_applied: self.blocks_applied,
            blocks_rolled_back: self.blocks_rolled_back,
            reorgs: self.reorgs,
            utxos_created: self.utxos_created,
            utxos_deleted: self.utxos_deleted,
            started_at: self.started_at,
        }
    }
}

/// Statistics about the sync progress
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub start_height: u64,
    pub current_height: u64,
    pub blocks_applied: u64,
    pub blocks_rolled_back: u64,
    pub reorgs: u64,
    pub utxos_created: u64,
    pub utxos_deleted: u64,
    pub started_at: DateTime<Utc>,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        format!(
            "height {} -> {}: {} blocks applied, {} rolled back{}, {} UTXO writes, {} UTXO deletes in {}s",
            self.start_height,
            self.current_height,
            self.blocks_applied,
            self.blocks_rolled_back,
            if self.reorgs == 0 {
                String::new()
            } else {
                format!(" over {} reorgs", self.reorgs)
            },
            self.utxos_created,
            self.utxos_deleted,
            elapsed.num_seconds()
        )
    }
}
