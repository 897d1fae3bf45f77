//! Wallet Synchronization Module
//!
//! This module keeps the account UTXO index consistent with the canonical chain. It is composed
//! of several submodules, each responsible for a specific aspect of the sync process:
//!
//! - `orchestrator`: The state machine driving rollback, waiting and block application.
//! - `scheduler`: Re-runs failed passes with exponential backoff until shutdown.
//! - `output_extractor`: Lists the outputs a block spends and the outputs it creates.
//! - `annotator`: Joins outputs against the control program registry.
//! - `utxo_upserter`: Stages UTXO record writes and removals into a batch.
//! - `state_persistence`: Commits staged writes together with the checkpoint.
//! - `repositories`: Storage layout of the checkpoint and UTXO records.
//! - `events`: Event types and handlers observing committed sync progress.
//! - `progress_tracker`: Sync counters and periodic progress logging.

/// Account annotation of raw outputs
pub mod annotator;
/// Event system for observing sync progress
pub mod events;
/// Main coordinator for the wallet sync process
pub mod orchestrator;
/// Output extraction from blocks
pub mod output_extractor;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Checkpoint and UTXO storage
pub mod repositories;
/// Retry loop around sync passes
pub mod scheduler;
/// Atomic commits of staged writes
pub mod state_persistence;
/// UTXO write staging
pub mod utxo_upserter;

pub use orchestrator::*;
pub use scheduler::{RetryConfig, SchedulerReport, SyncScheduler};
