//! Event system for wallet synchronization.
//!
//! This module defines the events emitted by the sync orchestrator, the handler trait and the
//! dispatcher fanning events out to registered handlers. Events describe state that is already
//! committed (a rolled-back run, an applied block) or a decision the loop took (a linkage
//! mismatch, a wait, an aborted pass), so handlers can observe the engine without being able
//! to influence the commit path.

use crate::chain::Hash;
use crate::wallet::{Checkpoint, WalletSyncError};
use tracing::{error, info, warn};

/// Observable outcomes of the sync loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A block was applied and committed together with its checkpoint
    BlockApplied {
        height: u64,
        hash: Hash,
        utxos_created: usize,
        utxos_spent: usize,
    },
    /// Blocks undone in a single commit, newest first
    BlocksRolledBack {
        blocks: Vec<Checkpoint>,
        checkpoint: Checkpoint,
    },
    /// The block at the next height does not extend the checkpoint
    LinkageMismatch {
        height: u64,
        expected_parent: Hash,
        found_parent: Hash,
    },
    /// The loop is suspended until a block at `height` exists
    WaitingForBlock { height: u64 },
    /// A pass stopped on an error; nothing past the last commit was written. The checkpoint
    /// is `None` when it could not be read.
    PassAborted {
        checkpoint: Option<Checkpoint>,
        error: String,
    },
}

/// Receives every event after the corresponding commit.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletSyncError>;

    /// Name used when logging handler failures.
    fn name(&self) -> &'static str;
}

/// Fans events out to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn SyncEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new event handler. Handlers are called in registration order.
    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver `event` to every handler. A failing handler is logged and skipped.
    pub async fn dispatch(&mut self, event: &SyncEvent) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event).await {
                error!("Event handler {} failed: {}", handler.name(), e);
            }
        }
    }
}

/// Handler writing every event to the log.
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl SyncEventHandler for LoggingEventHandler {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletSyncError> {
        match event {
            SyncEvent::BlockApplied {
                height,
                hash,
                utxos_created,
                utxos_spent,
            } => info!(
                "Applied block {} ({}): {} UTXOs created, {} spent",
                height, hash, utxos_created, utxos_spent
            ),
            SyncEvent::BlocksRolledBack { blocks, checkpoint } => info!(
                "Rolled back {} blocks, wallet now at {}",
                blocks.len(),
                checkpoint
            ),
            SyncEvent::LinkageMismatch {
                height,
                expected_parent,
                found_parent,
            } => warn!(
                "Block at height {} has parent {}, expected {}",
                height, found_parent, expected_parent
            ),
            SyncEvent::WaitingForBlock { height } => {
                info!("Waiting for block at height {}", height)
            }
            SyncEvent::PassAborted {
                checkpoint: Some(checkpoint),
                error,
            } => warn!("Sync pass aborted at {}: {}", checkpoint, error),
            SyncEvent::PassAborted {
                checkpoint: None,
                error,
            } => warn!("Sync pass aborted before reading the checkpoint: {}", error),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LoggingEventHandler"
    }
}
