//! State persistence service for wallet synchronization.
//!
//! This module provides the `StatePersistenceService`, which owns the commit boundary of the
//! sync engine. UTXO writes for a block (or for a run of rolled-back blocks) are staged into a
//! `WriteBatch`; `commit` adds the new checkpoint to that same batch and hands it to the store
//! in one atomic write, so the checkpoint and the UTXO set can never disagree.

use crate::store::{KeyValueStore, WriteBatch};
use crate::wallet::sync::repositories::{CheckpointRepository, UtxoRepository};
use crate::wallet::{Checkpoint, WalletSyncError};

use std::sync::Arc;
use tracing::debug;

/// Service for loading the checkpoint and committing staged state.
pub struct StatePersistenceService {
    store: Arc<dyn KeyValueStore>,
    checkpoint_repo: CheckpointRepository,
    utxo_repo: UtxoRepository,
}

impl StatePersistenceService {
    /// Create a persistence service over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            checkpoint_repo: CheckpointRepository::new(store.clone()),
            utxo_repo: UtxoRepository::new(store.clone()),
            store,
        }
    }

    /// Load the last committed checkpoint, the zero checkpoint if none is stored.
    pub fn load_checkpoint(&self) -> Result<Checkpoint, WalletSyncError> {
        self.checkpoint_repo.load()
    }

    /// The UTXO repository sharing this service's store.
    pub fn utxos(&self) -> &UtxoRepository {
        &self.utxo_repo
    }

    /// Start a new batch for staged writes.
    pub fn new_batch(&self) -> WriteBatch {
        WriteBatch::new()
    }

    /// Commit `batch` together with `checkpoint` as one atomic write.
    pub fn commit(
        &self,
        mut batch: WriteBatch,
        checkpoint: &Checkpoint,
    ) -> Result<(), WalletSyncError> {
        self.checkpoint_repo.stage(&mut batch, checkpoint)?;
        let ops = batch.len();
        self.store.write(batch)?;
        debug!("Committed checkpoint {} with {} writes", checkpoint, ops);
        Ok(())
    }
}
