//! Wallet sync orchestrator and integration point for all sync services.
//!
//! This module defines the `WalletSyncOrchestrator`, the state machine keeping the account UTXO
//! store consistent with the canonical chain. It wires together the output extractor, the
//! account annotator, the UTXO upserter and the persistence service, and drives them through
//! three states:
//!
//! - `RollingBack`: the checkpoint is not on the main chain. Blocks are undone one by one,
//!   following parent hashes, until the checkpoint is canonical again. All reversals are
//!   committed with the final checkpoint in one batch.
//! - `WaitingForBlock`: the checkpoint is canonical. Fetch the next block, suspending on the
//!   chain's block-arrival notification if it does not exist yet.
//! - `ReadyToAdvance`: the fetched block names the checkpoint as its parent. Its UTXO delta
//!   and the advanced checkpoint are committed in one batch.
//!
//! Acceptance is always gated on parent-hash equality, never on height alone. The checkpoint is
//! passed into and returned from every `step`, and every step takes `&mut self`, so a single
//! orchestrator is the only writer of its checkpoint.

use crate::account::AccountRegistry;
use crate::chain::{Block, ChainError, ChainProvider};
use crate::store::KeyValueStore;
use crate::wallet::sync::{
    annotator::AccountAnnotator,
    events::{EventDispatcher, SyncEvent, SyncEventHandler},
    output_extractor::OutputExtractor,
    progress_tracker::{SyncProgressTracker, SyncStats},
    repositories::UtxoRepository,
    state_persistence::StatePersistenceService,
    utxo_upserter::UtxoUpserter,
};
use crate::wallet::{Checkpoint, WalletSyncError};

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Configuration for the sync orchestrator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Log progress every N blocks
    pub progress_log_interval: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            progress_log_interval: 1000,
        }
    }
}

/// State of the synchronization loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// The checkpoint is off the main chain and must be walked back
    RollingBack,
    /// The checkpoint is canonical; the next block is needed
    WaitingForBlock,
    /// The block extends the checkpoint and can be applied
    ReadyToAdvance(Block),
}

/// Main wallet sync orchestrator that coordinates all sync components.
pub struct WalletSyncOrchestrator {
    chain: Arc<dyn ChainProvider>,
    persistence: StatePersistenceService,
    extractor: OutputExtractor,
    annotator: AccountAnnotator,
    upserter: UtxoUpserter,
    dispatcher: EventDispatcher,
    progress_tracker: SyncProgressTracker,
}

impl WalletSyncOrchestrator {
    /// Create a new orchestrator over the given chain, store and account registry.
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        store: Arc<dyn KeyValueStore>,
        registry: Arc<dyn AccountRegistry>,
        config: SyncConfig,
    ) -> Self {
        let persistence = StatePersistenceService::new(store);
        // Only seeds the progress counters; passes reload and check the checkpoint themselves.
        let start_height = match persistence.load_checkpoint() {
            Ok(checkpoint) => checkpoint.height,
            Err(e) => {
                warn!("Could not read wallet checkpoint for progress tracking: {}", e);
                0
            }
        };
        let upserter = UtxoUpserter::new(persistence.utxos().clone());

        Self {
            chain,
            persistence,
            extractor: OutputExtractor::new(),
            annotator: AccountAnnotator::new(registry),
            upserter,
            dispatcher: EventDispatcher::new(),
            progress_tracker: SyncProgressTracker::new(start_height, config.progress_log_interval),
        }
    }

    /// Register an event handler.
    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.dispatcher.register_handler(handler);
    }

    /// The last committed checkpoint.
    pub fn load_checkpoint(&self) -> Result<Checkpoint, WalletSyncError> {
        self.persistence.load_checkpoint()
    }

    /// Read access to the indexed UTXOs.
    pub fn utxos(&self) -> &UtxoRepository {
        self.persistence.utxos()
    }

    pub fn stats(&self) -> SyncStats {
        self.progress_tracker.get_stats()
    }

    async fn is_reconciled(&self, checkpoint: &Checkpoint) -> Result<bool, WalletSyncError> {
        if checkpoint.is_zero() {
            return Ok(true);
        }
        Ok(self
            .chain
            .is_on_main_chain(checkpoint.height, &checkpoint.hash)
            .await?)
    }

    /// State to enter for `checkpoint`: roll back unless it is on the main chain.
    pub async fn derive_state(&self, checkpoint: &Checkpoint) -> Result<SyncState, WalletSyncError> {
        if self.is_reconciled(checkpoint).await? {
            Ok(SyncState::WaitingForBlock)
        } else {
            Ok(SyncState::RollingBack)
        }
    }

    /// Perform one transition of the sync loop.
    ///
    /// On error nothing past the last successful commit has been written, and the caller's
    /// checkpoint is still the committed one.
    pub async fn step(
        &mut self,
        checkpoint: Checkpoint,
        state: SyncState,
    ) -> Result<(Checkpoint, SyncState), WalletSyncError> {
        match state {
            SyncState::RollingBack => {
                let checkpoint = self.roll_back(checkpoint).await?;
                Ok((checkpoint, SyncState::WaitingForBlock))
            }
            SyncState::WaitingForBlock => {
                let block = self.next_block(&checkpoint).await?;
                if block.previous_block_hash == checkpoint.hash {
                    return Ok((checkpoint, SyncState::ReadyToAdvance(block)));
                }
                self.linkage_mismatch(&checkpoint, &block).await;
                let state = self.derive_state(&checkpoint).await?;
                Ok((checkpoint, state))
            }
            SyncState::ReadyToAdvance(block) => {
                if block.previous_block_hash != checkpoint.hash {
                    self.linkage_mismatch(&checkpoint, &block).await;
                    let state = self.derive_state(&checkpoint).await?;
                    return Ok((checkpoint, state));
                }
                let checkpoint = self.apply_block(checkpoint, &block).await?;
                let state = self.derive_state(&checkpoint).await?;
                Ok((checkpoint, state))
            }
        }
    }

    async fn linkage_mismatch(&mut self, checkpoint: &Checkpoint, block: &Block) {
        debug!(
            "Block {} at height {} does not extend checkpoint {}",
            block.hash(),
            block.height,
            checkpoint
        );
        self.dispatcher
            .dispatch(&SyncEvent::LinkageMismatch {
                height: block.height,
                expected_parent: checkpoint.hash,
                found_parent: block.previous_block_hash,
            })
            .await;
    }

    /// Undo blocks until the checkpoint is on the main chain, then commit once.
    async fn roll_back(&mut self, checkpoint: Checkpoint) -> Result<Checkpoint, WalletSyncError> {
        let mut batch = self.persistence.new_batch();
        let mut current = checkpoint;
        let mut undone = Vec::new();
        let mut restored = 0;
        let mut removed = 0;

        while !self.is_reconciled(&current).await? {
            let block = self.chain.get_block_by_hash(&current.hash).await?;
            if block.height != current.height {
                return Err(WalletSyncError::SyncError(format!(
                    "block {} is at height {}, checkpoint expects {}",
                    current.hash, block.height, current.height
                )));
            }
            info!("Rolling back block {} at height {}", current.hash, current.height);

            let spent = self.extractor.spent_outputs(&block);
            let created = self.extractor.created_outputs(&block);
            let resurrected = self.annotator.annotate(spent)?;
            restored += self.upserter.stage_create(&mut batch, &resurrected)?;
            removed += self.upserter.stage_delete(&mut batch, &created);

            undone.push(current);
            current = Checkpoint::new(block.height.saturating_sub(1), block.previous_block_hash);
        }

        if undone.is_empty() {
            return Ok(current);
        }

        self.persistence.commit(batch, &current)?;
        self.progress_tracker
            .record_rollback(current.height, undone.len(), restored, removed);
        info!(
            "Rolled back {} blocks from {} to {}",
            undone.len(),
            checkpoint,
            current
        );
        self.dispatcher
            .dispatch(&SyncEvent::BlocksRolledBack {
                blocks: undone,
                checkpoint: current,
            })
            .await;
        Ok(current)
    }

    /// Fetch the block after `checkpoint`, waiting for it if the chain is not there yet.
    async fn next_block(&mut self, checkpoint: &Checkpoint) -> Result<Block, WalletSyncError> {
        let height = checkpoint.height + 1;
        if let Some(block) = self.chain.get_block_by_height(height).await? {
            return Ok(block);
        }

        self.dispatcher
            .dispatch(&SyncEvent::WaitingForBlock { height })
            .await;
        self.chain.wait_for_block(height).await?;

        self.chain
            .get_block_by_height(height)
            .await?
            .ok_or_else(|| ChainError::BlockNotAtHeight(height).into())
    }

    /// Apply a block extending `checkpoint` and commit its delta with the new checkpoint.
    async fn apply_block(
        &mut self,
        checkpoint: Checkpoint,
        block: &Block,
    ) -> Result<Checkpoint, WalletSyncError> {
        if block.height != checkpoint.height + 1 {
            return Err(WalletSyncError::SyncError(format!(
                "block {} at height {} cannot follow checkpoint {}",
                block.hash(),
                block.height,
                checkpoint
            )));
        }

        let created = self.extractor.created_outputs(block);
        let spent = self.extractor.spent_outputs(block);
        let owned = self.annotator.annotate(created)?;

        let mut batch = self.persistence.new_batch();
        let utxos_created = self.upserter.stage_create(&mut batch, &owned)?;
        let utxos_spent = self.upserter.stage_delete(&mut batch, &spent);

        let next = Checkpoint::new(block.height, block.hash());
        self.persistence.commit(batch, &next)?;

        self.progress_tracker
            .record_applied(next.height, utxos_created, utxos_spent);
        self.progress_tracker.log_progress(false);
        self.dispatcher
            .dispatch(&SyncEvent::BlockApplied {
                height: next.height,
                hash: next.hash,
                utxos_created,
                utxos_spent,
            })
            .await;
        Ok(next)
    }

    async fn abort(
        &mut self,
        checkpoint: Option<Checkpoint>,
        error: WalletSyncError,
    ) -> WalletSyncError {
        match checkpoint {
            Some(checkpoint) => error!("Wallet sync pass aborted at {}: {}", checkpoint, error),
            None => error!("Wallet sync pass aborted before loading the checkpoint: {}", error),
        }
        self.dispatcher
            .dispatch(&SyncEvent::PassAborted {
                checkpoint,
                error: error.to_string(),
            })
            .await;
        error
    }

    /// Load the committed checkpoint and the state to resume from.
    async fn begin_pass(&mut self) -> Result<(Checkpoint, SyncState), WalletSyncError> {
        let checkpoint = match self.persistence.load_checkpoint() {
            Ok(checkpoint) => checkpoint,
            Err(e) => return Err(self.abort(None, e).await),
        };
        match self.derive_state(&checkpoint).await {
            Ok(state) => Ok((checkpoint, state)),
            Err(e) => Err(self.abort(Some(checkpoint), e).await),
        }
    }

    /// Run the sync loop from the stored checkpoint until a step fails.
    ///
    /// A pass only ends on error; the returned error has already been logged. Re-invoking is
    /// always safe because every commit is atomic and idempotent.
    pub async fn run_pass(&mut self) -> WalletSyncError {
        let (mut checkpoint, mut state) = match self.begin_pass().await {
            Ok(start) => start,
            Err(e) => return e,
        };

        loop {
            match self.step(checkpoint, state).await {
                Ok((next_checkpoint, next_state)) => {
                    checkpoint = next_checkpoint;
                    state = next_state;
                }
                Err(e) => return self.abort(Some(checkpoint), e).await,
            }
        }
    }

    /// Sync until the checkpoint is canonical and at least at `target` height.
    pub async fn sync_to_height(&mut self, target: u64) -> Result<Checkpoint, WalletSyncError> {
        let (mut checkpoint, mut state) = self.begin_pass().await?;

        while !(state == SyncState::WaitingForBlock && checkpoint.height >= target) {
            match self.step(checkpoint, state).await {
                Ok((next_checkpoint, next_state)) => {
                    checkpoint = next_checkpoint;
                    state = next_state;
                }
                Err(e) => return Err(self.abort(Some(checkpoint), e).await),
            }
        }

        self.progress_tracker.log_progress(true);
        Ok(checkpoint)
    }
}
