use crate::chain::Hash;
use crate::store::{KeyValueStore, WriteBatch};
use crate::wallet::{AccountUtxo, Checkpoint, WalletSyncError};

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key of the singleton checkpoint record
pub const CHECKPOINT_KEY: &[u8] = b"walletInfo";
/// Key prefix of account UTXO records
pub const UTXO_PREFIX: &str = "ACU:";

fn utxo_key(output_id: &Hash) -> Vec<u8> {
	let mut key = UTXO_PREFIX.as_bytes().to_vec();
	key.extend_from_slice(output_id.as_bytes());
	key
}

/// Repository for the wallet checkpoint
#[derive(Clone)]
pub struct CheckpointRepository {
	store: Arc<dyn KeyValueStore>,
}

impl CheckpointRepository {
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store }
	}

	/// Load the stored checkpoint.
	///
	/// A missing record is the normal first-run state and yields the zero checkpoint. An
	/// undecodable record is treated the same way, with a warning. Store read failures are
	/// returned: reading them as zero would skip the rollback of an orphaned fork.
	pub fn load(&self) -> Result<Checkpoint, WalletSyncError> {
		let Some(raw) = self.store.get(CHECKPOINT_KEY)? else {
			debug!("No wallet checkpoint stored, starting from zero");
			return Ok(Checkpoint::ZERO);
		};

		match serde_json::from_slice::<Checkpoint>(&raw) {
			Ok(checkpoint) => Ok(checkpoint),
			Err(e) => {
				warn!("Failed to decode wallet checkpoint, starting from zero: {}", e);
				Ok(Checkpoint::ZERO)
			}
		}
	}

	/// Stage the checkpoint into `batch`. Nothing is written until the batch is committed.
	pub fn stage(
		&self,
		batch: &mut WriteBatch,
		checkpoint: &Checkpoint,
	) -> Result<(), WalletSyncError> {
		let raw = serde_json::to_vec(checkpoint)?;
		batch.set(CHECKPOINT_KEY.to_vec(), raw);
		Ok(())
	}
}

/// Repository for account UTXO records
#[derive(Clone)]
pub struct UtxoRepository {
	store: Arc<dyn KeyValueStore>,
}

impl UtxoRepository {
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store }
	}

	/// Stage a write of `utxo`, replacing any record with the same output id.
	pub fn stage_set(&self, batch: &mut WriteBatch, utxo: &AccountUtxo) -> Result<(), WalletSyncError> {
		let raw = serde_json::to_vec(utxo)?;
		batch.set(utxo_key(&utxo.output_id), raw);
		Ok(())
	}

	/// Stage removal of the record for `output_id`. Absent records are fine.
	pub fn stage_delete(&self, batch: &mut WriteBatch, output_id: &Hash) {
		batch.delete(utxo_key(output_id));
	}

	pub fn get(&self, output_id: &Hash) -> Result<Option<AccountUtxo>, WalletSyncError> {
		match self.store.get(&utxo_key(output_id))? {
			Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
			None => Ok(None),
		}
	}

	/// All stored UTXOs in key order. Undecodable records are skipped.
	pub fn list(&self) -> Result<Vec<AccountUtxo>, WalletSyncError> {
		let entries = self.store.scan_prefix(UTXO_PREFIX.as_bytes())?;
		Ok(entries
			.into_iter()
			.filter_map(|(key, raw)| match serde_json::from_slice(&raw) {
				Ok(utxo) => Some(utxo),
				Err(e) => {
					warn!("Skipping undecodable UTXO record {}: {}", hex::encode(&key), e);
					None
				}
			})
			.collect())
	}

	pub fn list_by_account(&self, account_id: &str) -> Result<Vec<AccountUtxo>, WalletSyncError> {
		Ok(self
			.list()?
			.into_iter()
			.filter(|utxo| utxo.account_id == account_id)
			.collect())
	}

	/// Unspent balance of an account per asset.
	pub fn account_balances(&self, account_id: &str) -> Result<BTreeMap<Hash, u64>, WalletSyncError> {
		let mut balances = BTreeMap::new();
		for utxo in self.list_by_account(account_id)? {
			let balance = balances.entry(utxo.asset_id).or_insert(0u64);
			*balance = balance.saturating_add(utxo.amount);
		}
		Ok(balances)
	}
}
