use crate::chain::{ChainError, Hash};
use crate::store::StoreError;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Last block whose effects are reflected in the UTXO store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
	pub height: u64,
	pub hash: Hash,
}

impl Checkpoint {
	/// Nothing indexed yet.
	pub const ZERO: Checkpoint = Checkpoint {
		height: 0,
		hash: Hash::ZERO,
	};

	pub fn new(height: u64, hash: Hash) -> Self {
		Self { height, hash }
	}

	pub fn is_zero(&self) -> bool {
		*self == Self::ZERO
	}
}

impl fmt::Display for Checkpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.height, self.hash)
	}
}

/// An output created or spent by a block, before account annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
	pub output_id: Hash,
	pub asset_id: Hash,
	pub amount: u64,
	pub control_program: Vec<u8>,
	pub tx_hash: Hash,
	pub output_index: u32,
	pub source_id: Hash,
	pub source_pos: u64,
	pub ref_data: Hash,
}

/// A raw output whose control program belongs to a local account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedOutput {
	pub output: RawOutput,
	pub account_id: String,
	pub key_index: u64,
	pub change: bool,
}

/// Persisted account UTXO record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUtxo {
	pub output_id: Hash,
	pub asset_id: Hash,
	pub amount: u64,
	pub account_id: String,
	pub program_index: u64,
	#[serde(with = "hex::serde")]
	pub program: Vec<u8>,
	pub source_id: Hash,
	pub source_pos: u64,
	pub ref_data: Hash,
	pub change: bool,
}

impl From<&AnnotatedOutput> for AccountUtxo {
	fn from(out: &AnnotatedOutput) -> Self {
		Self {
			output_id: out.output.output_id,
			asset_id: out.output.asset_id,
			amount: out.output.amount,
			account_id: out.account_id.clone(),
			program_index: out.key_index,
			program: out.output.control_program.clone(),
			source_id: out.output.source_id,
			source_pos: out.output.source_pos,
			ref_data: out.output.ref_data,
			change: out.change,
		}
	}
}

/// Error types for wallet synchronization
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Chain error: {0}")]
	ChainError(#[from] ChainError),

	#[error("Store error: {0}")]
	StoreError(#[from] StoreError),

	#[error("Serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),

	#[error("Annotated account sink error: {0}")]
	SinkError(String),

	#[error("Sync error: {0}")]
	SyncError(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn utxo_record_encodes_program_as_hex() {
		let utxo = AccountUtxo {
			output_id: Hash::digest(&[b"out"]),
			asset_id: Hash::digest(&[b"asset"]),
			amount: 100,
			account_id: "acc1".to_string(),
			program_index: 3,
			program: vec![0xde, 0xad],
			source_id: Hash::ZERO,
			source_pos: 1,
			ref_data: Hash::ZERO,
			change: false,
		};

		let json: serde_json::Value = serde_json::to_value(&utxo).unwrap();
		assert_eq!(json["program"], "dead");
		assert_eq!(json["account_id"], "acc1");

		let back: AccountUtxo = serde_json::from_value(json).unwrap();
		assert_eq!(back, utxo);
	}

	#[test]
	fn zero_checkpoint_is_default() {
		assert!(Checkpoint::default().is_zero());
		assert!(!Checkpoint::new(1, Hash::ZERO).is_zero());
	}
}
