//! Block and transaction types consumed by the wallet index

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// 32-byte identifier used for blocks, transactions, entries and assets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
	pub const ZERO: Hash = Hash([0u8; 32]);

	/// SHA-256 over the concatenation of `parts`.
	pub fn digest(parts: &[&[u8]]) -> Self {
		let mut hasher = Sha256::new();
		for part in parts {
			hasher.update(part);
		}
		Hash(hasher.finalize().into())
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	pub fn is_zero(&self) -> bool {
		*self == Self::ZERO
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}

	pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
		let mut bytes = [0u8; 32];
		hex::decode_to_slice(s, &mut bytes)?;
		Ok(Hash(bytes))
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Hash({})", self.to_hex())
	}
}

impl Serialize for Hash {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for Hash {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Hash::from_hex(&s).map_err(serde::de::Error::custom)
	}
}

/// An amount of a single asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetAmount {
	pub asset_id: Hash,
	pub amount: u64,
}

/// Where the value of an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSource {
	pub reference: Hash,
	pub position: u64,
}

/// A spendable output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
	pub source: ValueSource,
	pub value: AssetAmount,
	pub control_program: Vec<u8>,
	pub data: Hash,
}

/// A burned output. Never spendable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetirementEntry {
	pub source: ValueSource,
	pub value: AssetAmount,
	pub data: Hash,
}

/// An input consuming a prior output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendEntry {
	pub spent_output_id: Hash,
	pub data: Hash,
}

/// An input creating new units of an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceEntry {
	pub value: AssetAmount,
	pub nonce: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
	Output(OutputEntry),
	Retirement(RetirementEntry),
	Spend(SpendEntry),
	Issuance(IssuanceEntry),
}

impl Entry {
	fn kind(&self) -> &'static str {
		match self {
			Entry::Output(_) => "output",
			Entry::Retirement(_) => "retirement",
			Entry::Spend(_) => "spend",
			Entry::Issuance(_) => "issuance",
		}
	}
}

/// Entry resolution errors
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
	#[error("Entry {0} not found")]
	Missing(Hash),

	#[error("Entry {id} is a {found}, expected {expected}")]
	WrongType {
		id: Hash,
		expected: &'static str,
		found: &'static str,
	},
}

/// A transaction as seen by the wallet index.
///
/// `input_ids` and `result_ids` point into `entries`. For every spend, `entries` also carries
/// the spent output entry under its output id so the spent value can be recovered without a
/// separate lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	pub id: Hash,
	pub input_ids: Vec<Hash>,
	pub result_ids: Vec<Hash>,
	pub entries: HashMap<Hash, Entry>,
}

impl Transaction {
	fn entry(&self, id: &Hash) -> Result<&Entry, EntryError> {
		self.entries.get(id).ok_or(EntryError::Missing(*id))
	}

	/// Resolve `id` as a spend entry.
	pub fn spend(&self, id: &Hash) -> Result<&SpendEntry, EntryError> {
		match self.entry(id)? {
			Entry::Spend(spend) => Ok(spend),
			other => Err(EntryError::WrongType {
				id: *id,
				expected: "spend",
				found: other.kind(),
			}),
		}
	}

	/// Resolve `id` as a spendable output entry.
	pub fn output(&self, id: &Hash) -> Result<&OutputEntry, EntryError> {
		match self.entry(id)? {
			Entry::Output(output) => Ok(output),
			other => Err(EntryError::WrongType {
				id: *id,
				expected: "output",
				found: other.kind(),
			}),
		}
	}

	/// The `index`-th result of this transaction if it is a spendable output.
	pub fn created_output(&self, index: usize) -> Option<(Hash, OutputEntry)> {
		let id = *self.result_ids.get(index)?;
		self.output(&id).ok().map(|output| (id, output.clone()))
	}
}

/// A block. The hash is derived from the header fields and transaction ids on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
	pub height: u64,
	pub previous_block_hash: Hash,
	pub timestamp: u64,
	pub transactions: Vec<Transaction>,
	hash: Hash,
}

impl Block {
	pub fn new(
		height: u64,
		previous_block_hash: Hash,
		timestamp: u64,
		transactions: Vec<Transaction>,
	) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(b"block");
		hasher.update(height.to_le_bytes());
		hasher.update(previous_block_hash.as_bytes());
		hasher.update(timestamp.to_le_bytes());
		for tx in &transactions {
			hasher.update(tx.id.as_bytes());
		}
		let hash = Hash(hasher.finalize().into());

		Self {
			height,
			previous_block_hash,
			timestamp,
			transactions,
			hash,
		}
	}

	pub fn hash(&self) -> Hash {
		self.hash
	}
}

/// Errors reported by a chain provider
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
	#[error("Block not found: {0}")]
	BlockNotFound(Hash),

	#[error("No block at height {0}")]
	BlockNotAtHeight(u64),

	#[error("Block waiter closed before height {0} arrived")]
	WaiterClosed(u64),

	#[error("Chain provider error: {0}")]
	Provider(String),
}
