use super::types::{
	AssetAmount, Entry, Hash, IssuanceEntry, OutputEntry, RetirementEntry, SpendEntry,
	Transaction, ValueSource,
};
use std::collections::HashMap;

enum PendingResult {
	Output {
		value: AssetAmount,
		control_program: Vec<u8>,
		data: Hash,
	},
	Retirement {
		value: AssetAmount,
		data: Hash,
	},
}

/// Builder assembling a `Transaction` and its entry map.
///
/// Entry ids are derived from the transaction id and the entry position, so building the
/// same inputs and results twice yields identical ids. Use `nonce` to tell apart
/// otherwise identical transactions.
#[derive(Default)]
pub struct TransactionBuilder {
	nonce: u64,
	spends: Vec<(Hash, OutputEntry)>,
	issuances: Vec<AssetAmount>,
	results: Vec<PendingResult>,
}

impl TransactionBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn nonce(mut self, nonce: u64) -> Self {
		self.nonce = nonce;
		self
	}

	/// Spend a prior output. The entry is carried along so the spent value stays resolvable.
	pub fn spend(mut self, output_id: Hash, output: OutputEntry) -> Self {
		self.spends.push((output_id, output));
		self
	}

	pub fn issue(mut self, asset_id: Hash, amount: u64) -> Self {
		self.issuances.push(AssetAmount { asset_id, amount });
		self
	}

	pub fn output(self, asset_id: Hash, amount: u64, control_program: impl Into<Vec<u8>>) -> Self {
		self.output_with_data(asset_id, amount, control_program, Hash::ZERO)
	}

	pub fn output_with_data(
		mut self,
		asset_id: Hash,
		amount: u64,
		control_program: impl Into<Vec<u8>>,
		data: Hash,
	) -> Self {
		self.results.push(PendingResult::Output {
			value: AssetAmount { asset_id, amount },
			control_program: control_program.into(),
			data,
		});
		self
	}

	pub fn retire(mut self, asset_id: Hash, amount: u64) -> Self {
		self.results.push(PendingResult::Retirement {
			value: AssetAmount { asset_id, amount },
			data: Hash::ZERO,
		});
		self
	}

	fn transaction_id(&self) -> Hash {
		let mut preimage = Vec::new();
		preimage.extend_from_slice(b"tx");
		preimage.extend_from_slice(&self.nonce.to_le_bytes());
		for (output_id, _) in &self.spends {
			preimage.extend_from_slice(output_id.as_bytes());
		}
		for issuance in &self.issuances {
			preimage.extend_from_slice(issuance.asset_id.as_bytes());
			preimage.extend_from_slice(&issuance.amount.to_le_bytes());
		}
		for result in &self.results {
			match result {
				PendingResult::Output {
					value,
					control_program,
					data,
				} => {
					preimage.push(0);
					preimage.extend_from_slice(value.asset_id.as_bytes());
					preimage.extend_from_slice(&value.amount.to_le_bytes());
					preimage.extend_from_slice(&(control_program.len() as u64).to_le_bytes());
					preimage.extend_from_slice(control_program);
					preimage.extend_from_slice(data.as_bytes());
				}
				PendingResult::Retirement { value, data } => {
					preimage.push(1);
					preimage.extend_from_slice(value.asset_id.as_bytes());
					preimage.extend_from_slice(&value.amount.to_le_bytes());
					preimage.extend_from_slice(data.as_bytes());
				}
			}
		}
		Hash::digest(&[preimage.as_slice()])
	}

	pub fn build(self) -> Transaction {
		let id = self.transaction_id();
		let mut entries = HashMap::new();
		let mut input_ids = Vec::with_capacity(self.spends.len() + self.issuances.len());
		let mut result_ids = Vec::with_capacity(self.results.len());

		for (i, (spent_output_id, spent)) in self.spends.into_iter().enumerate() {
			let input_id = Hash::digest(&[b"spend", id.as_bytes(), &(i as u64).to_le_bytes()]);
			entries.insert(
				input_id,
				Entry::Spend(SpendEntry {
					spent_output_id,
					data: Hash::ZERO,
				}),
			);
			entries.insert(spent_output_id, Entry::Output(spent));
			input_ids.push(input_id);
		}

		for (i, value) in self.issuances.into_iter().enumerate() {
			let input_id =
				Hash::digest(&[b"issuance", id.as_bytes(), &(i as u64).to_le_bytes()]);
			entries.insert(
				input_id,
				Entry::Issuance(IssuanceEntry {
					value,
					nonce: Hash::digest(&[input_id.as_bytes()]),
				}),
			);
			input_ids.push(input_id);
		}

		for (position, result) in self.results.into_iter().enumerate() {
			let result_id =
				Hash::digest(&[b"result", id.as_bytes(), &(position as u64).to_le_bytes()]);
			let source = ValueSource {
				reference: id,
				position: position as u64,
			};
			let entry = match result {
				PendingResult::Output {
					value,
					control_program,
					data,
				} => Entry::Output(OutputEntry {
					source,
					value,
					control_program,
					data,
				}),
				PendingResult::Retirement { value, data } => {
					Entry::Retirement(RetirementEntry { source, value, data })
				}
			};
			entries.insert(result_id, entry);
			result_ids.push(result_id);
		}

		Transaction {
			id,
			input_ids,
			result_ids,
			entries,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn spend_carries_spent_output_entry() {
		let asset = Hash::digest(&[b"asset"]);
		let funding = TransactionBuilder::new().output(asset, 10, b"p".to_vec()).build();
		let (out_id, out) = funding.created_output(0).unwrap();

		let spending = TransactionBuilder::new()
			.spend(out_id, out.clone())
			.output(asset, 10, b"q".to_vec())
			.build();

		let spend = spending.spend(&spending.input_ids[0]).unwrap();
		assert_eq!(spend.spent_output_id, out_id);
		assert_eq!(spending.output(&out_id).unwrap(), &out);
	}

	#[test]
	fn nonce_separates_identical_transactions() {
		let asset = Hash::digest(&[b"asset"]);
		let a = TransactionBuilder::new().output(asset, 1, vec![1]).build();
		let b = TransactionBuilder::new().nonce(1).output(asset, 1, vec![1]).build();
		assert_ne!(a.id, b.id);
		assert_ne!(a.result_ids[0], b.result_ids[0]);
	}

	#[test]
	fn retirement_is_not_a_created_output() {
		let asset = Hash::digest(&[b"asset"]);
		let tx = TransactionBuilder::new()
			.issue(asset, 5)
			.retire(asset, 5)
			.build();
		assert_eq!(tx.result_ids.len(), 1);
		assert!(tx.created_output(0).is_none());
	}
}
