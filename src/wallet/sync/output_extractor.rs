use crate::chain::{Block, Transaction};
use crate::wallet::RawOutput;
use tracing::debug;

/// Extracts the outputs a block spends and the outputs it creates.
///
/// Both directions are pure functions of the block, so rolling a block back stages exactly
/// the inverse of what applying it staged.
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputExtractor;

impl OutputExtractor {
	pub fn new() -> Self {
		Self
	}

	/// Outputs consumed by the block's spend inputs. Issuances are not spends and are skipped.
	pub fn spent_outputs(&self, block: &Block) -> Vec<RawOutput> {
		block
			.transactions
			.iter()
			.flat_map(Self::spent_by_transaction)
			.collect()
	}

	/// Spendable outputs created by the block. Retirements are skipped.
	pub fn created_outputs(&self, block: &Block) -> Vec<RawOutput> {
		block
			.transactions
			.iter()
			.flat_map(Self::created_by_transaction)
			.collect()
	}

	fn spent_by_transaction(tx: &Transaction) -> Vec<RawOutput> {
		let mut outputs = Vec::new();
		for input_id in &tx.input_ids {
			let Ok(spend) = tx.spend(input_id) else {
				continue;
			};
			let spent = match tx.output(&spend.spent_output_id) {
				Ok(spent) => spent,
				Err(e) => {
					debug!(
						"Skipping unresolvable spent output in tx {}: {}",
						tx.id, e
					);
					continue;
				}
			};

			outputs.push(RawOutput {
				output_id: spend.spent_output_id,
				asset_id: spent.value.asset_id,
				amount: spent.value.amount,
				control_program: spent.control_program.clone(),
				tx_hash: tx.id,
				output_index: 0,
				source_id: spent.source.reference,
				source_pos: spent.source.position,
				ref_data: spent.data,
			});
		}
		outputs
	}

	fn created_by_transaction(tx: &Transaction) -> Vec<RawOutput> {
		let mut outputs = Vec::new();
		for (index, result_id) in tx.result_ids.iter().enumerate() {
			let Ok(output) = tx.output(result_id) else {
				continue;
			};

			outputs.push(RawOutput {
				output_id: *result_id,
				asset_id: output.value.asset_id,
				amount: output.value.amount,
				control_program: output.control_program.clone(),
				tx_hash: tx.id,
				output_index: index as u32,
				source_id: output.source.reference,
				source_pos: output.source.position,
				ref_data: output.data,
			});
		}
		outputs
	}
}
