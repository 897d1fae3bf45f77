use crate::store::WriteBatch;
use crate::wallet::sync::repositories::UtxoRepository;
use crate::wallet::{AccountUtxo, AnnotatedOutput, RawOutput, WalletSyncError};

/// Stages UTXO record writes for annotated outputs and removals for spent ones.
#[derive(Clone)]
pub struct UtxoUpserter {
    utxos: UtxoRepository,
}

impl UtxoUpserter {
    pub fn new(utxos: UtxoRepository) -> Self {
        Self { utxos }
    }

    /// Stage a record per output. An existing record with the same output id, such as one
    /// written for a local unconfirmed transaction, is overwritten with the confirmed values.
    pub fn stage_create(
        &self,
        batch: &mut WriteBatch,
        outputs: &[AnnotatedOutput],
    ) -> Result<usize, WalletSyncError> {
        for out in outputs {
            self.utxos.stage_set(batch, &AccountUtxo::from(out))?;
        }
        Ok(outputs.len())
    }

    /// Stage removal of each output's record. Removing an absent record is a no-op.
    pub fn stage_delete(&self, batch: &mut WriteBatch, outputs: &[RawOutput]) -> usize {
        for out in outputs {
            self.utxos.stage_delete(batch, &out.output_id);
        }
        outputs.len()
    }
}
