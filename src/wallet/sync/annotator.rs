//! Account annotation of raw outputs.
//!
//! Outputs are grouped by control program so each distinct program costs one registry
//! lookup no matter how many outputs pay to it. Outputs that do not belong to a local
//! account are dropped; that is the normal case, not an error.

use crate::account::{AccountRegistry, control_program_hash};
use crate::wallet::{AnnotatedOutput, RawOutput, WalletSyncError};

use itertools::Itertools;
use std::sync::Arc;
use tracing::trace;

/// Joins raw outputs against the control program registry.
#[derive(Clone)]
pub struct AccountAnnotator {
    registry: Arc<dyn AccountRegistry>,
}

impl AccountAnnotator {
    pub fn new(registry: Arc<dyn AccountRegistry>) -> Self {
        Self { registry }
    }

    /// Attach account identity to the outputs owned by local accounts.
    ///
    /// Result order is unspecified. Registry read failures are returned as errors so the
    /// caller can abort the pass instead of silently under-indexing.
    pub fn annotate(&self, outputs: Vec<RawOutput>) -> Result<Vec<AnnotatedOutput>, WalletSyncError> {
        let total = outputs.len();
        let by_program = outputs
            .into_iter()
            .into_group_map_by(|out| out.control_program.clone());

        let mut annotated = Vec::with_capacity(total);
        for (program, outs) in by_program {
            let hash = control_program_hash(&program);
            let Some(record) = self.registry.lookup_control_program(&hash)? else {
                trace!("Control program {} is not registered", hash);
                continue;
            };
            if !self.registry.account_exists(&record.account_id)? {
                trace!(
                    "Control program {} belongs to missing account {}",
                    hash, record.account_id
                );
                continue;
            }

            annotated.extend(outs.into_iter().map(|output| AnnotatedOutput {
                output,
                account_id: record.account_id.clone(),
                key_index: record.key_index,
                change: record.change,
            }));
        }

        Ok(annotated)
    }
}
