use super::{Account, ControlProgramRecord, StoreAccountRegistry};
use crate::chain::Hash;
use crate::wallet::WalletSyncError;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Key of an annotated account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKey {
    pub root_xpub: String,
}

/// Account view handed to a search sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedAccount {
    pub id: String,
    pub alias: String,
    pub quorum: u32,
    pub tags: serde_json::Value,
    pub keys: Vec<AccountKey>,
}

/// Build the annotated view of an account. Missing tags become an empty JSON object.
pub fn annotated(account: &Account) -> Result<AnnotatedAccount, WalletSyncError> {
    let tags = match &account.tags {
        Some(tags) => serde_json::to_value(tags)?,
        None => serde_json::Value::Object(serde_json::Map::new()),
    };

    Ok(AnnotatedAccount {
        id: account.id.clone(),
        alias: account.alias.clone(),
        quorum: account.quorum,
        tags,
        keys: account
            .xpubs
            .iter()
            .map(|xpub| AccountKey {
                root_xpub: xpub.clone(),
            })
            .collect(),
    })
}

/// Receiver of annotated accounts for indexing and retrieval
#[async_trait::async_trait]
pub trait AnnotatedAccountSink: Send + Sync {
    async fn save_annotated_account(
        &self,
        account: &AnnotatedAccount,
    ) -> Result<(), WalletSyncError>;
}

/// Account bookkeeping: persists accounts and their control programs, and forwards
/// annotated accounts to an optional sink.
pub struct AccountManager {
    registry: Arc<StoreAccountRegistry>,
    sink: Option<Arc<dyn AnnotatedAccountSink>>,
}

impl AccountManager {
    pub fn new(registry: Arc<StoreAccountRegistry>) -> Self {
        Self {
            registry,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AnnotatedAccountSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(&self) -> Arc<StoreAccountRegistry> {
        self.registry.clone()
    }

    pub async fn create_account(&self, account: Account) -> Result<(), WalletSyncError> {
        self.registry.save_account(&account)?;
        self.index_annotated_account(&account).await
    }

    /// Register a control program for an existing account.
    pub fn register_control_program(
        &self,
        account_id: &str,
        key_index: u64,
        change: bool,
        program: &[u8],
    ) -> Result<Hash, WalletSyncError> {
        if self.registry.get_account(account_id)?.is_none() {
            return Err(WalletSyncError::SyncError(format!(
                "cannot register control program for unknown account {}",
                account_id
            )));
        }
        self.registry.save_control_program(
            program,
            &ControlProgramRecord {
                account_id: account_id.to_string(),
                key_index,
                change,
            },
        )
    }

    /// Forward the annotated account to the sink. No-op without a sink.
    pub async fn index_annotated_account(&self, account: &Account) -> Result<(), WalletSyncError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let annotated = annotated(account)?;
        debug!("Indexing annotated account {}", annotated.id);
        sink.save_annotated_account(&annotated).await
    }
}
