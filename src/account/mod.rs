//! Account registry consumed by the wallet index.
//!
//! Control programs are registered per account under the hash of their byte content. The
//! annotator only reads this registry: it maps a program hash to its `ControlProgramRecord`
//! and checks that the owning account still exists locally.

mod annotated;

pub use annotated::{
    AccountKey, AccountManager, AnnotatedAccount, AnnotatedAccountSink, annotated,
};

use crate::chain::Hash;
use crate::store::{KeyValueStore, StoreError, WriteBatch};
use crate::wallet::WalletSyncError;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Key prefix of control program records
pub const CONTROL_PROGRAM_PREFIX: &str = "ACP:";
/// Key prefix of account records
pub const ACCOUNT_PREFIX: &str = "ACC:";

/// Account owning a control program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlProgramRecord {
    pub account_id: String,
    pub key_index: u64,
    pub change: bool,
}

/// A locally known account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub alias: String,
    pub quorum: u32,
    pub xpubs: Vec<String>,
    #[serde(default)]
    pub tags: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Registry key hash of a control program.
pub fn control_program_hash(program: &[u8]) -> Hash {
    Hash::digest(&[program])
}

fn control_program_key(hash: &Hash) -> Vec<u8> {
    let mut key = CONTROL_PROGRAM_PREFIX.as_bytes().to_vec();
    key.extend_from_slice(hash.as_bytes());
    key
}

fn account_key(account_id: &str) -> Vec<u8> {
    format!("{}{}", ACCOUNT_PREFIX, account_id).into_bytes()
}

/// Lookup side of the account subsystem.
pub trait AccountRegistry: Send + Sync {
    /// Record registered for the program with content hash `hash`, if any.
    fn lookup_control_program(
        &self,
        hash: &Hash,
    ) -> Result<Option<ControlProgramRecord>, StoreError>;

    fn account_exists(&self, account_id: &str) -> Result<bool, StoreError>;
}

/// `AccountRegistry` kept in the same key-value store as the wallet index.
pub struct StoreAccountRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl StoreAccountRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn save_account(&self, account: &Account) -> Result<(), WalletSyncError> {
        let mut batch = WriteBatch::new();
        batch.set(account_key(&account.id), serde_json::to_vec(account)?);
        self.store.write(batch)?;
        Ok(())
    }

    pub fn get_account(&self, account_id: &str) -> Result<Option<Account>, WalletSyncError> {
        match self.store.get(&account_key(account_id))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Remove an account. Its control programs stay registered but no longer annotate.
    pub fn delete_account(&self, account_id: &str) -> Result<(), WalletSyncError> {
        let mut batch = WriteBatch::new();
        batch.delete(account_key(account_id));
        self.store.write(batch)?;
        Ok(())
    }

    /// Register `program` for an account, returning the program hash.
    pub fn save_control_program(
        &self,
        program: &[u8],
        record: &ControlProgramRecord,
    ) -> Result<Hash, WalletSyncError> {
        let hash = control_program_hash(program);
        let mut batch = WriteBatch::new();
        batch.set(control_program_key(&hash), serde_json::to_vec(record)?);
        self.store.write(batch)?;
        Ok(hash)
    }
}

impl AccountRegistry for StoreAccountRegistry {
    fn lookup_control_program(
        &self,
        hash: &Hash,
    ) -> Result<Option<ControlProgramRecord>, StoreError> {
        let Some(raw) = self.store.get(&control_program_key(hash))? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Ignoring undecodable control program record {}: {}", hash, e);
                Ok(None)
            }
        }
    }

    fn account_exists(&self, account_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&account_key(account_id))?.is_some())
    }
}
