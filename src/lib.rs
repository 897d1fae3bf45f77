//! Account UTXO indexing with rollback-safe chain synchronization.
//!
//! The `wallet::sync` orchestrator follows a chain through a `chain::ChainProvider`, records
//! the outputs owned by registered accounts in a `store::KeyValueStore`, and rolls those
//! records back when the chain reorganizes.

pub mod account;
pub mod chain;
pub mod store;
pub mod wallet;
