//! Chain integration for the wallet index.
//!
//! This module defines what the wallet index consumes from the chain component: the
//! `ChainProvider` trait (main-chain membership, block lookup, block-arrival notification),
//! the block and transaction entry types, and an in-memory provider used by the demo
//! binary and tests.

/// Transaction builder producing entry maps
mod builder;
/// In-memory chain with reorganization support
mod memory;
/// The chain provider trait
mod provider;
/// Block, transaction and entry types
mod types;

pub use builder::TransactionBuilder;
pub use memory::InMemoryChain;
pub use provider::{BlockWaiter, ChainProvider};
pub use types::*;
