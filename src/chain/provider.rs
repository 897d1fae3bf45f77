use super::types::{Block, ChainError, Hash};
use futures::future::BoxFuture;

/// Future resolving once the chain holds a block at the awaited height.
pub type BlockWaiter = BoxFuture<'static, Result<(), ChainError>>;

/// View of the canonical chain consumed by the wallet index.
///
/// The provider decides which chain is canonical; the wallet index only asks membership
/// questions and follows parent hashes.
#[async_trait::async_trait]
pub trait ChainProvider: Send + Sync {
	/// Whether the block `hash` sits at `height` on the current main chain.
	async fn is_on_main_chain(&self, height: u64, hash: &Hash) -> Result<bool, ChainError>;

	/// Fetch any known block, canonical or not.
	async fn get_block_by_hash(&self, hash: &Hash) -> Result<Block, ChainError>;

	/// Fetch the main-chain block at `height`, `None` if the chain is not that long yet.
	async fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, ChainError>;

	/// Resolves once the best height reaches `height`.
	fn wait_for_block(&self, height: u64) -> BlockWaiter;
}
