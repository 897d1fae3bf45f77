use super::provider::{BlockWaiter, ChainProvider};
use super::types::{Block, ChainError, Hash};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

struct ChainState {
	blocks: HashMap<Hash, Block>,
	/// Main chain hashes indexed by height. Index 0 is the zero-hash root.
	main_chain: Vec<Hash>,
}

/// In-memory chain with side branches and reorganization support.
///
/// Height 0 is an implicit root with the zero hash; the first real block sits at height 1
/// and names `Hash::ZERO` as its parent. Waiters are woken through a `watch` channel that
/// carries the best height.
pub struct InMemoryChain {
	state: Mutex<ChainState>,
	best_height: watch::Sender<u64>,
}

impl Default for InMemoryChain {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryChain {
	pub fn new() -> Self {
		let (best_height, _) = watch::channel(0);
		Self {
			state: Mutex::new(ChainState {
				blocks: HashMap::new(),
				main_chain: vec![Hash::ZERO],
			}),
			best_height,
		}
	}

	fn lock(&self) -> Result<MutexGuard<'_, ChainState>, ChainError> {
		self.state
			.lock()
			.map_err(|_| ChainError::Provider("chain state lock poisoned".to_string()))
	}

	/// Current best height, 0 when only the root exists.
	pub fn best_height(&self) -> u64 {
		*self.best_height.borrow()
	}

	/// Hash of the current main chain tip.
	pub fn tip(&self) -> Result<Hash, ChainError> {
		let state = self.lock()?;
		Ok(*state.main_chain.last().unwrap_or(&Hash::ZERO))
	}

	/// Store a block without touching the main chain.
	pub fn insert_block(&self, block: Block) -> Result<(), ChainError> {
		let mut state = self.lock()?;
		if !block.previous_block_hash.is_zero()
			&& !state.blocks.contains_key(&block.previous_block_hash)
		{
			return Err(ChainError::BlockNotFound(block.previous_block_hash));
		}
		state.blocks.insert(block.hash(), block);
		Ok(())
	}

	/// Append a block on top of the current tip.
	pub fn extend(&self, block: Block) -> Result<(), ChainError> {
		let height = block.height;
		let hash = block.hash();
		{
			let mut state = self.lock()?;
			let tip = *state.main_chain.last().unwrap_or(&Hash::ZERO);
			if block.previous_block_hash != tip || height != state.main_chain.len() as u64 {
				return Err(ChainError::Provider(format!(
					"block {} at height {} does not extend tip {}",
					hash, height, tip
				)));
			}
			state.blocks.insert(hash, block);
			state.main_chain.push(hash);
		}

		debug!("Chain extended to height {} ({})", height, hash);
		self.best_height.send_replace(height);
		Ok(())
	}

	/// Make the branch ending in `tip` the main chain.
	///
	/// Every block on the branch must already be known. The best height may go down.
	pub fn reorganize_to(&self, tip: &Hash) -> Result<(), ChainError> {
		let best = {
			let mut state = self.lock()?;
			let mut branch = Vec::new();
			let mut cursor = *tip;
			while !cursor.is_zero() {
				let block = state
					.blocks
					.get(&cursor)
					.ok_or(ChainError::BlockNotFound(cursor))?;
				if block.height != branch_height(&state, &block.previous_block_hash)? + 1 {
					return Err(ChainError::Provider(format!(
						"block {} has inconsistent height {}",
						cursor, block.height
					)));
				}
				branch.push(cursor);
				cursor = block.previous_block_hash;
			}
			branch.push(Hash::ZERO);
			branch.reverse();
			state.main_chain = branch;
			state.main_chain.len() as u64 - 1
		};

		info!("Chain reorganized to {} at height {}", tip, best);
		self.best_height.send_replace(best);
		Ok(())
	}
}

fn branch_height(state: &ChainState, hash: &Hash) -> Result<u64, ChainError> {
	if hash.is_zero() {
		return Ok(0);
	}
	state
		.blocks
		.get(hash)
		.map(|block| block.height)
		.ok_or(ChainError::BlockNotFound(*hash))
}

#[async_trait::async_trait]
impl ChainProvider for InMemoryChain {
	async fn is_on_main_chain(&self, height: u64, hash: &Hash) -> Result<bool, ChainError> {
		let state = self.lock()?;
		Ok(usize::try_from(height)
			.ok()
			.and_then(|h| state.main_chain.get(h))
			.is_some_and(|main| main == hash))
	}

	async fn get_block_by_hash(&self, hash: &Hash) -> Result<Block, ChainError> {
		let state = self.lock()?;
		state
			.blocks
			.get(hash)
			.cloned()
			.ok_or(ChainError::BlockNotFound(*hash))
	}

	async fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, ChainError> {
		if height == 0 {
			return Ok(None);
		}
		let state = self.lock()?;
		Ok(usize::try_from(height)
			.ok()
			.and_then(|h| state.main_chain.get(h))
			.and_then(|hash| state.blocks.get(hash))
			.cloned())
	}

	fn wait_for_block(&self, height: u64) -> BlockWaiter {
		let mut best_height = self.best_height.subscribe();
		Box::pin(async move {
			loop {
				let reached = *best_height.borrow_and_update() >= height;
				if reached {
					return Ok(());
				}
				best_height
					.changed()
					.await
					.map_err(|_| ChainError::WaiterClosed(height))?;
			}
		})
	}
}
