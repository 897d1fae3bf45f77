use account_utxo_sync::account::{Account, ControlProgramRecord, StoreAccountRegistry};
use account_utxo_sync::chain::{Block, Hash, InMemoryChain, Transaction, TransactionBuilder};
use account_utxo_sync::store::{KeyValueStore, MemoryStore, StoreError, WriteBatch};
use account_utxo_sync::wallet::sync::events::{SyncEvent, SyncEventHandler};
use account_utxo_sync::wallet::sync::repositories::{CHECKPOINT_KEY, UtxoRepository};
use account_utxo_sync::wallet::{
	Checkpoint, SyncConfig, SyncState, WalletSyncError, WalletSyncOrchestrator,
};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ACC1_PROGRAM: &[u8] = b"acc1-program";
const STRANGER_PROGRAM: &[u8] = b"stranger-program";

fn asset() -> Hash {
	Hash::digest(&[b"asset"])
}

fn registry_on(store: Arc<MemoryStore>) -> Arc<StoreAccountRegistry> {
	let registry = Arc::new(StoreAccountRegistry::new(store));
	registry
		.save_account(&Account {
			id: "acc1".to_string(),
			alias: "acc1".to_string(),
			quorum: 1,
			xpubs: vec![],
			tags: None,
		})
		.unwrap();
	registry
		.save_control_program(
			ACC1_PROGRAM,
			&ControlProgramRecord {
				account_id: "acc1".to_string(),
				key_index: 0,
				change: false,
			},
		)
		.unwrap();
	registry
}

fn orchestrator(
	chain: Arc<InMemoryChain>,
	store: Arc<dyn KeyValueStore>,
	registry: Arc<StoreAccountRegistry>,
) -> WalletSyncOrchestrator {
	WalletSyncOrchestrator::new(chain, store, registry, SyncConfig::default())
}

fn pay(nonce: u64, amount: u64, program: &[u8]) -> Transaction {
	TransactionBuilder::new()
		.nonce(nonce)
		.issue(asset(), amount)
		.output(asset(), amount, program.to_vec())
		.build()
}

fn output_id(tx: &Transaction) -> Hash {
	tx.result_ids[0]
}

fn utxo_ids(store: &Arc<MemoryStore>) -> HashSet<Hash> {
	UtxoRepository::new(store.clone())
		.list()
		.unwrap()
		.into_iter()
		.map(|utxo| utxo.output_id)
		.collect()
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<SyncEvent>>>);

#[async_trait::async_trait]
impl SyncEventHandler for Recorder {
	async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletSyncError> {
		self.0.lock().unwrap().push(event.clone());
		Ok(())
	}

	fn name(&self) -> &'static str {
		"Recorder"
	}
}

#[tokio::test]
async fn spend_and_change_then_rollback() {
	let chain = Arc::new(InMemoryChain::new());
	let store = Arc::new(MemoryStore::new());
	let registry = registry_on(store.clone());
	let mut sync = orchestrator(chain.clone(), store.clone(), registry);

	let tx1 = pay(1, 100, ACC1_PROGRAM);
	let o1 = output_id(&tx1);
	let (_, o1_entry) = tx1.created_output(0).unwrap();
	let block1 = Block::new(1, Hash::ZERO, 1, vec![tx1]);
	chain.extend(block1.clone()).unwrap();
	let checkpoint = sync.sync_to_height(1).await.unwrap();
	assert_eq!(checkpoint, Checkpoint::new(1, block1.hash()));
	let after_block1 = store.snapshot().unwrap();
	assert_eq!(utxo_ids(&store), HashSet::from([o1]));
	let original = UtxoRepository::new(store.clone()).get(&o1).unwrap().unwrap();
	assert_eq!(original.amount, 100);
	assert_eq!(original.account_id, "acc1");

	let tx2 = TransactionBuilder::new()
		.spend(o1, o1_entry)
		.output(asset(), 60, ACC1_PROGRAM.to_vec())
		.output(asset(), 40, STRANGER_PROGRAM.to_vec())
		.build();
	let o2 = tx2.result_ids[0];
	let block2 = Block::new(2, block1.hash(), 2, vec![tx2]);
	chain.extend(block2.clone()).unwrap();
	let checkpoint = sync.sync_to_height(2).await.unwrap();

	assert_eq!(checkpoint, Checkpoint::new(2, block2.hash()));
	assert_eq!(utxo_ids(&store), HashSet::from([o2]));
	let change = UtxoRepository::new(store.clone()).get(&o2).unwrap().unwrap();
	assert_eq!(change.amount, 60);
	assert_eq!(change.account_id, "acc1");

	// A competing block 2 orphans block2.
	let replacement = Block::new(2, block1.hash(), 99, vec![]);
	chain.insert_block(replacement.clone()).unwrap();
	chain.reorganize_to(&replacement.hash()).unwrap();

	let state = sync.derive_state(&checkpoint).await.unwrap();
	assert_eq!(state, SyncState::RollingBack);
	let (checkpoint, state) = sync.step(checkpoint, state).await.unwrap();
	assert_eq!(checkpoint, Checkpoint::new(1, block1.hash()));
	assert_eq!(state, SyncState::WaitingForBlock);
	assert_eq!(store.snapshot().unwrap(), after_block1);
	assert_eq!(
		UtxoRepository::new(store.clone()).get(&o1).unwrap(),
		Some(original)
	);

	let checkpoint = sync.sync_to_height(2).await.unwrap();
	assert_eq!(checkpoint, Checkpoint::new(2, replacement.hash()));
	assert_eq!(utxo_ids(&store), HashSet::from([o1]));
}

/// Fails on every check where indexed outputs from both forks coexist.
struct ForkAuditor {
	store: Arc<MemoryStore>,
	orphaned: HashSet<Hash>,
	adopted: HashSet<Hash>,
	violations: Arc<Mutex<Vec<SyncEvent>>>,
}

#[async_trait::async_trait]
impl SyncEventHandler for ForkAuditor {
	async fn handle(&mut self, event: &SyncEvent) -> Result<(), WalletSyncError> {
		let ids = utxo_ids(&self.store);
		let has_orphaned = !ids.is_disjoint(&self.orphaned);
		let has_adopted = !ids.is_disjoint(&self.adopted);
		if has_orphaned && has_adopted {
			self.violations.lock().unwrap().push(event.clone());
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"ForkAuditor"
	}
}

fn mine_branch(
	chain: &InMemoryChain,
	parent: Hash,
	heights: std::ops::RangeInclusive<u64>,
	nonce_base: u64,
) -> Vec<Block> {
	let mut parent = parent;
	let mut blocks = Vec::new();
	for height in heights {
		let tx = pay(nonce_base + height, height, ACC1_PROGRAM);
		let block = Block::new(height, parent, nonce_base + height, vec![tx]);
		parent = block.hash();
		chain.insert_block(block.clone()).unwrap();
		blocks.push(block);
	}
	blocks
}

fn created(blocks: &[Block]) -> HashSet<Hash> {
	blocks
		.iter()
		.flat_map(|block| block.transactions.iter().map(output_id))
		.collect()
}

#[tokio::test]
async fn reorg_rolls_back_to_fork_point_before_replaying() {
	let chain = Arc::new(InMemoryChain::new());
	let store = Arc::new(MemoryStore::new());
	let registry = registry_on(store.clone());
	let mut sync = orchestrator(chain.clone(), store.clone(), registry);

	let fork_a = mine_branch(&chain, Hash::ZERO, 1..=10, 0);
	chain.reorganize_to(&fork_a[9].hash()).unwrap();
	sync.sync_to_height(10).await.unwrap();

	let fork_b = mine_branch(&chain, fork_a[6].hash(), 8..=11, 1000);
	chain.reorganize_to(&fork_b[3].hash()).unwrap();

	let events = Recorder::default();
	let violations = Arc::new(Mutex::new(Vec::new()));
	sync.register_handler(Box::new(events.clone()));
	sync.register_handler(Box::new(ForkAuditor {
		store: store.clone(),
		orphaned: created(&fork_a[7..]),
		adopted: created(&fork_b),
		violations: violations.clone(),
	}));

	let checkpoint = sync.sync_to_height(11).await.unwrap();
	assert_eq!(checkpoint, Checkpoint::new(11, fork_b[3].hash()));
	assert!(violations.lock().unwrap().is_empty());

	let events = events.0.lock().unwrap().clone();
	let committed: Vec<_> = events
		.iter()
		.filter(|event| {
			matches!(
				event,
				SyncEvent::BlocksRolledBack { .. } | SyncEvent::BlockApplied { .. }
			)
		})
		.collect();
	assert_eq!(committed.len(), 5);
	assert_eq!(
		committed[0],
		&SyncEvent::BlocksRolledBack {
			blocks: fork_a[7..]
				.iter()
				.rev()
				.map(|block| Checkpoint::new(block.height, block.hash()))
				.collect(),
			checkpoint: Checkpoint::new(7, fork_a[6].hash()),
		}
	);
	for (event, block) in committed[1..].iter().zip(&fork_b) {
		assert!(matches!(
			event,
			SyncEvent::BlockApplied { height, hash, .. }
				if *height == block.height && *hash == block.hash()
		));
	}

	let mut expected = created(&fork_a[..7]);
	expected.extend(created(&fork_b));
	assert_eq!(utxo_ids(&store), expected);

	// Syncing the adopted chain from scratch lands on the same bytes.
	let fresh_store = Arc::new(MemoryStore::new());
	let fresh_registry = registry_on(fresh_store.clone());
	let mut fresh = orchestrator(chain.clone(), fresh_store.clone(), fresh_registry);
	fresh.sync_to_height(11).await.unwrap();
	assert_eq!(fresh_store.snapshot().unwrap(), store.snapshot().unwrap());
}

#[tokio::test]
async fn outputs_of_unknown_programs_are_not_indexed() {
	let chain = Arc::new(InMemoryChain::new());
	let store = Arc::new(MemoryStore::new());
	let registry = registry_on(store.clone());
	let mut sync = orchestrator(chain.clone(), store.clone(), registry);

	let tx = pay(1, u64::MAX, STRANGER_PROGRAM);
	chain
		.extend(Block::new(1, Hash::ZERO, 1, vec![tx]))
		.unwrap();
	let checkpoint = sync.sync_to_height(1).await.unwrap();

	assert_eq!(checkpoint.height, 1);
	assert!(utxo_ids(&store).is_empty());
	assert!(
		UtxoRepository::new(store.clone())
			.account_balances("acc1")
			.unwrap()
			.is_empty()
	);
}

/// Store whose batched writes can be switched off and whose checkpoint reads can fail.
struct SwitchableStore {
	inner: Arc<MemoryStore>,
	reject_writes: AtomicBool,
	failing_checkpoint_reads: AtomicUsize,
}

impl SwitchableStore {
	fn new(inner: Arc<MemoryStore>) -> Self {
		Self {
			inner,
			reject_writes: AtomicBool::new(false),
			failing_checkpoint_reads: AtomicUsize::new(0),
		}
	}
}

impl KeyValueStore for SwitchableStore {
	fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
		if key == CHECKPOINT_KEY
			&& self
				.failing_checkpoint_reads
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
				.is_ok()
		{
			return Err(StoreError::Backend("read timeout".to_string()));
		}
		self.inner.get(key)
	}

	fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
		self.inner.scan_prefix(prefix)
	}

	fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
		if self.reject_writes.load(Ordering::SeqCst) {
			return Err(StoreError::Backend("disk full".to_string()));
		}
		self.inner.write(batch)
	}
}

#[tokio::test]
async fn failed_commit_leaves_store_untouched_and_retry_succeeds() {
	let chain = Arc::new(InMemoryChain::new());
	let inner = Arc::new(MemoryStore::new());
	let registry = registry_on(inner.clone());
	let store = Arc::new(SwitchableStore::new(inner.clone()));
	let mut sync = orchestrator(chain.clone(), store.clone(), registry);

	let block1 = Block::new(1, Hash::ZERO, 1, vec![pay(1, 5, ACC1_PROGRAM)]);
	chain.extend(block1.clone()).unwrap();
	sync.sync_to_height(1).await.unwrap();
	let before = inner.snapshot().unwrap();

	let block2 = Block::new(2, block1.hash(), 2, vec![pay(2, 7, ACC1_PROGRAM)]);
	chain.extend(block2.clone()).unwrap();
	store.reject_writes.store(true, Ordering::SeqCst);

	let error = sync.sync_to_height(2).await.unwrap_err();
	assert!(matches!(error, WalletSyncError::StoreError(_)));
	assert_eq!(inner.snapshot().unwrap(), before);
	assert_eq!(
		sync.load_checkpoint().unwrap(),
		Checkpoint::new(1, block1.hash())
	);

	store.reject_writes.store(false, Ordering::SeqCst);
	let checkpoint = sync.sync_to_height(2).await.unwrap();
	assert_eq!(checkpoint, Checkpoint::new(2, block2.hash()));
	assert_eq!(utxo_ids(&inner).len(), 2);
}

#[tokio::test]
async fn unreadable_checkpoint_aborts_instead_of_restarting_from_zero() {
	let chain = Arc::new(InMemoryChain::new());
	let inner = Arc::new(MemoryStore::new());
	let registry = registry_on(inner.clone());
	let store = Arc::new(SwitchableStore::new(inner.clone()));
	let mut sync = orchestrator(chain.clone(), store.clone(), registry);

	let fork_a = mine_branch(&chain, Hash::ZERO, 1..=2, 0);
	chain.reorganize_to(&fork_a[1].hash()).unwrap();
	sync.sync_to_height(2).await.unwrap();

	let fork_b = mine_branch(&chain, Hash::ZERO, 1..=2, 1000);
	chain.reorganize_to(&fork_b[1].hash()).unwrap();
	let before = inner.snapshot().unwrap();

	store.failing_checkpoint_reads.store(1, Ordering::SeqCst);
	let error = sync.sync_to_height(2).await.unwrap_err();
	assert!(matches!(error, WalletSyncError::StoreError(_)));
	assert_eq!(inner.snapshot().unwrap(), before);

	let checkpoint = sync.sync_to_height(2).await.unwrap();
	assert_eq!(checkpoint, Checkpoint::new(2, fork_b[1].hash()));
	assert_eq!(utxo_ids(&inner), created(&fork_b));
}

#[tokio::test]
async fn output_created_and_spent_in_one_block_round_trips() {
	let chain = Arc::new(InMemoryChain::new());
	let store = Arc::new(MemoryStore::new());
	let registry = registry_on(store.clone());
	let mut sync = orchestrator(chain.clone(), store.clone(), registry);

	let block1 = Block::new(1, Hash::ZERO, 1, vec![pay(1, 5, ACC1_PROGRAM)]);
	chain.extend(block1.clone()).unwrap();
	sync.sync_to_height(1).await.unwrap();
	let before = store.snapshot().unwrap();

	let funding = pay(2, 50, ACC1_PROGRAM);
	let transient = output_id(&funding);
	let (_, transient_entry) = funding.created_output(0).unwrap();
	let spending = TransactionBuilder::new()
		.spend(transient, transient_entry)
		.output(asset(), 50, ACC1_PROGRAM.to_vec())
		.build();
	let settled = output_id(&spending);
	let block2 = Block::new(2, block1.hash(), 2, vec![funding, spending]);
	chain.extend(block2.clone()).unwrap();

	let checkpoint = sync.sync_to_height(2).await.unwrap();
	assert_eq!(checkpoint, Checkpoint::new(2, block2.hash()));
	let ids = utxo_ids(&store);
	assert!(!ids.contains(&transient));
	assert!(ids.contains(&settled));

	let replacement = Block::new(2, block1.hash(), 77, vec![]);
	chain.insert_block(replacement.clone()).unwrap();
	chain.reorganize_to(&replacement.hash()).unwrap();

	let state = sync.derive_state(&checkpoint).await.unwrap();
	let (checkpoint, _) = sync.step(checkpoint, state).await.unwrap();
	assert_eq!(checkpoint, Checkpoint::new(1, block1.hash()));
	assert_eq!(store.snapshot().unwrap(), before);
}
