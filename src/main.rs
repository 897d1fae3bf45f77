use account_utxo_sync::account::{Account, AccountManager, StoreAccountRegistry};
use account_utxo_sync::chain::{
	Block, ChainError, Hash, InMemoryChain, OutputEntry, Transaction, TransactionBuilder,
};
use account_utxo_sync::store::MemoryStore;
use account_utxo_sync::wallet::sync::events::LoggingEventHandler;
use account_utxo_sync::wallet::sync::repositories::CheckpointRepository;
use account_utxo_sync::wallet::{
	RetryConfig, SyncConfig, SyncScheduler, WalletSyncError, WalletSyncOrchestrator,
};

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const ACCOUNT_ID: &str = "acc1";
const BLOCKS: u64 = 12;
const FORK_DEPTH: u64 = 3;
const CATCH_UP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	if let Err(e) = run().await {
		error!("Demo failed: {}", e);
	}
}

async fn run() -> Result<(), WalletSyncError> {
	info!("Starting account UTXO sync demo");

	let store = Arc::new(MemoryStore::new());
	let chain = Arc::new(InMemoryChain::new());
	let registry = Arc::new(StoreAccountRegistry::new(store.clone()));
	let accounts = AccountManager::new(registry.clone());

	accounts
		.create_account(Account {
			id: ACCOUNT_ID.to_string(),
			alias: "demo".to_string(),
			quorum: 1,
			xpubs: vec![],
			tags: None,
		})
		.await?;
	let program = random_program();
	let program_hash = accounts.register_control_program(ACCOUNT_ID, 0, false, &program)?;
	info!("Registered control program {} for {}", program_hash, ACCOUNT_ID);

	let checkpoints = CheckpointRepository::new(store.clone());
	let mut orchestrator =
		WalletSyncOrchestrator::new(chain.clone(), store, registry, SyncConfig::default());
	orchestrator.register_handler(Box::new(LoggingEventHandler));
	let mut scheduler = SyncScheduler::new(orchestrator, RetryConfig::default());

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let sync = tokio::spawn(async move {
		scheduler.run(shutdown_rx).await;
		scheduler
	});

	produce(&chain, &program).await?;

	let tip = chain.tip()?;
	let caught_up = tokio::time::timeout(CATCH_UP_TIMEOUT, async {
		loop {
			match checkpoints.load() {
				Ok(checkpoint) if checkpoint.hash == tip => break,
				Ok(_) => {}
				Err(e) => warn!("Could not read wallet checkpoint: {}", e),
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
	})
	.await;
	if caught_up.is_err() {
		warn!("Wallet did not reach tip {} within {:?}", tip, CATCH_UP_TIMEOUT);
	}

	// The receiver lives in the sync task; a send error means it already stopped.
	shutdown_tx.send(true).ok();
	let scheduler = sync
		.await
		.map_err(|e| WalletSyncError::SyncError(format!("sync task failed: {}", e)))?;

	let orchestrator = scheduler.into_inner();
	info!("Sync finished: {}", orchestrator.stats().summary());
	for (asset_id, amount) in orchestrator.utxos().account_balances(ACCOUNT_ID)? {
		info!("{} holds {} of asset {}", ACCOUNT_ID, amount, asset_id);
	}
	Ok(())
}

fn random_program() -> Vec<u8> {
	let mut program = vec![0u8; 22];
	rand::rng().fill(&mut program[..]);
	program
}

/// Mine blocks paying partly to `program`, then replace the last few with a fork.
async fn produce(chain: &InMemoryChain, program: &[u8]) -> Result<(), ChainError> {
	let asset_id = Hash::digest(&[b"demo-asset"]);
	let mut owned: Vec<(Hash, OutputEntry)> = Vec::new();
	let mut blocks = Vec::new();

	for height in 1..=BLOCKS {
		let tx = random_transaction(height, asset_id, program, owned.pop());
		owned.extend(owned_outputs(&tx, program));
		let block = Block::new(height, chain.tip()?, height, vec![tx]);
		chain.extend(block.clone())?;
		blocks.push(block);
		tokio::time::sleep(Duration::from_millis(30)).await;
	}

	let fork_height = BLOCKS - FORK_DEPTH;
	let mut parent = blocks[fork_height as usize - 1].hash();
	for height in fork_height + 1..=BLOCKS + 1 {
		let tx = random_transaction(height + 1000, asset_id, program, None);
		let block = Block::new(height, parent, height + 1000, vec![tx]);
		parent = block.hash();
		chain.insert_block(block)?;
	}
	info!("Reorganizing chain onto a fork from height {}", fork_height);
	chain.reorganize_to(&parent)?;
	Ok(())
}

fn random_transaction(
	nonce: u64,
	asset_id: Hash,
	program: &[u8],
	spend: Option<(Hash, OutputEntry)>,
) -> Transaction {
	let mut rng = rand::rng();
	let mut builder = TransactionBuilder::new()
		.nonce(nonce)
		.issue(asset_id, rng.random_range(1..=1000));
	if let Some((output_id, entry)) = spend {
		builder = builder.spend(output_id, entry);
	}
	if rng.random_bool(0.7) {
		builder = builder.output(asset_id, rng.random_range(1..=1000), program.to_vec());
	}
	builder
		.output(asset_id, rng.random_range(1..=1000), b"someone-else".to_vec())
		.build()
}

fn owned_outputs(tx: &Transaction, program: &[u8]) -> Vec<(Hash, OutputEntry)> {
	(0..tx.result_ids.len())
		.filter_map(|index| tx.created_output(index))
		.filter(|(_, entry)| entry.control_program == program)
		.collect()
}
