//! Re-invocation of sync passes with exponential backoff.
//!
//! A pass only ends on error. The scheduler retries it forever, backing off between failed
//! passes and resetting the backoff whenever a pass managed to move the checkpoint. Shutdown
//! is signalled through a `watch` channel and interrupts both a running pass and a pending
//! retry delay; interrupted passes lose nothing since every commit is atomic.

use crate::wallet::Checkpoint;
use crate::wallet::sync::orchestrator::WalletSyncOrchestrator;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Backoff settings between failed passes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	pub initial_interval_ms: u64,
	pub max_interval_ms: u64,
	pub multiplier: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			initial_interval_ms: 500,
			max_interval_ms: 30_000,
			multiplier: 2.0,
		}
	}
}

impl RetryConfig {
	fn max_interval(&self) -> Duration {
		Duration::from_millis(self.max_interval_ms)
	}

	/// Backoff that never gives up.
	fn backoff(&self) -> ExponentialBackoff {
		let initial = Duration::from_millis(self.initial_interval_ms);
		ExponentialBackoff {
			current_interval: initial,
			initial_interval: initial,
			max_interval: self.max_interval(),
			multiplier: self.multiplier,
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		}
	}
}

/// Outcome of a scheduler run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerReport {
	pub passes: u64,
	/// Committed checkpoint at shutdown, `None` if it could not be read
	pub checkpoint: Option<Checkpoint>,
}

/// Keeps a sync orchestrator running until shutdown.
pub struct SyncScheduler {
	orchestrator: WalletSyncOrchestrator,
	retry: RetryConfig,
}

impl SyncScheduler {
	pub fn new(orchestrator: WalletSyncOrchestrator, retry: RetryConfig) -> Self {
		Self {
			orchestrator,
			retry,
		}
	}

	pub fn orchestrator(&self) -> &WalletSyncOrchestrator {
		&self.orchestrator
	}

	pub fn into_inner(self) -> WalletSyncOrchestrator {
		self.orchestrator
	}

	/// Run passes until `shutdown` turns true or its sender is dropped.
	pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerReport {
		let mut backoff = self.retry.backoff();
		let mut passes = 0;
		info!("Wallet sync scheduler starting");

		loop {
			if *shutdown.borrow_and_update() {
				break;
			}

			let before = self.committed_checkpoint();
			passes += 1;
			let error = tokio::select! {
				error = self.orchestrator.run_pass() => error,
				_ = shutdown_requested(&mut shutdown) => break,
			};

			let after = self.committed_checkpoint();
			if before.is_some() && after.is_some() && after != before {
				backoff.reset();
			}
			let delay = backoff
				.next_backoff()
				.unwrap_or_else(|| self.retry.max_interval());
			warn!(
				"Sync pass {} failed: {}; retrying in {:?}",
				passes, error, delay
			);

			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				_ = shutdown_requested(&mut shutdown) => break,
			}
		}

		let checkpoint = self.committed_checkpoint();
		match &checkpoint {
			Some(checkpoint) => info!(
				"Wallet sync scheduler stopped after {} passes at {}",
				passes, checkpoint
			),
			None => info!("Wallet sync scheduler stopped after {} passes", passes),
		}
		SchedulerReport { passes, checkpoint }
	}

	/// Committed checkpoint, `None` when the store cannot be read. Only used to judge
	/// progress; passes load and validate the checkpoint on their own.
	fn committed_checkpoint(&self) -> Option<Checkpoint> {
		match self.orchestrator.load_checkpoint() {
			Ok(checkpoint) => Some(checkpoint),
			Err(e) => {
				warn!("Could not read wallet checkpoint: {}", e);
				None
			}
		}
	}
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
	loop {
		if *shutdown.borrow_and_update() {
			return;
		}
		if shutdown.changed().await.is_err() {
			return;
		}
	}
}
