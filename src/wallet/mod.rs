pub mod sync;
pub mod types;

pub use sync::{
	RetryConfig, SchedulerReport, SyncConfig, SyncScheduler, SyncState, WalletSyncOrchestrator,
};
pub use types::*;
