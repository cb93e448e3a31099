//! explorer-sync crate: range jobs, the worker pool that runs them and the
//! backfill driver that commits their results.

pub mod backfill;
pub mod config;
pub mod job;
pub mod pool;
pub mod range;

pub use backfill::{Backfill, BackfillReport};
pub use config::SyncConfig;
pub use job::{SyncError, SyncJob, SyncState};
pub use pool::{JobHandle, WorkError, WorkResult, WorkUnit, WorkerPool};
pub use range::{plan_ranges, BlockRange};
