mod backup;
mod error;
mod local;
mod pipeline;
mod rest;
mod rows;
mod scheduler;
mod target;

pub use backup::BackupLog;
pub use error::{Result, SyncError};
pub use local::SqliteStore;
pub use pipeline::{Collector, CollectorConfig, DEFAULT_BATCH_SIZE, SyncReport, UsageReport};
pub use rest::{RestConfig, RestStore};
pub use rows::{SummaryRow, UsageEventRow};
pub use scheduler::{
    Backoff, ChangeScheduler, DirtySet, SchedulerCommand, SchedulerConfig, SchedulerState,
};
pub use target::SyncTarget;
