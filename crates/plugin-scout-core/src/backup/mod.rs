//! Backup Module
//!
//! - `retention`: tiers and retention counts
//! - `store`: key/value storage for snapshot files
//! - `manager`: create, verify, restore, promote and prune snapshots

pub mod manager;
pub mod retention;
pub mod store;

pub use manager::{
    compute_hash, BackupManager, BackupSnapshot, BackupTrigger, MaintenanceReport,
    RestoreOutcome, SnapshotCounts, SnapshotFile,
};
pub use retention::{RetentionPolicy, Tier};
pub use store::{BackupStorage, LocalStorage};
