//! Counter synchronization and batched bulk jobs for tally.
//!
//! This crate provides:
//! - A batch writer that commits grouped writes below the store ceiling
//! - A lazy collection scanner over paginated store scans
//! - The counter reconciler behind child create/delete events
//! - The username migration and counter reset jobs

pub mod batch;
pub mod error;
pub mod migration;
pub mod reconciler;
pub mod report;
pub mod reset;
pub mod scanner;

pub use batch::{BatchReport, BatchWriter, GroupFailure};
pub use error::{SyncError, SyncResult};
pub use migration::UsernameMigration;
pub use reconciler::{
    ChildEvent, ChildEventHandler, ChildEventKind, CounterReconciler, ReconcileOutcome,
};
pub use report::{JobFailure, JobKind, JobResult};
pub use reset::ResetJob;
pub use scanner::{CollectionScanner, SnapshotStream};
