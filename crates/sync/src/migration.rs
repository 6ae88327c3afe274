//! Username migration: backfills the canonical lookup field on every user.
//!
//! The job is convergent. Documents whose stored value already matches are
//! skipped, so a second run over an unchanged collection writes nothing.

use crate::batch::BatchWriter;
use crate::error::{SyncError, SyncResult};
use crate::report::{JobKind, JobResult};
use crate::scanner::CollectionScanner;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tally_core::config::{JobsConfig, MigrationConfig};
use tally_core::username::derive_from_fields;
use tally_core::{CollectionPath, FieldPath};
use tally_store::{DocumentStore, WriteOp};

pub struct UsernameMigration {
    store: Arc<dyn DocumentStore>,
    jobs: JobsConfig,
    config: MigrationConfig,
}

impl UsernameMigration {
    pub fn new(store: Arc<dyn DocumentStore>, jobs: JobsConfig, config: MigrationConfig) -> Self {
        Self {
            store,
            jobs,
            config,
        }
    }

    /// Scan, derive, skip unchanged, batch-commit the rest.
    ///
    /// Fails only on invalid configuration or when the first page of the
    /// scan cannot be fetched. Everything later is recorded in the result.
    pub async fn run(&self) -> SyncResult<JobResult> {
        self.config
            .validate()
            .map_err(|reason| SyncError::validation("migration config", reason))?;
        let collection = CollectionPath::parse(&self.config.collection)
            .map_err(|e| SyncError::validation(&self.config.collection, e))?;
        let target = FieldPath::parse(&self.config.target_field)
            .map_err(|e| SyncError::validation(&self.config.target_field, e))?;

        tracing::info!(
            job = %JobKind::MigrateUsernames,
            collection = %collection,
            target_field = %target,
            dry_run = self.config.dry_run,
            "Starting username migration"
        );

        let mut result = JobResult::start(JobKind::MigrateUsernames, self.config.dry_run);
        let mut writer = BatchWriter::new(self.store.clone(), JobKind::MigrateUsernames, &self.jobs);
        let scanner = CollectionScanner::new(self.store.clone(), self.jobs.scan_page_size);
        let mut docs = scanner.scan(&collection);

        while let Some(snapshot) = docs.next().await {
            let snapshot = match snapshot {
                Ok(snapshot) => snapshot,
                Err(e) if result.total_scanned == 0 => {
                    tracing::error!(collection = %collection, error = %e, "Migration scan failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(
                        collection = %collection,
                        scanned = result.total_scanned,
                        error = %e,
                        "Migration scan ended early"
                    );
                    result.record_failure(collection.as_str(), e);
                    break;
                }
            };
            result.total_scanned += 1;

            let canonical = match derive_from_fields(&snapshot.data, &self.config.source_fields) {
                Ok(canonical) => canonical,
                Err(e) => {
                    tracing::warn!(doc = %snapshot.doc, error = %e, "Skipping malformed user");
                    result.record_failure(snapshot.doc.path(), e);
                    continue;
                }
            };

            if let Some(Value::String(current)) = snapshot.get(&target)
                && *current == canonical
            {
                result.skipped += 1;
                continue;
            }

            if self.config.dry_run {
                result.updated += 1;
            } else {
                writer
                    .push(WriteOp::update(
                        snapshot.doc,
                        target.clone(),
                        Value::String(canonical),
                    ))
                    .await;
            }
        }

        result.absorb(writer.finish().await);
        Ok(result.finish())
    }
}
