//! Counter reset: zero selected counters on every parent and purge child
//! collections, so counters can be rebuilt from a clean slate.

use crate::batch::BatchWriter;
use crate::error::{SyncError, SyncResult};
use crate::report::{JobKind, JobResult};
use crate::scanner::CollectionScanner;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tally_core::config::{JobsConfig, ResetConfig, ResetTarget};
use tally_core::{CollectionPath, DocumentSnapshot, FieldPath};
use tally_store::{DocumentStore, WriteOp};

/// A reset target with its paths parsed.
struct ResolvedTarget {
    collection: CollectionPath,
    zero_fields: Vec<FieldPath>,
    purge_subcollections: Vec<String>,
}

impl ResolvedTarget {
    fn resolve(target: &ResetTarget) -> SyncResult<Self> {
        let collection = CollectionPath::parse(&target.collection)
            .map_err(|e| SyncError::validation(&target.collection, e))?;
        let counter_field = FieldPath::parse(&target.counter_field)
            .map_err(|e| SyncError::validation(&target.collection, e))?;
        let zero_fields = target
            .zero_fields
            .iter()
            .map(|name| counter_field.child(name))
            .collect::<tally_core::Result<Vec<_>>>()
            .map_err(|e| SyncError::validation(&target.collection, e))?;
        Ok(Self {
            collection,
            zero_fields,
            purge_subcollections: target.purge_subcollections.clone(),
        })
    }

    /// Whether every targeted counter already reads 0.
    fn already_zero(&self, snapshot: &DocumentSnapshot) -> bool {
        self.zero_fields
            .iter()
            .all(|field| snapshot.get(field).and_then(Value::as_i64) == Some(0))
    }
}

pub struct ResetJob {
    store: Arc<dyn DocumentStore>,
    jobs: JobsConfig,
    targets: Vec<ResetTarget>,
}

impl ResetJob {
    pub fn new(store: Arc<dyn DocumentStore>, jobs: JobsConfig, config: &ResetConfig) -> Self {
        Self {
            store,
            jobs,
            targets: config.targets.clone(),
        }
    }

    /// Restrict the run to the named target collections.
    ///
    /// An empty list keeps every target. Unknown names are rejected.
    pub fn only(mut self, collections: &[String]) -> SyncResult<Self> {
        if collections.is_empty() {
            return Ok(self);
        }
        if let Some(unknown) = collections
            .iter()
            .find(|name| !self.targets.iter().any(|t| &t.collection == *name))
        {
            return Err(SyncError::validation(
                unknown.as_str(),
                "collection is not a configured reset target",
            ));
        }
        self.targets.retain(|t| collections.contains(&t.collection));
        Ok(self)
    }

    pub fn target_collections(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.collection.as_str()).collect()
    }

    /// Zero counters on every parent, then delete every child of the
    /// purged subcollections.
    pub async fn run(&self) -> SyncResult<JobResult> {
        let targets = self
            .targets
            .iter()
            .map(ResolvedTarget::resolve)
            .collect::<SyncResult<Vec<_>>>()?;

        tracing::info!(
            job = %JobKind::ResetCounts,
            targets = ?self.target_collections(),
            "Starting counter reset"
        );

        let mut result = JobResult::start(JobKind::ResetCounts, false);
        let mut writer = BatchWriter::new(self.store.clone(), JobKind::ResetCounts, &self.jobs);
        let scanner = CollectionScanner::new(self.store.clone(), self.jobs.scan_page_size);

        // Only the first page of the job's first scan may abort the run.
        let mut first_scan = true;
        for target in &targets {
            self.zero_counters(&scanner, target, &mut writer, &mut result, &mut first_scan)
                .await?;
        }
        // Counter writes land before any child disappears.
        writer.flush().await;

        for target in targets.iter().filter(|t| !t.purge_subcollections.is_empty()) {
            self.purge_children(&scanner, target, &mut writer, &mut result, &mut first_scan)
                .await?;
        }

        result.absorb(writer.finish().await);
        Ok(result.finish())
    }

    async fn zero_counters(
        &self,
        scanner: &CollectionScanner,
        target: &ResolvedTarget,
        writer: &mut BatchWriter,
        result: &mut JobResult,
        first_scan: &mut bool,
    ) -> SyncResult<()> {
        if target.zero_fields.is_empty() {
            return Ok(());
        }

        let mut parents = scanner.scan(&target.collection);
        let mut scanned = 0u64;
        while let Some(snapshot) = parents.next().await {
            let snapshot = match snapshot {
                Ok(snapshot) => snapshot,
                Err(e) if *first_scan => return Err(e),
                Err(e) => {
                    tracing::error!(collection = %target.collection, error = %e, "Reset scan ended early");
                    result.record_failure(target.collection.as_str(), e);
                    break;
                }
            };
            *first_scan = false;
            scanned += 1;
            result.total_scanned += 1;

            if target.already_zero(&snapshot) {
                result.skipped += 1;
                continue;
            }

            let fields = target
                .zero_fields
                .iter()
                .map(|field| (field.clone(), Value::from(0)))
                .collect();
            writer
                .push(WriteOp::Update {
                    doc: snapshot.doc,
                    fields,
                })
                .await;
        }

        *first_scan = false;

        tracing::info!(
            collection = %target.collection,
            scanned,
            "Counter zeroing pass complete"
        );
        Ok(())
    }

    async fn purge_children(
        &self,
        scanner: &CollectionScanner,
        target: &ResolvedTarget,
        writer: &mut BatchWriter,
        result: &mut JobResult,
        first_scan: &mut bool,
    ) -> SyncResult<()> {
        let mut parents = scanner.scan(&target.collection);
        let mut scanned_parents = 0u64;
        while let Some(parent) = parents.next().await {
            let parent = match parent {
                Ok(parent) => parent,
                Err(e) if *first_scan => return Err(e),
                Err(e) => {
                    tracing::error!(collection = %target.collection, error = %e, "Purge scan ended early");
                    result.record_failure(target.collection.as_str(), e);
                    break;
                }
            };
            *first_scan = false;
            scanned_parents += 1;
            if target.zero_fields.is_empty() {
                result.total_scanned += 1;
            }

            for sub in &target.purge_subcollections {
                let mut children = match scanner.scan_children(&parent.doc, sub) {
                    Ok(children) => children,
                    Err(e) => {
                        result.record_failure(format!("{}/{sub}", parent.doc), e);
                        continue;
                    }
                };
                while let Some(child) = children.next().await {
                    match child {
                        Ok(child) => {
                            result.total_scanned += 1;
                            writer.push(WriteOp::delete(child.doc)).await;
                        }
                        Err(e) => {
                            let path = format!("{}/{sub}", parent.doc);
                            tracing::error!(collection = %path, error = %e, "Child scan failed");
                            result.record_failure(path, e);
                            break;
                        }
                    }
                }
            }
        }

        *first_scan = false;

        tracing::info!(
            collection = %target.collection,
            parents = scanned_parents,
            subcollections = ?target.purge_subcollections,
            "Child purge pass complete"
        );
        Ok(())
    }
}
