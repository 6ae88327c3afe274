//! Configuration types shared across crates.

use crate::MAX_OPS_PER_BATCH;
use crate::path::{CollectionPath, FieldPath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Document store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// SQLite database holding documents as JSON.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
        /// Queries exceeding it are logged.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// Process-local store. Contents are lost on exit; intended for tests and demos.
    Memory,
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/tally.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Batching and retry settings shared by the bulk jobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Operations per atomic commit. Must be between 1 and MAX_OPS_PER_BATCH;
    /// the default leaves headroom below the store ceiling.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retries for a group whose commit failed with a transient store error.
    #[serde(default = "default_max_commit_retries")]
    pub max_commit_retries: u32,
    /// Base backoff between commit retries in milliseconds (multiplied by attempt).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Documents fetched per scan page.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,
}

fn default_batch_size() -> usize {
    450
}

fn default_max_commit_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_scan_page_size() -> usize {
    500
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_commit_retries: default_max_commit_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            scan_page_size: default_scan_page_size(),
        }
    }
}

impl JobsConfig {
    /// Get the retry backoff as a std::time::Duration.
    pub fn retry_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 || self.batch_size > MAX_OPS_PER_BATCH {
            return Err(format!(
                "jobs.batch_size {} must be between 1 and {}",
                self.batch_size, MAX_OPS_PER_BATCH
            ));
        }
        if self.scan_page_size == 0 {
            return Err("jobs.scan_page_size cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Counter maintenance settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CountersConfig {
    /// Map field on parent documents holding the counters.
    #[serde(default = "default_counters_field")]
    pub field: String,
    /// Child collection name -> counter name. Child collections missing from
    /// the map are not counted.
    #[serde(default = "default_counter_mapping")]
    pub mapping: BTreeMap<String, String>,
}

fn default_counters_field() -> String {
    "counts".to_string()
}

fn default_counter_mapping() -> BTreeMap<String, String> {
    ["splashes", "hugs", "echoes"]
        .into_iter()
        .map(|name| (name.to_string(), name.to_string()))
        .collect()
}

impl Default for CountersConfig {
    fn default() -> Self {
        Self {
            field: default_counters_field(),
            mapping: default_counter_mapping(),
        }
    }
}

impl CountersConfig {
    /// Counter name and field path tracking `child_collection`, if any.
    pub fn counter_field(&self, child_collection: &str) -> Option<(&str, crate::Result<FieldPath>)> {
        let name = self.mapping.get(child_collection)?;
        Some((
            name.as_str(),
            FieldPath::parse(&self.field).and_then(|f| f.child(name)),
        ))
    }

    pub fn validate(&self) -> Result<(), String> {
        FieldPath::parse(&self.field).map_err(|e| format!("counters.field: {e}"))?;
        for (child, counter) in &self.mapping {
            FieldPath::parse(counter)
                .map_err(|e| format!("counters.mapping.{child}: {e}"))?;
        }
        Ok(())
    }
}

/// Username canonicalization migration settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Collection holding user documents.
    #[serde(default = "default_migration_collection")]
    pub collection: String,
    /// Fields consulted in order for the raw username.
    #[serde(default = "default_source_fields")]
    pub source_fields: Vec<String>,
    /// Field receiving the canonical value.
    #[serde(default = "default_target_field")]
    pub target_field: String,
    /// Classify documents without writing anything.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_migration_collection() -> String {
    "users".to_string()
}

fn default_source_fields() -> Vec<String> {
    vec!["username".to_string(), "displayName".to_string()]
}

fn default_target_field() -> String {
    "username_lc".to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            collection: default_migration_collection(),
            source_fields: default_source_fields(),
            target_field: default_target_field(),
            dry_run: false,
        }
    }
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<(), String> {
        CollectionPath::parse(&self.collection)
            .map_err(|e| format!("migration.collection: {e}"))?;
        FieldPath::parse(&self.target_field)
            .map_err(|e| format!("migration.target_field: {e}"))?;
        if self.source_fields.is_empty() {
            return Err("migration.source_fields cannot be empty".to_string());
        }
        if self.source_fields.contains(&self.target_field) {
            return Err(format!(
                "migration.target_field '{}' cannot also be a source field",
                self.target_field
            ));
        }
        Ok(())
    }
}

/// One collection handled by the reset job.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResetTarget {
    /// Parent collection to scan.
    pub collection: String,
    /// Map field holding the counters to zero.
    #[serde(default = "default_counters_field")]
    pub counter_field: String,
    /// Counter names set to 0; other entries of the map are preserved.
    #[serde(default)]
    pub zero_fields: Vec<String>,
    /// Subcollections whose documents are deleted under every parent.
    #[serde(default)]
    pub purge_subcollections: Vec<String>,
}

/// Counter reset settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResetConfig {
    #[serde(default = "default_reset_targets")]
    pub targets: Vec<ResetTarget>,
}

fn default_reset_targets() -> Vec<ResetTarget> {
    vec![
        ResetTarget {
            collection: "users".to_string(),
            counter_field: "stats".to_string(),
            zero_fields: vec!["splashesMade".to_string(), "hugsMade".to_string()],
            purge_subcollections: Vec::new(),
        },
        ResetTarget {
            collection: "waves".to_string(),
            counter_field: default_counters_field(),
            zero_fields: vec![
                "splashes".to_string(),
                "hugs".to_string(),
                "regularSplashes".to_string(),
                "echoes".to_string(),
            ],
            purge_subcollections: vec!["splashes".to_string(), "echoes".to_string()],
        },
    ]
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            targets: default_reset_targets(),
        }
    }
}

impl ResetConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (i, target) in self.targets.iter().enumerate() {
            CollectionPath::parse(&target.collection)
                .map_err(|e| format!("reset.targets[{i}].collection: {e}"))?;
            let field = FieldPath::parse(&target.counter_field)
                .map_err(|e| format!("reset.targets[{i}].counter_field: {e}"))?;
            for name in &target.zero_fields {
                field
                    .child(name)
                    .map_err(|e| format!("reset.targets[{i}].zero_fields: {e}"))?;
            }
            for sub in &target.purge_subcollections {
                if sub.is_empty() || sub.contains('/') {
                    return Err(format!(
                        "reset.targets[{i}].purge_subcollections: invalid name '{sub}'"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub counters: CountersConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub reset: ResetConfig,
}

impl AppConfig {
    /// Create a test configuration backed by the in-memory store.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            store: StoreConfig::Memory,
            ..Default::default()
        }
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.jobs.validate()?;
        self.counters.validate()?;
        self.migration.validate()?;
        self.reset.validate()?;
        Ok(())
    }
}
