//! SQLite-backed document store.
//!
//! Documents live in a single `documents` table as JSON text keyed by
//! `(collection, doc_id)`. Field edits use SQLite's JSON functions so that an
//! increment is one `UPDATE` statement and never a read-modify-write.

use crate::cursor::{CursorEnvelope, resume_after};
use crate::error::{StoreError, StoreResult};
use crate::traits::{
    DocumentPage, DocumentStore, PageStream, ScanCursor, ScanOptions, WriteOp, check_batch_size,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tally_core::{CollectionPath, DocRef, DocumentSnapshot, FieldPath, Fields};

/// SQLite-based document store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the database file if needed.
    pub async fn new(path: impl AsRef<Path>, query_timeout_secs: Option<u64>) -> StoreResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(600);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers; concurrent increments queue
            // on the pool instead of failing with SQLITE_BUSY.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout: Duration::from_secs(query_timeout_secs),
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs,
            "SQLite document store opened (query timeout is advisory only)"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                data TEXT NOT NULL CHECK (json_valid(data)),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (collection, doc_id)
            ) WITHOUT ROWID
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Log queries that ran past the advisory timeout.
    fn check_duration(&self, operation: &str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.query_timeout.as_millis() as u64,
                "SQLite query exceeded advisory timeout"
            );
        }
    }
}

fn parse_data(doc: &str, raw: &str) -> StoreResult<Fields> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Config(format!(
            "document {doc} holds non-object JSON: {other}"
        ))),
    }
}

/// Merge-patch document holding an empty object at every ancestor of `field`.
///
/// `json_set` skips paths whose ancestors are not objects. Patching with this
/// skeleton first replaces such ancestors with `{}` (and creates missing ones)
/// while leaving object ancestors and their siblings untouched.
fn ancestor_skeleton(field: &FieldPath) -> String {
    let segments: Vec<&str> = field.segments().collect();
    let parents = &segments[..segments.len().saturating_sub(1)];
    let skeleton = parents
        .iter()
        .rev()
        .fold(Value::Object(Fields::new()), |inner, segment| {
            let mut map = Fields::new();
            map.insert(segment.to_string(), inner);
            Value::Object(map)
        });
    skeleton.to_string()
}

async fn exec_update<'c, E>(
    executor: E,
    doc: &DocRef,
    fields: &[(FieldPath, Value)],
) -> StoreResult<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    // Fields apply in order, each on top of the previous edit.
    let set_expr = fields.iter().fold("data".to_string(), |expr, _| {
        format!("json_set(json_patch({expr}, ?), ?, json(?))")
    });
    let sql = format!(
        "UPDATE documents SET data = {set_expr}, \
         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
         WHERE collection = ? AND doc_id = ?"
    );

    let mut query = sqlx::query(&sql);
    for (field, value) in fields {
        query = query
            .bind(ancestor_skeleton(field))
            .bind(field.json_path())
            .bind(serde_json::to_string(value)?);
    }
    let result = query
        .bind(doc.collection_path().as_str())
        .bind(doc.id())
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::DocumentMissing(doc.path()));
    }
    Ok(())
}

/// Add `delta` to the counter at `field`, flooring at zero.
///
/// Integers are used as stored and reals are truncated; anything else counts
/// as zero. The result is always written back as an integer.
async fn exec_increment<'c, E>(
    executor: E,
    doc: &DocRef,
    field: &FieldPath,
    delta: i64,
) -> StoreResult<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let value: Option<i64> = sqlx::query_scalar(
        "UPDATE documents \
         SET data = json_set( \
                 json_patch(data, ?1), \
                 ?2, \
                 MAX(0, CAST( \
                     CASE json_type(data, ?2) \
                         WHEN 'integer' THEN json_extract(data, ?2) \
                         WHEN 'real' THEN CAST(json_extract(data, ?2) AS INTEGER) \
                         ELSE 0 \
                     END + ?3 AS INTEGER))), \
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
         WHERE collection = ?4 AND doc_id = ?5 \
         RETURNING CAST(json_extract(data, ?2) AS INTEGER)",
    )
    .bind(ancestor_skeleton(field))
    .bind(field.json_path())
    .bind(delta)
    .bind(doc.collection_path().as_str())
    .bind(doc.id())
    .fetch_optional(executor)
    .await?;

    value.ok_or_else(|| StoreError::DocumentMissing(doc.path()))
}

async fn exec_delete<'c, E>(executor: E, doc: &DocRef) -> StoreResult<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("DELETE FROM documents WHERE collection = ? AND doc_id = ?")
        .bind(doc.collection_path().as_str())
        .bind(doc.id())
        .execute(executor)
        .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, doc: &DocRef) -> StoreResult<Option<Fields>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = ? AND doc_id = ?")
                .bind(doc.collection_path().as_str())
                .bind(doc.id())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(raw,)| parse_data(&doc.path(), &raw)).transpose()
    }

    async fn set(&self, doc: &DocRef, data: Fields) -> StoreResult<()> {
        let raw = serde_json::to_string(&data)?;
        sqlx::query(
            "INSERT INTO documents (collection, doc_id, data) VALUES (?, ?, ?) \
             ON CONFLICT (collection, doc_id) DO UPDATE SET \
                 data = excluded.data, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(doc.collection_path().as_str())
        .bind(doc.id())
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, doc: &DocRef, fields: &[(FieldPath, Value)]) -> StoreResult<()> {
        exec_update(&self.pool, doc, fields).await
    }

    async fn atomic_increment(
        &self,
        doc: &DocRef,
        field: &FieldPath,
        delta: i64,
    ) -> StoreResult<i64> {
        exec_increment(&self.pool, doc, field, delta).await
    }

    async fn delete(&self, doc: &DocRef) -> StoreResult<()> {
        exec_delete(&self.pool, doc).await
    }

    async fn commit_batch(&self, ops: &[WriteOp]) -> StoreResult<()> {
        check_batch_size(ops)?;
        if ops.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        // Single transaction: dropping it on error rolls every op back.
        let mut tx = self.pool.begin().await?;
        for op in ops {
            match op {
                WriteOp::Update { doc, fields } => exec_update(&mut *tx, doc, fields).await?,
                WriteOp::Delete { doc } => exec_delete(&mut *tx, doc).await?,
                WriteOp::Increment { doc, field, delta } => {
                    exec_increment(&mut *tx, doc, field, *delta).await?;
                }
            }
        }
        tx.commit().await?;
        self.check_duration("commit_batch", started);
        Ok(())
    }

    fn scan_pages<'a>(
        &'a self,
        collection: &CollectionPath,
        options: ScanOptions,
        resume: Option<ScanCursor>,
    ) -> PageStream<'a> {
        let collection = collection.clone();
        let page_size = options.normalized_page_size();

        Box::pin(async_stream::try_stream! {
            // Ids are never empty, so "" sorts before every document.
            let mut after = resume_after(&collection, &options, resume.as_ref())?
                .unwrap_or_default();
            let mut first_page = true;
            loop {
                let started = Instant::now();
                let rows: Vec<(String, String)> = sqlx::query_as(
                    "SELECT doc_id, data FROM documents \
                     WHERE collection = ? AND doc_id > ? \
                     ORDER BY doc_id LIMIT ?",
                )
                .bind(collection.as_str())
                .bind(&after)
                .bind(page_size as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from)?;
                self.check_duration("scan_page", started);

                if rows.is_empty() && !first_page {
                    break;
                }
                first_page = false;

                let mut documents = Vec::with_capacity(rows.len());
                for (id, raw) in rows {
                    let doc = collection.doc(&id).map_err(StoreError::from)?;
                    let data = parse_data(&doc.path(), &raw)?;
                    documents.push(DocumentSnapshot::new(doc, data));
                }

                let next_cursor = match documents.last() {
                    Some(last) if documents.len() == page_size => Some(
                        CursorEnvelope::new(&collection, &options, last.id().to_string())
                            .to_cursor()?,
                    ),
                    _ => None,
                };
                if let Some(last) = documents.last() {
                    after = last.id().to_string();
                }

                let done = next_cursor.is_none();
                yield DocumentPage { documents, next_cursor };
                if done {
                    break;
                }
            }
        })
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("sqlite health check failed: {e}")))?;
        Ok(())
    }
}
