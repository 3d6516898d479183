//! DuckDB storage for collected posts and their threat scores.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use duckdb::{Connection, params};
use serde::Serialize;
use tracing::{info, warn};
use vipwatch_core::{CanonicalItem, Engagement, Platform, ThreatCategory};

use crate::StoreError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id VARCHAR PRIMARY KEY,
    platform VARCHAR NOT NULL,
    content VARCHAR NOT NULL,
    author_username VARCHAR,
    author_id VARCHAR,
    "timestamp" TIMESTAMP NOT NULL,
    url VARCHAR,
    likes BIGINT NOT NULL DEFAULT 0,
    shares BIGINT NOT NULL DEFAULT 0,
    comments BIGINT NOT NULL DEFAULT 0,
    metadata VARCHAR,
    threat_score DOUBLE NOT NULL DEFAULT 0.0,
    threat_category VARCHAR NOT NULL DEFAULT 'unknown',
    ingested_at TIMESTAMP NOT NULL,
    created_at TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_posts_platform ON posts(platform);
CREATE INDEX IF NOT EXISTS idx_posts_timestamp ON posts("timestamp");
"#;

const INSERT_SQL: &str = r#"
INSERT INTO posts (
    id, platform, content, author_username, author_id, "timestamp", url,
    likes, shares, comments, metadata, threat_score, threat_category,
    ingested_at, created_at
) VALUES (
    ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), ?,
    ?, ?, ?, ?, ?, ?,
    CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP)
)
ON CONFLICT (id) DO NOTHING
"#;

/// Item columns, with timestamps rendered as text for chrono parsing.
const ITEM_COLUMNS: &str = r#"id, platform, content, author_username, author_id,
    CAST("timestamp" AS VARCHAR), url, likes, shares, comments, metadata,
    threat_score, threat_category, CAST(ingested_at AS VARCHAR)"#;

const TS_WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TS_READ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A score to write back for one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreUpdate {
    pub id: String,
    pub threat_score: f64,
    pub threat_category: ThreatCategory,
}

/// Result of inserting a batch of items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    /// New rows written.
    pub stored: usize,
    /// Items whose id was already present.
    pub duplicates: usize,
    pub failed: usize,
}

/// Result of applying a batch of score updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub updated: usize,
    /// Updates whose id matched no row.
    pub missing: usize,
    pub failed: usize,
}

/// Aggregates for a dashboard or status view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub above_threshold: usize,
    pub platforms: usize,
    pub by_category: BTreeMap<String, usize>,
}

/// Deduplicating DuckDB store for canonical items.
///
/// One `posts` table keyed by item id. Inserts never overwrite an existing
/// row, so repeated ingestion of the same native item is a no-op and score
/// fields written by an earlier cycle survive. After insert only
/// `threat_score` and `threat_category` change.
///
/// The store owns a single connection behind a mutex: every statement is
/// serialized, which is what makes concurrent inserts of the same id
/// converge to one row.
pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    /// Open an in-memory store.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a file-backed store at the given path.
    ///
    /// Missing parent directories are created. Existing rows are kept.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), rows = store.count()?, "opened store");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Cheap liveness check.
    pub fn ping(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch("SELECT 1")?;
        Ok(())
    }

    // ── Writes ──

    /// Insert an item unless its id is already stored.
    ///
    /// Returns `true` if a new row was written.
    pub fn insert(&self, item: &CanonicalItem) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        insert_with(&conn, item)
    }

    /// Insert items one by one; a failing item does not stop the rest.
    pub fn insert_batch(&self, items: &[CanonicalItem]) -> Result<InsertOutcome, StoreError> {
        let conn = self.lock()?;
        let mut outcome = InsertOutcome::default();
        for item in items {
            match insert_with(&conn, item) {
                Ok(true) => outcome.stored += 1,
                Ok(false) => outcome.duplicates += 1,
                Err(err) => {
                    warn!(id = %item.id, error = %err, "insert failed");
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Apply score updates, each independently of the others.
    pub fn update_scores(&self, updates: &[ScoreUpdate]) -> Result<UpdateOutcome, StoreError> {
        let conn = self.lock()?;
        let mut outcome = UpdateOutcome::default();
        for update in updates {
            match update_with(&conn, update) {
                Ok(true) => outcome.updated += 1,
                Ok(false) => {
                    warn!(id = %update.id, "score update matched no row");
                    outcome.missing += 1;
                }
                Err(err) => {
                    warn!(id = %update.id, error = %err, "score update failed");
                    outcome.failed += 1;
                }
            }
        }
        if outcome.updated > 0 {
            info!(updated = outcome.updated, "applied threat scores");
        }
        Ok(outcome)
    }

    // ── Reads ──

    /// Unscored items, most recent first.
    pub fn select_unscored(&self, limit: usize) -> Result<Vec<CanonicalItem>, StoreError> {
        self.query_items(
            "WHERE threat_category = 'unknown' ORDER BY \"timestamp\" DESC, id LIMIT ?",
            params![limit_param(limit)],
        )
    }

    /// Most recent items, optionally restricted to one platform.
    pub fn recent(
        &self,
        platform: Option<Platform>,
        limit: usize,
    ) -> Result<Vec<CanonicalItem>, StoreError> {
        match platform {
            Some(p) => self.query_items(
                "WHERE platform = ? ORDER BY \"timestamp\" DESC, id LIMIT ?",
                params![p.as_str(), limit_param(limit)],
            ),
            None => self.query_items(
                "ORDER BY \"timestamp\" DESC, id LIMIT ?",
                params![limit_param(limit)],
            ),
        }
    }

    /// Items scored at or above `threshold`, highest score first.
    pub fn above_threshold(
        &self,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<CanonicalItem>, StoreError> {
        self.query_items(
            "WHERE threat_score >= ? ORDER BY threat_score DESC, \"timestamp\" DESC, id LIMIT ?",
            params![threshold, limit_param(limit)],
        )
    }

    /// Fetch one item by id.
    pub fn get(&self, id: &str) -> Result<CanonicalItem, StoreError> {
        self.query_rows("WHERE id = ?", params![id])?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .into_item()
    }

    /// Number of stored items.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT count(*) FROM posts", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Totals, items at or above `threshold`, distinct platforms, and
    /// per-category counts.
    pub fn stats(&self, threshold: f64) -> Result<StoreStats, StoreError> {
        let conn = self.lock()?;
        let (total, above, platforms): (i64, i64, i64) = conn.query_row(
            "SELECT count(*),
                    count(*) FILTER (WHERE threat_score >= ?),
                    count(DISTINCT platform)
             FROM posts",
            params![threshold],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT threat_category, count(*) FROM posts GROUP BY threat_category ORDER BY threat_category",
        )?;
        let by_category = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(StoreStats {
            total: total as usize,
            above_threshold: above as usize,
            platforms: platforms as usize,
            by_category,
        })
    }

    // ── Escape hatch ──

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    /// Run an item query, skipping rows that no longer decode so one bad row
    /// cannot hide the rest of the table.
    fn query_items(
        &self,
        tail: &str,
        params: &[&dyn duckdb::ToSql],
    ) -> Result<Vec<CanonicalItem>, StoreError> {
        let rows = self.query_rows(tail, params)?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_item() {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "skipping malformed row"),
            }
        }
        Ok(items)
    }

    fn query_rows(&self, tail: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<ItemRow>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM posts {tail}");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(ItemRow {
                    id: row.get(0)?,
                    platform: row.get(1)?,
                    content: row.get(2)?,
                    author_username: row.get(3)?,
                    author_id: row.get(4)?,
                    timestamp: row.get(5)?,
                    url: row.get(6)?,
                    likes: row.get(7)?,
                    shares: row.get(8)?,
                    comments: row.get(9)?,
                    metadata: row.get(10)?,
                    threat_score: row.get(11)?,
                    threat_category: row.get(12)?,
                    ingested_at: row.get(13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn insert_with(conn: &Connection, item: &CanonicalItem) -> Result<bool, StoreError> {
    for ts in [&item.timestamp, &item.ingested_at] {
        if !(1..=9999).contains(&ts.year()) {
            return Err(StoreError::InvalidTimestamp {
                id: item.id.clone(),
                timestamp: ts.to_rfc3339(),
            });
        }
    }
    let metadata = serde_json::to_string(&item.metadata)?;
    let ingested = format_ts(&item.ingested_at);
    let changed = conn.execute(
        INSERT_SQL,
        params![
            item.id,
            item.platform.as_str(),
            item.content,
            item.author_username,
            item.author_id,
            format_ts(&item.timestamp),
            item.url,
            count_param(item.engagement.likes),
            count_param(item.engagement.shares),
            count_param(item.engagement.comments),
            metadata,
            item.threat_score,
            item.threat_category.as_str(),
            ingested,
            ingested,
        ],
    )?;
    Ok(changed > 0)
}

fn update_with(conn: &Connection, update: &ScoreUpdate) -> Result<bool, StoreError> {
    if !(0.0..=1.0).contains(&update.threat_score) {
        return Err(StoreError::InvalidScore {
            id: update.id.clone(),
            score: update.threat_score,
        });
    }
    let changed = conn.execute(
        "UPDATE posts SET threat_score = ?, threat_category = ? WHERE id = ?",
        params![
            update.threat_score,
            update.threat_category.as_str(),
            update.id
        ],
    )?;
    Ok(changed > 0)
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(TS_WRITE_FORMAT).to_string()
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn count_param(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Raw column values of one `posts` row.
struct ItemRow {
    id: String,
    platform: String,
    content: String,
    author_username: Option<String>,
    author_id: Option<String>,
    timestamp: String,
    url: Option<String>,
    likes: i64,
    shares: i64,
    comments: i64,
    metadata: Option<String>,
    threat_score: f64,
    threat_category: String,
    ingested_at: String,
}

impl ItemRow {
    fn into_item(self) -> Result<CanonicalItem, StoreError> {
        let corrupt = |detail: String| StoreError::Corrupt {
            id: self.id.clone(),
            detail,
        };

        let platform: Platform = self.platform.parse().map_err(|e| corrupt(format!("{e}")))?;
        let threat_category: ThreatCategory = self
            .threat_category
            .parse()
            .map_err(|e| corrupt(format!("{e}")))?;
        let timestamp = parse_ts(&self.timestamp).map_err(&corrupt)?;
        let ingested_at = parse_ts(&self.ingested_at).map_err(&corrupt)?;
        let metadata = match self.metadata.as_deref() {
            Some(text) => serde_json::from_str(text).map_err(|e| corrupt(format!("metadata: {e}")))?,
            None => serde_json::Value::Object(Default::default()),
        };

        Ok(CanonicalItem {
            id: self.id,
            platform,
            content: self.content,
            author_username: self.author_username,
            author_id: self.author_id,
            timestamp,
            url: self.url,
            engagement: Engagement {
                likes: self.likes.max(0) as u64,
                shares: self.shares.max(0) as u64,
                comments: self.comments.max(0) as u64,
            },
            metadata,
            threat_score: self.threat_score,
            threat_category,
            ingested_at,
        })
    }
}

fn parse_ts(text: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(text, TS_READ_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("timestamp {text:?}: {e}"))
}
