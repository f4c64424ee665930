//! Embedded state index
//!
//! Remembers the last fingerprint seen for every remote entity, every
//! sub-entity and every output file, so a refresh pass can tell what changed.
//! Backed by a single SQLite connection; each public call is one statement
//! and therefore atomic on its own. There are no cross-call transactions.
//!
//! Timestamps are unix milliseconds and never move backwards: upserts keep
//! the larger of the stored and incoming value, and `last_updated_at` moves
//! only when the fingerprint actually changes.

mod schema;

use chrono::{DateTime, Utc};
use parlay_common::{Fingerprint, ParlayError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Last observation of a remote entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceEntityState {
    pub id: String,
    pub source_url: String,
    pub last_status: String,
    pub last_fingerprint: Fingerprint,
    pub last_checked_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Last observation of one ordered child of an entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubEntityState {
    pub parent_id: String,
    pub index: u32,
    pub last_fingerprint: Fingerprint,
    pub last_checked_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// Last content written to an output path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileContentRecord {
    pub path: String,
    pub content_fingerprint: Fingerprint,
    pub last_written_at: DateTime<Utc>,
    /// Filesystem mtime (seconds since epoch) at write time, informational
    pub last_modified_time: Option<f64>,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub entities: u64,
    pub sub_entities: u64,
    pub files: u64,
}

/// SQLite-backed state index, cheap to clone
#[derive(Clone)]
pub struct StateIndex {
    conn: Arc<Mutex<Connection>>,
}

impl StateIndex {
    /// Open (or create) the index at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ParlayError::persistence(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            ParlayError::persistence(format!("Failed to open {}: {}", path.display(), e))
        })?;

        conn.busy_timeout(Duration::from_secs(5)).map_err(db_error)?;
        let _mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(db_error)?;
        schema::init_schema(&conn).map_err(db_error)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory index (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        schema::init_schema(&conn).map_err(db_error)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ParlayError::persistence(format!("State index lock poisoned: {}", e)))
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    pub fn get_entity_state(&self, id: &str) -> Result<Option<SourceEntityState>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, source_url, last_status, last_fingerprint, last_checked_at, last_updated_at \
             FROM entity_states WHERE id = ?1",
            params![id],
            |row| {
                Ok(SourceEntityState {
                    id: row.get(0)?,
                    source_url: row.get(1)?,
                    last_status: row.get(2)?,
                    last_fingerprint: Fingerprint::from_hex(row.get::<_, String>(3)?),
                    last_checked_at: from_millis(row.get(4)?),
                    last_updated_at: from_millis(row.get(5)?),
                })
            },
        )
        .optional()
        .map_err(db_error)
    }

    pub fn upsert_entity_state(
        &self,
        id: &str,
        url: &str,
        fingerprint: &Fingerprint,
        status: &str,
    ) -> Result<()> {
        self.upsert_entity_state_at(id, url, fingerprint, status, Utc::now())
    }

    /// [`upsert_entity_state`](Self::upsert_entity_state) with an explicit clock
    pub fn upsert_entity_state_at(
        &self,
        id: &str,
        url: &str,
        fingerprint: &Fingerprint,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO entity_states
                (id, source_url, last_status, last_fingerprint, last_checked_at, last_updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(id) DO UPDATE SET
                source_url = excluded.source_url,
                last_status = excluded.last_status,
                last_updated_at = CASE
                    WHEN entity_states.last_fingerprint <> excluded.last_fingerprint
                    THEN MAX(entity_states.last_updated_at, excluded.last_updated_at)
                    ELSE entity_states.last_updated_at
                END,
                last_fingerprint = excluded.last_fingerprint,
                last_checked_at = MAX(entity_states.last_checked_at, excluded.last_checked_at)
            "#,
            params![id, url, status, fingerprint.as_str(), now.timestamp_millis()],
        )
        .map_err(db_error)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Sub-entities
    // ------------------------------------------------------------------------

    pub fn get_sub_entity_state(&self, parent_id: &str, index: u32) -> Result<Option<SubEntityState>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT parent_id, sub_index, last_fingerprint, last_checked_at, last_updated_at \
             FROM sub_entity_states WHERE parent_id = ?1 AND sub_index = ?2",
            params![parent_id, index],
            |row| {
                Ok(SubEntityState {
                    parent_id: row.get(0)?,
                    index: row.get(1)?,
                    last_fingerprint: Fingerprint::from_hex(row.get::<_, String>(2)?),
                    last_checked_at: from_millis(row.get(3)?),
                    last_updated_at: from_millis(row.get(4)?),
                })
            },
        )
        .optional()
        .map_err(db_error)
    }

    pub fn upsert_sub_entity_state(
        &self,
        parent_id: &str,
        index: u32,
        fingerprint: &Fingerprint,
    ) -> Result<()> {
        self.upsert_sub_entity_state_at(parent_id, index, fingerprint, Utc::now())
    }

    pub fn upsert_sub_entity_state_at(
        &self,
        parent_id: &str,
        index: u32,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO sub_entity_states
                (parent_id, sub_index, last_fingerprint, last_checked_at, last_updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(parent_id, sub_index) DO UPDATE SET
                last_updated_at = CASE
                    WHEN sub_entity_states.last_fingerprint <> excluded.last_fingerprint
                    THEN MAX(sub_entity_states.last_updated_at, excluded.last_updated_at)
                    ELSE sub_entity_states.last_updated_at
                END,
                last_fingerprint = excluded.last_fingerprint,
                last_checked_at = MAX(sub_entity_states.last_checked_at, excluded.last_checked_at)
            "#,
            params![parent_id, index, fingerprint.as_str(), now.timestamp_millis()],
        )
        .map_err(db_error)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    pub fn get_file_fingerprint(&self, path: &str) -> Result<Option<Fingerprint>> {
        Ok(self.get_file_record(path)?.map(|r| r.content_fingerprint))
    }

    pub fn get_file_record(&self, path: &str) -> Result<Option<FileContentRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT path, content_fingerprint, last_written_at, last_modified_time \
             FROM file_contents WHERE path = ?1",
            params![path],
            |row| {
                Ok(FileContentRecord {
                    path: row.get(0)?,
                    content_fingerprint: Fingerprint::from_hex(row.get::<_, String>(1)?),
                    last_written_at: from_millis(row.get(2)?),
                    last_modified_time: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(db_error)
    }

    pub fn upsert_file_fingerprint(
        &self,
        path: &str,
        fingerprint: &Fingerprint,
        modified_time: Option<f64>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO file_contents (path, content_fingerprint, last_written_at, last_modified_time)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(path) DO UPDATE SET
                content_fingerprint = excluded.content_fingerprint,
                last_written_at = MAX(file_contents.last_written_at, excluded.last_written_at),
                last_modified_time = excluded.last_modified_time
            "#,
            params![path, fingerprint.as_str(), Utc::now().timestamp_millis(), modified_time],
        )
        .map_err(db_error)?;
        Ok(())
    }

    /// Drop every file record whose path starts with `prefix`; returns the
    /// number of rows removed
    pub fn forget_prefix(&self, prefix: &str) -> Result<usize> {
        if prefix.is_empty() {
            return Ok(0);
        }

        let conn = self.lock()?;
        // Plain substring compare: LIKE would treat `_` and `%` in paths as wildcards
        conn.execute(
            "DELETE FROM file_contents WHERE substr(path, 1, length(?1)) = ?1",
            params![prefix],
        )
        .map_err(db_error)
    }

    /// Row counts for the status query
    pub fn counts(&self) -> Result<StateCounts> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<u64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get::<_, i64>(0))
                .map(|n| n.max(0) as u64)
                .map_err(db_error)
        };

        Ok(StateCounts {
            entities: count("entity_states")?,
            sub_entities: count("sub_entity_states")?,
            files: count("file_contents")?,
        })
    }
}

fn db_error(e: rusqlite::Error) -> ParlayError {
    ParlayError::persistence(e)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
