//! SQLite schema for the state index

use rusqlite::Connection;

/// Create the three state tables if they do not exist yet
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- One row per tracked remote entity
        CREATE TABLE IF NOT EXISTS entity_states (
            id TEXT PRIMARY KEY,
            source_url TEXT NOT NULL,
            last_status TEXT NOT NULL,
            last_fingerprint TEXT NOT NULL,
            last_checked_at INTEGER NOT NULL,
            last_updated_at INTEGER NOT NULL
        );

        -- Ordered children of an entity
        CREATE TABLE IF NOT EXISTS sub_entity_states (
            parent_id TEXT NOT NULL,
            sub_index INTEGER NOT NULL,
            last_fingerprint TEXT NOT NULL,
            last_checked_at INTEGER NOT NULL,
            last_updated_at INTEGER NOT NULL,
            PRIMARY KEY (parent_id, sub_index)
        );

        -- Last written content of every output path
        CREATE TABLE IF NOT EXISTS file_contents (
            path TEXT PRIMARY KEY,
            content_fingerprint TEXT NOT NULL,
            last_written_at INTEGER NOT NULL,
            last_modified_time REAL
        );
        "#,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                 AND name IN ('entity_states', 'sub_entity_states', 'file_contents')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
