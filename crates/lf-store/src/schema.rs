use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    // Checkpoint every ~400KB instead of the default ~4MB
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Fold stale WAL data into the main file. In-memory and fresh databases
    // legitimately fail this.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::debug!("startup WAL checkpoint complete");
    }

    // parent_id has no foreign key: a parent may be stored after its child.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS nodes (
            id                  TEXT PRIMARY KEY,
            content             TEXT NOT NULL,
            kind                TEXT NOT NULL,
            length              REAL NOT NULL,
            char_index          REAL NOT NULL,
            stability           REAL NOT NULL,
            usage               REAL NOT NULL,
            curvature_signature REAL NOT NULL,
            field_value         REAL NOT NULL,
            parent_id           TEXT,
            created_at          INTEGER NOT NULL,
            last_used_at        INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS node_children (
            parent_id TEXT NOT NULL REFERENCES nodes(id),
            child_id  TEXT NOT NULL REFERENCES nodes(id),
            PRIMARY KEY (parent_id, child_id)
        );

        CREATE TABLE IF NOT EXISTS node_neighbors (
            node_id     TEXT NOT NULL REFERENCES nodes(id),
            neighbor_id TEXT NOT NULL REFERENCES nodes(id),
            strength    REAL NOT NULL,
            PRIMARY KEY (node_id, neighbor_id)
        );

        CREATE TABLE IF NOT EXISTS edges (
            source_id  TEXT NOT NULL REFERENCES nodes(id),
            target_id  TEXT NOT NULL REFERENCES nodes(id),
            strength   REAL NOT NULL,
            curvature  REAL NOT NULL,
            sequential INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (source_id, target_id)
        );

        CREATE TABLE IF NOT EXISTS field_state (
            id        INTEGER PRIMARY KEY CHECK (id = 1),
            u         REAL NOT NULL,
            gradients TEXT NOT NULL DEFAULT '[]',
            curvature REAL NOT NULL,
            stability REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stability_history (
            position INTEGER PRIMARY KEY,
            value    REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS training_log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            prompt    TEXT NOT NULL,
            response  TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_node_children_parent ON node_children(parent_id);
        CREATE INDEX IF NOT EXISTS idx_node_neighbors_node ON node_neighbors(node_id);
        CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
