use std::path::Path;

use rusqlite::{Connection, params};
use uuid::Uuid;

use lf_core::{
    Edge, EngineSnapshot, FieldState, GraphSnapshot, NeighborRecord, NodeKind,
    NodeRecord, NodeWeights, PortError, SnapshotPort, TrainingEntry,
};

use crate::error::{Result, StoreError};
use crate::schema;

/// Metadata key present only while a snapshot is stored.
const SNAPSHOT_VERSION_KEY: &str = "snapshot_version";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // --- Metadata ---

    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    // --- Save ---

    /// Replace everything stored with `snapshot`, in one transaction.
    pub fn save_snapshot(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        clear_on(&tx)?;

        let graph = &snapshot.graph;
        set_metadata_on(&tx, SNAPSHOT_VERSION_KEY, &graph.version)?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO nodes (id, content, kind, length, char_index, stability, usage,
                                    curvature_signature, field_value, parent_id, created_at, last_used_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for node in &graph.nodes {
                insert.execute(params![
                    node.id.to_string(),
                    node.content,
                    node.kind.as_str(),
                    node.weights.length,
                    node.weights.char_index,
                    node.weights.stability,
                    node.weights.usage,
                    node.curvature_signature,
                    node.field_value,
                    node.parent.map(|p| p.to_string()),
                    to_sql_millis(node.created_at)?,
                    to_sql_millis(node.last_used_at)?,
                ])?;
            }
        }

        {
            let mut child = tx.prepare(
                "INSERT INTO node_children (parent_id, child_id) VALUES (?1, ?2)",
            )?;
            let mut neighbor = tx.prepare(
                "INSERT INTO node_neighbors (node_id, neighbor_id, strength) VALUES (?1, ?2, ?3)",
            )?;
            for node in &graph.nodes {
                let id = node.id.to_string();
                for c in &node.children {
                    child.execute(params![id, c.to_string()])?;
                }
                for n in &node.neighbors {
                    neighbor.execute(params![id, n.id.to_string(), n.strength])?;
                }
            }
        }

        {
            let mut insert = tx.prepare(
                "INSERT INTO edges (source_id, target_id, strength, curvature, sequential)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for edge in &graph.edges {
                insert.execute(params![
                    edge.source.to_string(),
                    edge.target.to_string(),
                    edge.strength,
                    edge.curvature,
                    edge.sequential as i32,
                ])?;
            }
        }

        let field = &graph.field;
        tx.execute(
            "INSERT INTO field_state (id, u, gradients, curvature, stability) VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                field.u,
                serde_json::to_string(&field.gradients)?,
                field.curvature,
                field.stability,
            ],
        )?;

        {
            let mut insert =
                tx.prepare("INSERT INTO stability_history (position, value) VALUES (?1, ?2)")?;
            for (i, value) in graph.stability_history.iter().enumerate() {
                insert.execute(params![i as i64, value])?;
            }
        }

        {
            let mut insert = tx.prepare(
                "INSERT INTO training_log (prompt, response, timestamp) VALUES (?1, ?2, ?3)",
            )?;
            for entry in &snapshot.memories {
                insert.execute(params![
                    entry.prompt,
                    entry.response,
                    to_sql_millis(entry.timestamp)?
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            memories = snapshot.memories.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Remove the stored snapshot, leaving an empty schema.
    pub fn erase(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        clear_on(&tx)?;
        tx.commit()?;
        Ok(())
    }

    // --- Load ---

    /// The stored snapshot, or `None` if nothing has been saved since the
    /// last erase. Rows are returned in insertion order.
    pub fn load_snapshot(&self) -> Result<Option<EngineSnapshot>> {
        let Some(version) = self.get_metadata(SNAPSHOT_VERSION_KEY)? else {
            return Ok(None);
        };

        let mut nodes = self.load_nodes()?;
        self.attach_children(&mut nodes)?;
        self.attach_neighbors(&mut nodes)?;

        let graph = GraphSnapshot {
            version,
            nodes,
            edges: self.load_edges()?,
            field: self.load_field()?,
            stability_history: self.load_stability_history()?,
        };

        Ok(Some(EngineSnapshot {
            graph,
            memories: self.load_training_log()?,
        }))
    }

    fn load_nodes(&self) -> Result<Vec<NodeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content, kind, length, char_index, stability, usage,
                    curvature_signature, field_value, parent_id, created_at, last_used_at
             FROM nodes ORDER BY rowid",
        )?;

        #[allow(clippy::type_complexity)]
        let rows: Vec<(String, String, String, [f64; 6], Option<String>, i64, i64)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    [
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ],
                    row.get(9)?,
                    row.get(10)?,
                    row.get(11)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(id, content, kind, f, parent, created_at, last_used_at)| {
                let [length, char_index, stability, usage, curvature_signature, field_value] = f;
                Ok(NodeRecord {
                    id: parse_uuid(&id)?,
                    content,
                    kind: NodeKind::parse(&kind)
                        .ok_or_else(|| StoreError::InvalidData(format!("unknown node kind: {kind}")))?,
                    weights: NodeWeights {
                        length,
                        char_index,
                        stability,
                        usage,
                    },
                    curvature_signature,
                    field_value,
                    parent: parent.as_deref().map(parse_uuid).transpose()?,
                    children: Vec::new(),
                    neighbors: Vec::new(),
                    created_at: from_sql_millis(created_at)?,
                    last_used_at: from_sql_millis(last_used_at)?,
                })
            })
            .collect()
    }

    fn attach_children(&self, nodes: &mut [NodeRecord]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT parent_id, child_id FROM node_children ORDER BY rowid")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        for (parent, child) in rows {
            let parent = parse_uuid(&parent)?;
            let child = parse_uuid(&child)?;
            record_mut(nodes, parent)?.children.push(child);
        }
        Ok(())
    }

    fn attach_neighbors(&self, nodes: &mut [NodeRecord]) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT node_id, neighbor_id, strength FROM node_neighbors ORDER BY node_id, neighbor_id",
        )?;
        let rows: Vec<(String, String, f64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;

        for (node, neighbor, strength) in rows {
            let node = parse_uuid(&node)?;
            let id = parse_uuid(&neighbor)?;
            record_mut(nodes, node)?
                .neighbors
                .push(NeighborRecord { id, strength });
        }
        Ok(())
    }

    fn load_edges(&self) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, strength, curvature, sequential FROM edges ORDER BY rowid",
        )?;
        let rows: Vec<(String, String, f64, f64, bool)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get::<_, i32>(4)? != 0,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(source, target, strength, curvature, sequential)| {
                Ok(Edge {
                    source: parse_uuid(&source)?,
                    target: parse_uuid(&target)?,
                    strength,
                    curvature,
                    sequential,
                })
            })
            .collect()
    }

    fn load_field(&self) -> Result<FieldState> {
        let row: Option<(f64, String, f64, f64)> = self
            .conn
            .query_row(
                "SELECT u, gradients, curvature, stability FROM field_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .ok();
        let Some((u, gradients, curvature, stability)) = row else {
            return Err(StoreError::InvalidData("missing field state".to_string()));
        };
        Ok(FieldState {
            u,
            gradients: serde_json::from_str(&gradients)?,
            curvature,
            stability,
        })
    }

    fn load_stability_history(&self) -> Result<Vec<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM stability_history ORDER BY position")?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(values)
    }

    fn load_training_log(&self) -> Result<Vec<TrainingEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT prompt, response, timestamp FROM training_log ORDER BY id")?;
        let rows: Vec<(String, String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(prompt, response, timestamp)| {
                Ok(TrainingEntry {
                    prompt,
                    response,
                    timestamp: from_sql_millis(timestamp)?,
                })
            })
            .collect()
    }

    /// Fold the WAL into the main database file.
    pub fn checkpoint_truncate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.checkpoint_truncate() {
            tracing::debug!(error = %e, "WAL checkpoint on close failed");
        }
    }
}

impl SnapshotPort for Store {
    fn load(&mut self) -> std::result::Result<Option<EngineSnapshot>, PortError> {
        Ok(self.load_snapshot()?)
    }

    fn save(&mut self, snapshot: &EngineSnapshot) -> std::result::Result<(), PortError> {
        Ok(self.save_snapshot(snapshot)?)
    }

    fn erase(&mut self) -> std::result::Result<(), PortError> {
        Ok(Store::erase(self)?)
    }
}

fn set_metadata_on(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn clear_on(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM node_children;
         DELETE FROM node_neighbors;
         DELETE FROM edges;
         DELETE FROM nodes;
         DELETE FROM field_state;
         DELETE FROM stability_history;
         DELETE FROM training_log;",
    )?;
    conn.execute(
        "DELETE FROM metadata WHERE key = ?1",
        [SNAPSHOT_VERSION_KEY],
    )?;
    Ok(())
}

fn record_mut(nodes: &mut [NodeRecord], id: Uuid) -> Result<&mut NodeRecord> {
    nodes
        .iter_mut()
        .find(|n| n.id == id)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown node: {id}")))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("bad UUID '{s}': {e}")))
}

fn to_sql_millis(millis: u64) -> Result<i64> {
    i64::try_from(millis).map_err(|_| StoreError::InvalidData(format!("timestamp out of range: {millis}")))
}

fn from_sql_millis(millis: i64) -> Result<u64> {
    u64::try_from(millis).map_err(|_| StoreError::InvalidData(format!("negative timestamp: {millis}")))
}
