use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairos_errors::{KairosError, KairosResult};
use kairos_protocol::{GraphId, NodeId, RunId};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Started,
    Completed,
    Failed,
}

impl AuditStatus {
    fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Started => "started",
            AuditStatus::Completed => "completed",
            AuditStatus::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "completed" => AuditStatus::Completed,
            "failed" => AuditStatus::Failed,
            _ => AuditStatus::Started,
        }
    }
}

/// One audit entry per node visit (§4.7); `status` moves
/// started→completed|failed in place, keyed by `run_id:node_id`.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub id: String,
    pub graph_id: GraphId,
    pub run_id: RunId,
    pub node_id: NodeId,
    pub node_type: String,
    pub status: AuditStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AuditRecord {
    pub fn started(graph_id: GraphId, run_id: RunId, node_id: NodeId, node_type: impl Into<String>) -> Self {
        Self {
            id: format!("{run_id}:{node_id}"),
            graph_id,
            run_id,
            node_id,
            node_type: node_type.into(),
            status: AuditStatus::Started,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn complete(mut self, output: Value) -> Self {
        self.status = AuditStatus::Completed;
        self.output = Some(output);
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = AuditStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub graph_id: Option<GraphId>,
    pub node_id: Option<NodeId>,
    pub status: Option<AuditStatus>,
    pub limit: Option<usize>,
}

fn matches_filter(record: &AuditRecord, filter: &AuditFilter) -> bool {
    if let Some(graph_id) = &filter.graph_id
        && &record.graph_id != graph_id
    {
        return false;
    }
    if let Some(node_id) = &filter.node_id
        && &record.node_id != node_id
    {
        return false;
    }
    if let Some(status) = filter.status
        && record.status != status
    {
        return false;
    }
    true
}

/// Records node execution audit events; filterable by graph, node, status,
/// and limit (§4.7).
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(&self, record: AuditRecord) -> KairosResult<()>;
    async fn list(&self, filter: &AuditFilter) -> KairosResult<Vec<AuditRecord>>;
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    records: Mutex<HashMap<String, AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record(&self, record: AuditRecord) -> KairosResult<()> {
        self.records.lock().insert(record.id.clone(), record);
        Ok(())
    }

    async fn list(&self, filter: &AuditFilter) -> KairosResult<Vec<AuditRecord>> {
        let mut matched: Vec<AuditRecord> = self
            .records
            .lock()
            .values()
            .filter(|r| matches_filter(r, filter))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.started_at);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

/// SQLite-backed audit store with an indexed `(graph_id, node_id, status)`
/// schema (§4.7).
pub struct SqliteAuditStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    pub fn open(path: impl AsRef<Path>) -> KairosResult<Self> {
        let conn = Connection::open(path).map_err(|e| KairosError::memory_error("failed opening audit store").with_cause(e))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> KairosResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KairosError::memory_error("failed opening in-memory audit store").with_cause(e))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn init_schema(conn: &Connection) -> KairosResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_events (
                id TEXT PRIMARY KEY,
                graph_id TEXT NOT NULL,
                run_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                node_type TEXT NOT NULL,
                status TEXT NOT NULL,
                output TEXT,
                error TEXT,
                started_at TEXT NOT NULL,
                finished_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_audit_graph_node_status
                ON audit_events(graph_id, node_id, status);",
        )
        .map_err(|e| KairosError::memory_error("failed creating audit schema").with_cause(e))?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
        let output: Option<String> = row.get("output")?;
        Ok(AuditRecord {
            id: row.get("id")?,
            graph_id: row.get::<_, String>("graph_id")?.into(),
            run_id: row.get::<_, String>("run_id")?.into(),
            node_id: row.get::<_, String>("node_id")?.into(),
            node_type: row.get("node_type")?,
            status: AuditStatus::from_str(&row.get::<_, String>("status")?),
            output: output.and_then(|s| serde_json::from_str(&s).ok()),
            error: row.get("error")?,
            started_at: row.get::<_, String>("started_at")?.parse().unwrap_or_else(|_| Utc::now()),
            finished_at: row.get::<_, Option<String>>("finished_at")?.and_then(|s| s.parse().ok()),
        })
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn record(&self, record: AuditRecord) -> KairosResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO audit_events
             (id, graph_id, run_id, node_id, node_type, status, output, error, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.graph_id.as_str(),
                record.run_id.as_str(),
                record.node_id.as_str(),
                record.node_type,
                record.status.as_str(),
                record.output.as_ref().map(|v| v.to_string()),
                record.error,
                record.started_at.to_rfc3339(),
                record.finished_at.map(|d| d.to_rfc3339()),
            ],
        )
        .map_err(|e| KairosError::memory_error("failed inserting audit record").with_cause(e))?;
        Ok(())
    }

    async fn list(&self, filter: &AuditFilter) -> KairosResult<Vec<AuditRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM audit_events ORDER BY started_at ASC")
            .map_err(|e| KairosError::memory_error("failed preparing audit query").with_cause(e))?;
        let rows = stmt
            .query_map([], Self::row_to_record)
            .map_err(|e| KairosError::memory_error("failed listing audit records").with_cause(e))?;

        let mut matched = Vec::new();
        for row in rows {
            let record = row.map_err(|e| KairosError::memory_error("failed decoding audit row").with_cause(e))?;
            if matches_filter(&record, filter) {
                matched.push(record);
            }
        }
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuditRecord {
        AuditRecord::started(GraphId::default(), RunId::default(), NodeId::from_string("n1"), "tool")
    }

    #[tokio::test]
    async fn in_memory_store_tracks_status_transition() {
        let store = InMemoryAuditStore::new();
        let record = sample();
        let id = record.id.clone();
        store.record(record.clone()).await.unwrap();
        store.record(record.complete(serde_json::json!("ok"))).await.unwrap();

        let all = store.list(&AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].status, AuditStatus::Completed);
    }

    #[tokio::test]
    async fn sqlite_store_filters_by_status() {
        let store = SqliteAuditStore::open_in_memory().unwrap();
        let record = sample();
        store.record(record.clone()).await.unwrap();
        store.record(record.fail("boom")).await.unwrap();

        let failed = store
            .list(&AuditFilter {
                status: Some(AuditStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("boom"));

        let started = store
            .list(&AuditFilter {
                status: Some(AuditStatus::Started),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(started.is_empty());
    }
}
