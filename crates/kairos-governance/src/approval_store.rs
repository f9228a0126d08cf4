use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairos_errors::{KairosError, KairosResult};
use kairos_protocol::{ApprovalId, ApprovalRecord, ApprovalStatus, ContextId, TaskId};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

#[derive(Debug, Clone, Default)]
pub struct ApprovalFilter {
    pub task_id: Option<TaskId>,
    pub context_id: Option<ContextId>,
    pub status: Option<ApprovalStatus>,
    pub expiring_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Persists approval records (§4.3). Filterable by task, context, status,
/// and expiry.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn put(&self, record: ApprovalRecord) -> KairosResult<()>;
    async fn get(&self, id: &ApprovalId) -> KairosResult<Option<ApprovalRecord>>;
    async fn list(&self, filter: &ApprovalFilter) -> KairosResult<Vec<ApprovalRecord>>;
    async fn update(&self, record: ApprovalRecord) -> KairosResult<()>;
}

fn matches_filter(record: &ApprovalRecord, filter: &ApprovalFilter) -> bool {
    if let Some(task_id) = &filter.task_id
        && &record.task_id != task_id
    {
        return false;
    }
    if let Some(context_id) = &filter.context_id
        && &record.context_id != context_id
    {
        return false;
    }
    if let Some(status) = filter.status
        && record.status != status
    {
        return false;
    }
    if let Some(expiring_before) = filter.expiring_before
        && record.expires_at.is_none_or(|expiry| expiry >= expiring_before)
    {
        return false;
    }
    true
}

#[derive(Default)]
pub struct InMemoryApprovalStore {
    records: Mutex<HashMap<ApprovalId, ApprovalRecord>>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn put(&self, record: ApprovalRecord) -> KairosResult<()> {
        self.records.lock().insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &ApprovalId) -> KairosResult<Option<ApprovalRecord>> {
        Ok(self.records.lock().get(id).cloned())
    }

    async fn list(&self, filter: &ApprovalFilter) -> KairosResult<Vec<ApprovalRecord>> {
        let mut matched: Vec<ApprovalRecord> = self
            .records
            .lock()
            .values()
            .filter(|r| matches_filter(r, filter))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.created_at);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn update(&self, record: ApprovalRecord) -> KairosResult<()> {
        self.records.lock().insert(record.id.clone(), record);
        Ok(())
    }
}

/// SQLite-backed approval store.
pub struct SqliteApprovalStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteApprovalStore {
    pub fn open(path: impl AsRef<Path>) -> KairosResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| KairosError::memory_error("failed opening approval store").with_cause(e))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> KairosResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KairosError::memory_error("failed opening in-memory approval store").with_cause(e))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> KairosResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS approvals (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                context_id TEXT NOT NULL,
                action TEXT NOT NULL,
                status TEXT NOT NULL,
                requester TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL,
                decided_at TEXT,
                expires_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_approvals_task ON approvals(task_id);
            CREATE INDEX IF NOT EXISTS idx_approvals_status ON approvals(status);",
        )
        .map_err(|e| KairosError::memory_error("failed creating approval schema").with_cause(e))?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApprovalRecord> {
        let status: String = row.get("status")?;
        Ok(ApprovalRecord {
            id: row.get::<_, String>("id")?.into(),
            task_id: row.get::<_, String>("task_id")?.into(),
            context_id: row.get::<_, String>("context_id")?.into(),
            action: row.get("action")?,
            status: status_from_str(&status),
            requester: row.get("requester")?,
            reason: row.get("reason")?,
            created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
            decided_at: row
                .get::<_, Option<String>>("decided_at")?
                .and_then(|s| s.parse().ok()),
            expires_at: row
                .get::<_, Option<String>>("expires_at")?
                .and_then(|s| s.parse().ok()),
        })
    }
}

fn status_to_str(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
        ApprovalStatus::Expired => "expired",
    }
}

fn status_from_str(s: &str) -> ApprovalStatus {
    match s {
        "approved" => ApprovalStatus::Approved,
        "rejected" => ApprovalStatus::Rejected,
        "expired" => ApprovalStatus::Expired,
        _ => ApprovalStatus::Pending,
    }
}

#[async_trait]
impl ApprovalStore for SqliteApprovalStore {
    async fn put(&self, record: ApprovalRecord) -> KairosResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO approvals
             (id, task_id, context_id, action, status, requester, reason, created_at, decided_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id.as_str(),
                record.task_id.as_str(),
                record.context_id.as_str(),
                record.action,
                status_to_str(record.status),
                record.requester,
                record.reason,
                record.created_at.to_rfc3339(),
                record.decided_at.map(|d| d.to_rfc3339()),
                record.expires_at.map(|d| d.to_rfc3339()),
            ],
        )
        .map_err(|e| KairosError::memory_error("failed inserting approval record").with_cause(e))?;
        Ok(())
    }

    async fn get(&self, id: &ApprovalId) -> KairosResult<Option<ApprovalRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM approvals WHERE id = ?1",
            params![id.as_str()],
            Self::row_to_record,
        )
        .optional()
        .map_err(|e| KairosError::memory_error("failed reading approval record").with_cause(e))
    }

    async fn list(&self, filter: &ApprovalFilter) -> KairosResult<Vec<ApprovalRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM approvals ORDER BY created_at ASC")
            .map_err(|e| KairosError::memory_error("failed preparing approval query").with_cause(e))?;
        let rows = stmt
            .query_map([], Self::row_to_record)
            .map_err(|e| KairosError::memory_error("failed listing approval records").with_cause(e))?;

        let mut matched = Vec::new();
        for row in rows {
            let record = row.map_err(|e| {
                KairosError::memory_error("failed decoding approval row").with_cause(e)
            })?;
            if matches_filter(&record, filter) {
                matched.push(record);
            }
        }
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn update(&self, record: ApprovalRecord) -> KairosResult<()> {
        self.put(record).await
    }
}
