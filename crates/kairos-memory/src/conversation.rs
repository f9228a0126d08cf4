use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairos_errors::{KairosError, KairosResult};
use kairos_protocol::{ConversationMessage, SessionId};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use tokio::fs;
use tracing::instrument;

/// Ordered append-only conversation log, keyed by session (§4.5). Within a
/// session, ordering is preserved across reads (§5).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(&self, message: ConversationMessage) -> KairosResult<()>;
    async fn list(&self, session_id: &SessionId) -> KairosResult<Vec<ConversationMessage>>;
    async fn list_last_n(&self, session_id: &SessionId, n: usize) -> KairosResult<Vec<ConversationMessage>>;
    async fn clear(&self, session_id: &SessionId) -> KairosResult<()>;
    /// Removes messages older than `cutoff` across all sessions.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> KairosResult<()>;
}

fn ordered(mut messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    messages
}

/// In-process store, one lock per registry (cheap; contention is per-call,
/// not per-session, matching the teacher's `Mutex<HashMap<..>>` idiom for
/// small in-memory registries).
#[derive(Default)]
pub struct InProcessConversationStore {
    sessions: Mutex<HashMap<SessionId, Vec<ConversationMessage>>>,
}

impl InProcessConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InProcessConversationStore {
    async fn append(&self, message: ConversationMessage) -> KairosResult<()> {
        self.sessions
            .lock()
            .entry(message.session_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn list(&self, session_id: &SessionId) -> KairosResult<Vec<ConversationMessage>> {
        Ok(ordered(
            self.sessions.lock().get(session_id).cloned().unwrap_or_default(),
        ))
    }

    async fn list_last_n(&self, session_id: &SessionId, n: usize) -> KairosResult<Vec<ConversationMessage>> {
        let all = self.list(session_id).await?;
        let skip = all.len().saturating_sub(n);
        Ok(all[skip..].to_vec())
    }

    async fn clear(&self, session_id: &SessionId) -> KairosResult<()> {
        self.sessions.lock().remove(session_id);
        Ok(())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> KairosResult<()> {
        for messages in self.sessions.lock().values_mut() {
            messages.retain(|m| m.created_at >= cutoff);
        }
        Ok(())
    }
}

/// Sanitizes a session id into a safe file basename: only
/// alphanumerics, `-`, and `_` survive, matching §6's "sanitized basenames".
fn sanitize_basename(session_id: &SessionId) -> String {
    session_id
        .as_str()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// File-per-session JSON store: `<baseDir>/<sessionId>.json` (§6).
pub struct FileConversationStore {
    base_dir: PathBuf,
    locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileConversationStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.base_dir.join(format!("{}.json", sanitize_basename(session_id)))
    }

    fn lock_for(&self, session_id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn read_all(path: &Path) -> KairosResult<Vec<ConversationMessage>> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path)
            .await
            .map_err(|e| KairosError::memory_error("failed reading conversation file").with_cause(e))?;
        serde_json::from_str(&raw)
            .map_err(|e| KairosError::memory_error("failed parsing conversation file").with_cause(e))
    }

    async fn write_all(path: &Path, messages: &[ConversationMessage]) -> KairosResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| KairosError::memory_error("failed creating conversation directory").with_cause(e))?;
        }
        let payload = serde_json::to_string_pretty(messages)
            .map_err(|e| KairosError::memory_error("failed serializing conversation").with_cause(e))?;
        fs::write(path, payload)
            .await
            .map_err(|e| KairosError::memory_error("failed writing conversation file").with_cause(e))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    #[instrument(skip(self, message), fields(session = %message.session_id))]
    async fn append(&self, message: ConversationMessage) -> KairosResult<()> {
        let path = self.path_for(&message.session_id);
        let lock = self.lock_for(&message.session_id);
        let _guard = lock.lock().await;

        let mut messages = Self::read_all(&path).await?;
        messages.push(message);
        Self::write_all(&path, &messages).await
    }

    async fn list(&self, session_id: &SessionId) -> KairosResult<Vec<ConversationMessage>> {
        let path = self.path_for(session_id);
        Ok(ordered(Self::read_all(&path).await?))
    }

    async fn list_last_n(&self, session_id: &SessionId, n: usize) -> KairosResult<Vec<ConversationMessage>> {
        let all = self.list(session_id).await?;
        let skip = all.len().saturating_sub(n);
        Ok(all[skip..].to_vec())
    }

    async fn clear(&self, session_id: &SessionId) -> KairosResult<()> {
        let path = self.path_for(session_id);
        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path)
                .await
                .map_err(|e| KairosError::memory_error("failed clearing conversation file").with_cause(e))?;
        }
        Ok(())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> KairosResult<()> {
        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| KairosError::memory_error("failed listing conversation directory").with_cause(e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KairosError::memory_error("failed reading conversation directory entry").with_cause(e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let mut messages = Self::read_all(&path).await?;
            messages.retain(|m| m.created_at >= cutoff);
            Self::write_all(&path, &messages).await?;
        }
        Ok(())
    }
}

/// SQL-backed store with indices on `(sessionId)`, `(createdAt)`, and
/// `(sessionId, createdAt, id)` (§4.5).
pub struct SqlConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlConversationStore {
    pub fn open(path: impl AsRef<Path>) -> KairosResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| KairosError::memory_error("failed opening conversation database").with_cause(e))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> KairosResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KairosError::memory_error("failed opening in-memory conversation database").with_cause(e))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> KairosResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversation_messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                tool_call_id TEXT,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conv_session ON conversation_messages(session_id);
            CREATE INDEX IF NOT EXISTS idx_conv_created_at ON conversation_messages(created_at);
            CREATE INDEX IF NOT EXISTS idx_conv_session_created_id
                ON conversation_messages(session_id, created_at, id);",
        )
        .map_err(|e| KairosError::memory_error("failed creating conversation schema").with_cause(e))?;
        Ok(())
    }

    fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationMessage> {
        let role: String = row.get("role")?;
        let metadata: String = row.get("metadata")?;
        Ok(ConversationMessage {
            id: row.get("id")?,
            session_id: row.get::<_, String>("session_id")?.into(),
            role: role_from_str(&role),
            content: row.get("content")?,
            tool_call_id: row.get::<_, Option<String>>("tool_call_id")?.map(Into::into),
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
            created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        })
    }
}

fn role_to_str(role: kairos_protocol::ConversationRole) -> &'static str {
    match role {
        kairos_protocol::ConversationRole::User => "user",
        kairos_protocol::ConversationRole::Assistant => "assistant",
        kairos_protocol::ConversationRole::System => "system",
        kairos_protocol::ConversationRole::Tool => "tool",
    }
}

fn role_from_str(s: &str) -> kairos_protocol::ConversationRole {
    match s {
        "assistant" => kairos_protocol::ConversationRole::Assistant,
        "system" => kairos_protocol::ConversationRole::System,
        "tool" => kairos_protocol::ConversationRole::Tool,
        _ => kairos_protocol::ConversationRole::User,
    }
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn append(&self, message: ConversationMessage) -> KairosResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO conversation_messages
             (id, session_id, role, content, tool_call_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                message.session_id.as_str(),
                role_to_str(message.role),
                message.content,
                message.tool_call_id.as_ref().map(|t| t.as_str()),
                message.metadata.to_string(),
                message.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| KairosError::memory_error("failed inserting conversation message").with_cause(e))?;
        Ok(())
    }

    async fn list(&self, session_id: &SessionId) -> KairosResult<Vec<ConversationMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM conversation_messages WHERE session_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|e| KairosError::memory_error("failed preparing conversation query").with_cause(e))?;
        let rows = stmt
            .query_map(params![session_id.as_str()], Self::row_to_message)
            .map_err(|e| KairosError::memory_error("failed listing conversation messages").with_cause(e))?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(|e| KairosError::memory_error("failed decoding conversation row").with_cause(e))?);
        }
        Ok(messages)
    }

    async fn list_last_n(&self, session_id: &SessionId, n: usize) -> KairosResult<Vec<ConversationMessage>> {
        let all = self.list(session_id).await?;
        let skip = all.len().saturating_sub(n);
        Ok(all[skip..].to_vec())
    }

    async fn clear(&self, session_id: &SessionId) -> KairosResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM conversation_messages WHERE session_id = ?1",
            params![session_id.as_str()],
        )
        .map_err(|e| KairosError::memory_error("failed clearing conversation messages").with_cause(e))?;
        Ok(())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> KairosResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM conversation_messages WHERE created_at < ?1",
            params![cutoff.to_rfc3339()],
        )
        .map_err(|e| KairosError::memory_error("failed pruning conversation messages").with_cause(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_protocol::ConversationRole;

    fn message(session: &SessionId, content: &str, at: DateTime<Utc>) -> ConversationMessage {
        ConversationMessage::new(session.clone(), ConversationRole::User, content, at)
    }

    #[tokio::test]
    async fn in_process_store_preserves_append_order() {
        let store = InProcessConversationStore::new();
        let session = SessionId::default();
        let now = Utc::now();
        store.append(message(&session, "first", now)).await.unwrap();
        store
            .append(message(&session, "second", now + chrono::Duration::seconds(1)))
            .await
            .unwrap();

        let all = store.list(&session).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "first");
        assert_eq!(all[1].content, "second");
    }

    #[tokio::test]
    async fn last_n_returns_tail() {
        let store = InProcessConversationStore::new();
        let session = SessionId::default();
        let now = Utc::now();
        for i in 0..5 {
            store
                .append(message(&session, &i.to_string(), now + chrono::Duration::seconds(i)))
                .await
                .unwrap();
        }
        let last_two = store.list_last_n(&session, 2).await.unwrap();
        assert_eq!(last_two.iter().map(|m| m.content.clone()).collect::<Vec<_>>(), vec!["3", "4"]);
    }

    #[tokio::test]
    async fn file_store_roundtrips_through_sanitized_basename() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConversationStore::new(dir.path());
        let session = SessionId::from_string("weird/session:id");
        store.append(message(&session, "hi", Utc::now())).await.unwrap();

        let listed = store.list(&session).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "hi");
    }

    #[tokio::test]
    async fn sql_store_orders_by_created_at_then_id() {
        let store = SqlConversationStore::open_in_memory().unwrap();
        let session = SessionId::default();
        let now = Utc::now();
        store.append(message(&session, "a", now)).await.unwrap();
        store
            .append(message(&session, "b", now + chrono::Duration::seconds(5)))
            .await
            .unwrap();

        let all = store.list(&session).await.unwrap();
        assert_eq!(all.iter().map(|m| m.content.clone()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn prune_removes_messages_older_than_cutoff() {
        let store = InProcessConversationStore::new();
        let session = SessionId::default();
        let now = Utc::now();
        store.append(message(&session, "old", now - chrono::Duration::days(2))).await.unwrap();
        store.append(message(&session, "new", now)).await.unwrap();

        store.prune_older_than(now - chrono::Duration::days(1)).await.unwrap();

        let remaining = store.list(&session).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "new");
    }
}
