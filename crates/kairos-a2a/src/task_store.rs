use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairos_errors::KairosResult;
use kairos_protocol::{ContextId, Task, TaskId, TaskState};
use parking_lot::Mutex;

/// Narrows a `list` call (§4.9 `ListTasks`).
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub context_id: Option<ContextId>,
    pub status: Option<TaskState>,
    pub updated_after: Option<DateTime<Utc>>,
    pub page_token: Option<String>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub next_page_token: Option<String>,
}

/// Persists tasks (§3, §4.9). The A2A handler is the sole mutator; task
/// identity and lifecycle live entirely in `kairos_protocol::Task`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn put(&self, task: Task) -> KairosResult<()>;
    async fn get(&self, id: &TaskId) -> KairosResult<Option<Task>>;
    async fn list(&self, filter: &TaskFilter) -> KairosResult<TaskPage>;
}

fn matches_filter(task: &Task, filter: &TaskFilter) -> bool {
    if let Some(context_id) = &filter.context_id
        && &task.context_id != context_id
    {
        return false;
    }
    if let Some(status) = filter.status
        && task.state != status
    {
        return false;
    }
    if let Some(updated_after) = filter.updated_after
        && task.updated_at <= updated_after
    {
        return false;
    }
    true
}

/// `page_token` is the decimal offset into the filtered, creation-ordered
/// result set; opaque to callers, stable only within one unpaginated scan.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn put(&self, task: Task) -> KairosResult<()> {
        self.tasks.lock().insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> KairosResult<Option<Task>> {
        Ok(self.tasks.lock().get(id).cloned())
    }

    async fn list(&self, filter: &TaskFilter) -> KairosResult<TaskPage> {
        let mut matched: Vec<Task> = self
            .tasks
            .lock()
            .values()
            .filter(|t| matches_filter(t, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let offset: usize = filter
            .page_token
            .as_deref()
            .and_then(|token| token.parse().ok())
            .unwrap_or(0);
        let page_size = filter.page_size.unwrap_or(50).max(1);

        let total = matched.len();
        let page: Vec<Task> = matched.into_iter().skip(offset).take(page_size).collect();
        let next_page_token = if offset + page.len() < total {
            Some((offset + page.len()).to_string())
        } else {
            None
        };

        Ok(TaskPage {
            tasks: page,
            next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_protocol::ContextId;

    fn sample(context_id: ContextId) -> Task {
        Task::new(context_id, Utc::now())
    }

    #[tokio::test]
    async fn put_and_get_round_trips() {
        let store = InMemoryTaskStore::new();
        let task = sample(ContextId::default());
        store.put(task.clone()).await.unwrap();
        let fetched = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, task.id);
    }

    #[tokio::test]
    async fn list_paginates_in_creation_order() {
        let store = InMemoryTaskStore::new();
        let context_id = ContextId::default();
        for _ in 0..5 {
            store.put(sample(context_id.clone())).await.unwrap();
        }

        let first = store
            .list(&TaskFilter {
                context_id: Some(context_id.clone()),
                page_size: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.tasks.len(), 2);
        assert!(first.next_page_token.is_some());

        let second = store
            .list(&TaskFilter {
                context_id: Some(context_id),
                page_size: Some(2),
                page_token: first.next_page_token,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(second.tasks.len(), 2);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = InMemoryTaskStore::new();
        let mut completed = sample(ContextId::default());
        completed.transition(TaskState::Working, Utc::now()).unwrap();
        completed.transition(TaskState::Completed, Utc::now()).unwrap();
        store.put(completed.clone()).await.unwrap();
        store.put(sample(ContextId::default())).await.unwrap();

        let page = store
            .list(&TaskFilter {
                status: Some(TaskState::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.tasks.len(), 1);
        assert_eq!(page.tasks[0].id, completed.id);
    }
}
