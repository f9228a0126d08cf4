use std::collections::HashMap;

use kairos_errors::CancellationToken;
use kairos_protocol::TaskId;
use parking_lot::Mutex;

/// Tracks the ambient `CancellationToken` driving each in-flight task's
/// execution, so `CancelTask` (§4.9) can reach across from the request that
/// observes the cancel to the request (possibly still running on another
/// flow) that is doing the work (§5 "a streaming subscriber closure triggers
/// cancellation of the associated execution").
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<TaskId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task_id: TaskId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().insert(task_id, token.clone());
        token
    }

    pub fn cancel(&self, task_id: &TaskId) -> bool {
        if let Some(token) = self.tokens.lock().get(task_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn remove(&self, task_id: &TaskId) {
        self.tokens.lock().remove(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_reaches_registered_token() {
        let registry = CancellationRegistry::new();
        let task_id = TaskId::default();
        let token = registry.register(task_id.clone());
        assert!(registry.cancel(&task_id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_of_unknown_task_returns_false() {
        let registry = CancellationRegistry::new();
        assert!(!registry.cancel(&TaskId::default()));
    }
}
