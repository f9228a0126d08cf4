use std::collections::HashMap;

use kairos_protocol::{StreamResponse, TaskId};
use parking_lot::Mutex;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Per-task broadcast channels for `StreamResponse` events (§4.9, §5 "within
/// a stream, the server sends events in causal order"). One channel per task,
/// created lazily on first publish or subscribe and left in place for the
/// life of the process; a terminal event is the last thing ever published on
/// a channel, so no explicit teardown is required.
#[derive(Default)]
pub struct StreamHub {
    channels: Mutex<HashMap<TaskId, broadcast::Sender<StreamResponse>>>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, task_id: &TaskId) -> broadcast::Sender<StreamResponse> {
        let mut channels = self.channels.lock();
        channels
            .entry(task_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publishes an event to any current subscribers. Dropped silently if
    /// nobody is listening, matching `tokio::sync::broadcast`'s semantics —
    /// a stream with no subscribers is simply not observed, not an error.
    pub fn publish(&self, task_id: &TaskId, event: StreamResponse) {
        let _ = self.sender(task_id).send(event);
    }

    pub fn subscribe(&self, task_id: &TaskId) -> broadcast::Receiver<StreamResponse> {
        self.sender(task_id).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_protocol::TaskState;

    #[tokio::test]
    async fn subscriber_observes_published_events_in_order() {
        let hub = StreamHub::new();
        let task_id = TaskId::default();
        let mut rx = hub.subscribe(&task_id);

        hub.publish(&task_id, StreamResponse::working(task_id.clone()));
        hub.publish(&task_id, StreamResponse::terminal(task_id.clone(), TaskState::Completed));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(!first.is_final());
        assert!(second.is_final());
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let hub = StreamHub::new();
        hub.publish(&TaskId::default(), StreamResponse::working(TaskId::default()));
    }
}
