use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kairos_protocol::ApprovalStatus;
use tracing::{info, warn};

use crate::approval_store::{ApprovalFilter, ApprovalStore};

/// Background task that ticks at `interval`, scans pending records older
/// than `timeout`, and transitions them to `expired` (§4.3, §4.11). Created
/// only if `interval` is positive; shuts down cleanly on runtime shutdown.
pub struct ApprovalSweeper {
    handle: tokio::task::JoinHandle<()>,
}

impl ApprovalSweeper {
    pub fn spawn(
        store: Arc<dyn ApprovalStore>,
        interval: Duration,
        timeout: Duration,
    ) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = sweep_once(store.as_ref(), timeout).await {
                    warn!(%err, "approval sweep failed");
                }
            }
        });

        Some(Self { handle })
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

async fn sweep_once(store: &dyn ApprovalStore, timeout: Duration) -> anyhow::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::from_std(timeout)?;
    let pending = store
        .list(&ApprovalFilter {
            status: Some(ApprovalStatus::Pending),
            ..Default::default()
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    for mut record in pending {
        if record.created_at < cutoff {
            let id = record.id.clone();
            if record.decide(ApprovalStatus::Expired, Utc::now()).is_ok() {
                store
                    .update(record)
                    .await
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
                info!(approval_id = %id, "expired pending approval");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval_store::InMemoryApprovalStore;
    use kairos_protocol::{ApprovalRecord, ContextId, TaskId};

    #[tokio::test]
    async fn sweep_expires_records_older_than_timeout() {
        let store: Arc<dyn ApprovalStore> = Arc::new(InMemoryApprovalStore::new());
        let mut record = ApprovalRecord::new(
            TaskId::default(),
            ContextId::default(),
            "delete_file",
            "user",
            "needs review",
            Utc::now() - chrono::Duration::seconds(120),
            None,
        );
        record.created_at = Utc::now() - chrono::Duration::seconds(120);
        store.put(record.clone()).await.unwrap();

        sweep_once(store.as_ref(), Duration::from_secs(60)).await.unwrap();

        let fetched = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ApprovalStatus::Expired);
    }
}
