use std::time::Duration;

use async_trait::async_trait;
use kairos_protocol::Action;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    Allow,
    Deny,
}

/// Converts a `pending` policy decision into `allow` (with human rationale)
/// or `deny` (§4.3).
#[async_trait]
pub trait ApprovalHook: Send + Sync {
    async fn resolve(&self, action: &Action, reason: &str) -> (HookDecision, String);
}

/// Prompts on stdin/stdout with a configurable prompt, timeout, and default
/// decision on timeout.
pub struct ConsoleApprovalHook {
    pub prompt: String,
    pub timeout: Duration,
    pub default_decision: HookDecision,
}

impl Default for ConsoleApprovalHook {
    fn default() -> Self {
        Self {
            prompt: "Approve action? [y/N]: ".to_owned(),
            timeout: Duration::from_secs(30),
            default_decision: HookDecision::Deny,
        }
    }
}

#[async_trait]
impl ApprovalHook for ConsoleApprovalHook {
    async fn resolve(&self, action: &Action, reason: &str) -> (HookDecision, String) {
        let mut stdout = tokio::io::stdout();
        let _ = stdout
            .write_all(
                format!(
                    "{}\naction: {} ({:?})\n{}",
                    reason, action.name, action.action_type, self.prompt
                )
                .as_bytes(),
            )
            .await;
        let _ = stdout.flush().await;

        let read_line = async {
            let mut reader = BufReader::new(tokio::io::stdin());
            let mut line = String::new();
            reader.read_line(&mut line).await.map(|_| line)
        };

        match tokio::time::timeout(self.timeout, read_line).await {
            Ok(Ok(line)) => {
                let trimmed = line.trim().to_lowercase();
                if trimmed == "y" || trimmed == "yes" {
                    (HookDecision::Allow, "approved via console".to_owned())
                } else {
                    (HookDecision::Deny, "rejected via console".to_owned())
                }
            }
            _ => (
                self.default_decision,
                "no response within timeout, applying default decision".to_owned(),
            ),
        }
    }
}
