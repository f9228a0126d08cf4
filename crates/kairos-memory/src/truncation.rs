use async_trait::async_trait;
use kairos_protocol::{ConversationMessage, ConversationRole};

/// Applied on read (§4.5). Implementations never reorder; they only select
/// a subset (window, token-budget) or replace a prefix with a summary.
#[async_trait]
pub trait TruncationStrategy: Send + Sync {
    async fn apply(&self, messages: Vec<ConversationMessage>) -> Vec<ConversationMessage>;
}

/// Keeps the last `keep_last` messages; optionally pins all system-role
/// messages regardless of position (§4.5, §8 "truncation preservation").
pub struct WindowStrategy {
    pub keep_last: usize,
    pub keep_system: bool,
}

impl WindowStrategy {
    pub fn new(keep_last: usize) -> Self {
        Self {
            keep_last,
            keep_system: false,
        }
    }

    pub fn keep_system(mut self, keep_system: bool) -> Self {
        self.keep_system = keep_system;
        self
    }
}

#[async_trait]
impl TruncationStrategy for WindowStrategy {
    async fn apply(&self, messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        if messages.len() <= self.keep_last {
            return messages;
        }

        if !self.keep_system {
            return messages[messages.len() - self.keep_last..].to_vec();
        }

        let (system, rest): (Vec<_>, Vec<_>) = messages
            .into_iter()
            .partition(|m| m.role == ConversationRole::System);
        let tail_budget = self.keep_last.saturating_sub(system.len());
        let tail = if rest.len() > tail_budget {
            rest[rest.len() - tail_budget..].to_vec()
        } else {
            rest
        };

        // System messages keep their original relative order and precede the
        // retained tail, so callers see a stable "preamble + recent window".
        let mut out = system;
        out.extend(tail);
        out
    }
}

/// Pluggable token counter; the default `len(content)/4` approximation is
/// not a contract (§9 open question).
pub type TokenCounter = std::sync::Arc<dyn Fn(&str) -> usize + Send + Sync>;

fn default_token_counter() -> TokenCounter {
    std::sync::Arc::new(|content: &str| content.len() / 4)
}

/// Keeps messages from the tail until the budget is exhausted; optionally
/// pins system messages against the budget (counted but never dropped).
pub struct TokenBudgetStrategy {
    pub budget: usize,
    pub counter: TokenCounter,
    pub keep_system: bool,
}

impl TokenBudgetStrategy {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            counter: default_token_counter(),
            keep_system: false,
        }
    }

    pub fn with_counter(mut self, counter: TokenCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn keep_system(mut self, keep_system: bool) -> Self {
        self.keep_system = keep_system;
        self
    }
}

#[async_trait]
impl TruncationStrategy for TokenBudgetStrategy {
    async fn apply(&self, messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        let (system, rest): (Vec<_>, Vec<_>) = if self.keep_system {
            messages
                .into_iter()
                .partition(|m| m.role == ConversationRole::System)
        } else {
            (Vec::new(), messages)
        };

        let mut spent: usize = system.iter().map(|m| (self.counter)(&m.content)).sum();
        let mut kept_rest = Vec::new();
        for message in rest.into_iter().rev() {
            let cost = (self.counter)(&message.content);
            if spent + cost > self.budget && !kept_rest.is_empty() {
                break;
            }
            spent += cost;
            kept_rest.push(message);
        }
        kept_rest.reverse();

        let mut out = system;
        out.extend(kept_rest);
        out
    }
}

/// Summarizes the oldest `K` messages and replaces them with a single
/// `type=summary` system message, once the conversation exceeds `threshold`
/// messages (§4.5).
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[ConversationMessage]) -> String;
}

pub struct SummarizationStrategy {
    pub threshold: usize,
    pub summarize_k: usize,
    pub summarizer: std::sync::Arc<dyn Summarizer>,
    pub keep_system_unsummarized: bool,
}

impl SummarizationStrategy {
    pub fn new(threshold: usize, summarize_k: usize, summarizer: std::sync::Arc<dyn Summarizer>) -> Self {
        Self {
            threshold,
            summarize_k,
            summarizer,
            keep_system_unsummarized: true,
        }
    }
}

#[async_trait]
impl TruncationStrategy for SummarizationStrategy {
    async fn apply(&self, messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
        if messages.len() <= self.threshold {
            return messages;
        }

        let k = self.summarize_k.min(messages.len());
        let (candidates, rest) = messages.split_at(k);

        let (system, to_summarize): (Vec<_>, Vec<_>) = if self.keep_system_unsummarized {
            candidates
                .iter()
                .cloned()
                .partition(|m| m.role == ConversationRole::System)
        } else {
            (Vec::new(), candidates.to_vec())
        };

        if to_summarize.is_empty() {
            let mut out = system;
            out.extend(rest.to_vec());
            return out;
        }

        let summary_text = self.summarizer.summarize(&to_summarize).await;
        let anchor = to_summarize[0].created_at;
        let mut summary = ConversationMessage::new(
            to_summarize[0].session_id.clone(),
            ConversationRole::System,
            summary_text,
            anchor,
        );
        summary.metadata = serde_json::json!({"type": "summary"});

        let mut out = system;
        out.push(summary);
        out.extend(rest.to_vec());
        out
    }
}
