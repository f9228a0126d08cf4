//! Semantic memory over a vector store and ordered conversation memory with
//! truncation strategies (§4.5).

mod conversation;
mod semantic;
mod truncation;

pub use conversation::{
    ConversationStore, FileConversationStore, InProcessConversationStore, SqlConversationStore,
};
pub use semantic::{Embedder, InMemoryVectorStore, VectorMemory, VectorStore};
pub use truncation::{
    SummarizationStrategy, Summarizer, TokenBudgetStrategy, TokenCounter, TruncationStrategy,
    WindowStrategy,
};
