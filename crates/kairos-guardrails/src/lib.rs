//! Pluggable input checkers and output filters (§4.4): prompt-injection
//! detection, PII masking/redaction/hashing, and content-category filtering.

mod content_filter;
mod pii;
mod pipeline;
mod prompt_injection;

pub use content_filter::{ContentCategory, ContentFilter};
pub use pii::{PiiCategory, PiiFilter, PiiMode};
pub use pipeline::{
    CheckOutcome, InputChecker, InputPipeline, OutputFilter, OutputPipeline, Redaction,
};
pub use prompt_injection::{FailBehavior, PromptInjectionDetector};
