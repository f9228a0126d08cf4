use std::collections::HashMap;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// The fixed taxonomy of error kinds produced by the Kairos runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Internal,
    InvalidInput,
    ToolFailure,
    ContextLost,
    Timeout,
    RateLimited,
    NotFound,
    Unauthorized,
    MemoryError,
    LlmError,
}

impl ErrorKind {
    /// Fixed HTTP status code mapping (§4.1, also reused by the A2A HTTP binding).
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Unauthorized => 401,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Timeout => 408,
            ErrorKind::RateLimited => 429,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::ToolFailure => "TOOL_FAILURE",
            ErrorKind::ContextLost => "CONTEXT_LOST",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::MemoryError => "MEMORY_ERROR",
            ErrorKind::LlmError => "LLM_ERROR",
        };
        f.write_str(s)
    }
}

/// The single concrete error type used across the Kairos runtime.
///
/// Carries a `kind`, a human message, an optional wrapped cause, a
/// string-to-value context map, a string-to-string telemetry attribute map,
/// and a `recoverable` flag consumed by the resilience layer.
#[derive(Debug)]
pub struct KairosError {
    pub kind: ErrorKind,
    pub message: String,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    pub context: HashMap<String, Value>,
    pub attributes: HashMap<String, String>,
    pub recoverable: bool,
}

impl KairosError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let recoverable = matches!(
            kind,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::ToolFailure
        );
        Self {
            kind,
            message: message.into(),
            cause: None,
            context: HashMap::new(),
            attributes: HashMap::new(),
            recoverable,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message).recoverable(true)
    }

    pub fn context_lost(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContextLost, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message).recoverable(true)
    }

    pub fn tool_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolFailure, message).recoverable(true)
    }

    pub fn memory_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MemoryError, message)
    }

    pub fn llm_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LlmError, message)
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

impl fmt::Display for KairosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {cause})")?;
        }
        Ok(())
    }
}

impl std::error::Error for KairosError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Field order is fixed so JSON marshaling is deterministic.
impl Serialize for KairosError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("KairosError", 6)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("message", &self.message)?;
        state.serialize_field(
            "cause",
            &self.cause.as_ref().map(|c| c.to_string()),
        )?;
        state.serialize_field("context", &self.context)?;
        state.serialize_field("attributes", &self.attributes)?;
        state.serialize_field("recoverable", &self.recoverable)?;
        state.end()
    }
}

pub type KairosResult<T> = Result<T, KairosError>;
