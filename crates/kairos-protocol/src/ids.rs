use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a `#[serde(transparent)]` newtype over `String` with the usual
/// constructors. Mirrors the teacher's `typed_id!` macro so every identifier
/// in the wire model is a distinct type rather than a bare `String`.
macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn new_uuid() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new_uuid()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(TaskId);
typed_id!(ContextId);
typed_id!(MessageId);
typed_id!(ArtifactId);
typed_id!(SessionId);
typed_id!(ApprovalId);
typed_id!(RunId);
typed_id!(GraphId);
typed_id!(NodeId);
typed_id!(ToolCallId);
