use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ArtifactId, MessageId};
use crate::{ContextId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Agent,
    System,
}

/// A tagged part of a message body (§3). Forward-compatible: an unrecognized
/// `type` tag deserializes into `Custom` and serializes back under its
/// original tag, the same way the teacher's `EventKind` falls back for
/// unknown event types via a hand-written `Deserialize` impl.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Part {
    Text { text: String },
    /// Arbitrary JSON-compatible tree. Numeric values are normalized to
    /// floating-point and timestamp-shaped strings to RFC3339 by the caller
    /// before constructing this variant; the wire type itself is opaque.
    Data { data: Value },
    File {
        artifact_id: ArtifactId,
        mime_type: Option<String>,
        name: Option<String>,
    },
    /// Unknown part types round-trip through their canonical string form
    /// rather than being rejected.
    Custom { part_type: String, data: Value },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PartKnown {
    Text { text: String },
    Data { data: Value },
    File {
        artifact_id: ArtifactId,
        mime_type: Option<String>,
        name: Option<String>,
    },
}

impl Serialize for Part {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Part::Text { text } => PartKnown::Text { text: text.clone() }.serialize(serializer),
            Part::Data { data } => PartKnown::Data { data: data.clone() }.serialize(serializer),
            Part::File {
                artifact_id,
                mime_type,
                name,
            } => PartKnown::File {
                artifact_id: artifact_id.clone(),
                mime_type: mime_type.clone(),
                name: name.clone(),
            }
            .serialize(serializer),
            Part::Custom { part_type, data } => {
                let mut merged = data.clone();
                if let Value::Object(map) = &mut merged {
                    map.insert("type".to_owned(), Value::String(part_type.clone()));
                }
                merged.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let part_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        match serde_json::from_value::<PartKnown>(value.clone()) {
            Ok(PartKnown::Text { text }) => Ok(Part::Text { text }),
            Ok(PartKnown::Data { data }) => Ok(Part::Data { data }),
            Ok(PartKnown::File {
                artifact_id,
                mime_type,
                name,
            }) => Ok(Part::File {
                artifact_id,
                mime_type,
                name,
            }),
            Err(_) => Ok(Part::Custom {
                part_type,
                data: value,
            }),
        }
    }
}

/// Immutable after creation. Ordered parts, role, and the task/context it
/// belongs to (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub task_id: TaskId,
    pub context_id: ContextId,
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(task_id: TaskId, context_id: ContextId, role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: MessageId::default(),
            task_id,
            context_id,
            role,
            parts,
        }
    }

    pub fn text(task_id: TaskId, context_id: ContextId, role: Role, text: impl Into<String>) -> Self {
        Self::new(task_id, context_id, role, vec![Part::Text { text: text.into() }])
    }

    pub fn as_text(&self) -> Option<String> {
        let joined: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if joined.is_empty() {
            None
        } else {
            Some(joined.join(""))
        }
    }
}
