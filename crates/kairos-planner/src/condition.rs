use kairos_protocol::{ConditionError, NodeId, PlannerState};
use serde_json::Value;

/// The field an edge condition compares: either `state.last` or a dotted
/// path into `state.outputs[nodeId]` (§4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Last,
    Output(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Empty, `default`, or `always` — the fallback edge.
    Always,
    Eq(Field, String),
    Ne(Field, String),
    Contains(Field, String),
}

fn split_operator(rest: &str) -> Result<(Field, &'static str, &str), ConditionError> {
    if let Some(idx) = rest.find(".contains:") {
        Ok((Field::Output(rest[..idx].to_owned()), "contains", &rest[idx + ".contains:".len()..]))
    } else if let Some(idx) = rest.find("!=") {
        Ok((Field::Output(rest[..idx].to_owned()), "!=", &rest[idx + 2..]))
    } else if let Some(idx) = rest.find("==") {
        Ok((Field::Output(rest[..idx].to_owned()), "==", &rest[idx + 2..]))
    } else {
        Err(ConditionError::Malformed(rest.to_owned()))
    }
}

impl Condition {
    pub fn parse(raw: Option<&str>) -> Result<Condition, ConditionError> {
        let raw = raw.unwrap_or("").trim();
        if raw.is_empty() || raw == "default" || raw == "always" {
            return Ok(Condition::Always);
        }

        if let Some(rest) = raw.strip_prefix("last") {
            return if let Some(value) = rest.strip_prefix("==") {
                Ok(Condition::Eq(Field::Last, value.to_owned()))
            } else if let Some(value) = rest.strip_prefix("!=") {
                Ok(Condition::Ne(Field::Last, value.to_owned()))
            } else if let Some(value) = rest.strip_prefix(".contains:") {
                Ok(Condition::Contains(Field::Last, value.to_owned()))
            } else {
                Err(ConditionError::Malformed(raw.to_owned()))
            };
        }

        if let Some(rest) = raw.strip_prefix("output.") {
            let (field, op, value) = split_operator(rest)?;
            return match op {
                "==" => Ok(Condition::Eq(field, value.to_owned())),
                "!=" => Ok(Condition::Ne(field, value.to_owned())),
                "contains" => Ok(Condition::Contains(field, value.to_owned())),
                _ => unreachable!(),
            };
        }

        Err(ConditionError::Malformed(raw.to_owned()))
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Condition::Always)
    }

    /// Evaluates against `state`; missing output paths yield `false` for
    /// equality and contains alike (§4.7).
    pub fn evaluate(&self, state: &PlannerState) -> bool {
        match self {
            Condition::Always => true,
            Condition::Eq(field, value) => resolve(field, state).as_deref() == Some(value.as_str()),
            Condition::Ne(field, value) => resolve(field, state).as_deref() != Some(value.as_str()),
            Condition::Contains(field, value) => {
                resolve(field, state).is_some_and(|actual| actual.contains(value.as_str()))
            }
        }
    }
}

fn resolve(field: &Field, state: &PlannerState) -> Option<String> {
    match field {
        Field::Last => state.last.as_ref().map(value_as_string),
        Field::Output(path) => resolve_output_path(path, state),
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve_output_path(path: &str, state: &PlannerState) -> Option<String> {
    let mut segments = path.split('.');
    let node_id = segments.next()?;
    let mut current = state.outputs.get(&NodeId::from_string(node_id))?;
    for key in segments {
        current = current.get(key)?;
    }
    Some(value_as_string(current))
}
