use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Tool,
    Agent,
    Mcp,
}

/// Ordered rule: first match wins; default on no match is `allow` (§3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub effect: Effect,
    /// `None` acts as a type wildcard.
    pub action_type: Option<ActionType>,
    pub name_pattern: String,
    pub reason: String,
}

/// The action a `PolicyEngine` evaluates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub name: String,
    pub metadata: serde_json::Value,
}

impl Action {
    pub fn tool(name: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Tool,
            name: name.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Agent,
            name: name.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn mcp(name: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Mcp,
            name: name.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// The result of evaluating an `Action` against a `PolicyRule` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub status: Effect,
    pub allowed: bool,
    pub reason: String,
    pub rule_id: Option<String>,
}

impl Decision {
    pub fn allow(reason: impl Into<String>, rule_id: Option<String>) -> Self {
        Self {
            status: Effect::Allow,
            allowed: true,
            reason: reason.into(),
            rule_id,
        }
    }

    pub fn deny(reason: impl Into<String>, rule_id: Option<String>) -> Self {
        Self {
            status: Effect::Deny,
            allowed: false,
            reason: reason.into(),
            rule_id,
        }
    }

    pub fn pending(reason: impl Into<String>, rule_id: Option<String>) -> Self {
        Self {
            status: Effect::Pending,
            allowed: false,
            reason: reason.into(),
            rule_id,
        }
    }
}
