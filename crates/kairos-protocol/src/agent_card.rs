use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkillSummary {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
    pub mcp: bool,
}

/// Public self-description, served at `/.well-known/agent-card.json` (§3,
/// §6). Immutable for a given build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub version: String,
    pub description: String,
    pub skills: Vec<AgentSkillSummary>,
    pub endpoints: Vec<String>,
    pub capabilities: AgentCapabilities,
}
