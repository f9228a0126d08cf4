use std::collections::HashMap;

use async_trait::async_trait;
use kairos_errors::{KairosError, KairosResult};
use kairos_skills::SkillTool;
use serde_json::{Value, json};

use crate::Tool;

/// Exposes a skill's three actions — `activate`, `load_resource`,
/// `list_resources` — as a single callable tool dispatched by an `action`
/// argument, the uniform-surface wrapper for progressive disclosure (§4.6).
pub struct SkillToolAdapter {
    inner: SkillTool,
}

impl SkillToolAdapter {
    pub fn new(inner: SkillTool) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Tool for SkillToolAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["action"],
            "properties": {
                "action": {"type": "string", "enum": ["activate", "load_resource", "list_resources"]},
                "path": {"type": "string"}
            }
        })
    }

    async fn call(&self, args: HashMap<String, Value>) -> KairosResult<Value> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| KairosError::invalid_input("missing required argument 'action'"))?;

        match action {
            "activate" => {
                let (name, instructions, resources) = self.inner.activate().await?;
                Ok(json!({"name": name, "instructions": instructions, "resources": resources}))
            }
            "list_resources" => {
                let resources = self.inner.list_resources().await?;
                Ok(json!({"resources": resources}))
            }
            "load_resource" => {
                let path = args
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| KairosError::invalid_input("missing required argument 'path' for load_resource"))?;
                let content = self.inner.load_resource(path).await?;
                Ok(json!({"content": content}))
            }
            other => Err(KairosError::invalid_input(format!("unknown skill action: {other}"))),
        }
    }
}
