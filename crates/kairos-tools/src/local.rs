use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use kairos_errors::KairosResult;
use serde_json::Value;

use crate::Tool;

pub type LocalToolFn =
    Arc<dyn Fn(HashMap<String, Value>) -> Pin<Box<dyn Future<Output = KairosResult<Value>> + Send>> + Send + Sync>;

/// A tool backed by a local async function, the plain-function case of the
/// uniform tool surface (§4.6).
pub struct LocalTool {
    name: String,
    description: String,
    schema: Value,
    func: LocalToolFn,
}

impl LocalTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value, func: LocalToolFn) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            func,
        }
    }
}

#[async_trait]
impl Tool for LocalTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        self.schema.clone()
    }

    async fn call(&self, args: HashMap<String, Value>) -> KairosResult<Value> {
        (self.func)(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn local_tool_invokes_its_function() {
        let tool = LocalTool::new(
            "sum",
            "adds a and b",
            json!({"type": "object", "properties": {"a": {"type": "number"}, "b": {"type": "number"}}}),
            Arc::new(|args| {
                Box::pin(async move {
                    let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
                    let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
                    Ok(json!(a + b))
                })
            }),
        );

        let mut args = HashMap::new();
        args.insert("a".to_owned(), json!(2));
        args.insert("b".to_owned(), json!(3));
        let result = tool.call(args).await.unwrap();
        assert_eq!(result, json!(5.0));
    }
}
