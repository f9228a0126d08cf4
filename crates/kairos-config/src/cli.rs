use serde_json::{Map, Value};

/// Parses `--set key.path=value` overrides (spec §4.12) into a single
/// merged JSON tree, dot paths becoming nested objects. Each value is
/// coerced in order: JSON literal, bool, int, float, else left as a
/// string.
pub fn parse_overrides<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Value {
    let mut root = Map::new();
    for pair in pairs {
        let Some((path, raw)) = pair.split_once('=') else {
            continue;
        };
        insert_dotted(&mut root, path, coerce(raw));
    }
    Value::Object(root)
}

fn coerce(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>()
        && let Some(number) = serde_json::Number::from_f64(f)
    {
        return Value::Number(number);
    }
    Value::String(raw.to_owned())
}

fn insert_dotted(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_owned(), value);
            return;
        }
        let entry = current.entry(segment.to_owned()).or_insert_with(|| Value::Object(Map::new()));
        // A later override may target a path that an earlier one already set
        // to a scalar; the later override wins and reclaims it as a map.
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry.as_object_mut().unwrap_or_else(|| unreachable!("just normalized to an object"));
    }
}

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "kairos", about = "Kairos agent runtime")]
pub struct ConfigArgs {
    /// Path to the base configuration file (yaml or json).
    #[arg(long, env = "KAIROS_CONFIG")]
    pub config: Option<String>,

    /// Configuration profile, loaded from `<base>.<profile>.<ext>` if present.
    #[arg(long, env = "KAIROS_PROFILE")]
    pub profile: Option<String>,

    /// Repeatable `key.path=value` override, applied last (highest precedence).
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_build_an_object_tree() {
        let value = parse_overrides(["llm.model=gpt-4", "llm.provider=openai"]);
        assert_eq!(value["llm"]["model"], "gpt-4");
        assert_eq!(value["llm"]["provider"], "openai");
    }

    #[test]
    fn values_coerce_through_json_bool_int_float_then_string() {
        let value = parse_overrides([
            "memory.enabled=true",
            "runtime.approval_sweep_interval_seconds=45",
            "discovery.heartbeat_seconds=12.5",
            "llm.model=gpt-4o-mini",
            "mcp.servers=[\"a\",\"b\"]",
        ]);
        assert_eq!(value["memory"]["enabled"], Value::Bool(true));
        assert_eq!(value["runtime"]["approval_sweep_interval_seconds"], 45);
        assert_eq!(value["discovery"]["heartbeat_seconds"], 12.5);
        assert_eq!(value["llm"]["model"], "gpt-4o-mini");
        assert_eq!(value["mcp"]["servers"], serde_json::json!(["a", "b"]));
    }
}
