use serde_json::{Map, Value};

/// Rewrites known compatibility aliases in place before the merged tree is
/// deserialized into [`crate::model::KairosConfig`] (spec §4.12):
///
/// - `mcpServers` aliases `mcp.servers`.
/// - an MCP server entry's `type` is renamed to `transport` when `transport`
///   is absent.
/// - flat `telemetry.otlp_*` keys alias the nested `telemetry.otlp.*` shape
///   some callers prefer.
pub fn apply(value: &mut Value) {
    alias_mcp_servers(value);
    rename_mcp_server_type(value);
    flatten_telemetry_otlp(value);
}

fn as_object_mut(value: &mut Value) -> Option<&mut Map<String, Value>> {
    value.as_object_mut()
}

fn alias_mcp_servers(value: &mut Value) {
    let Some(root) = as_object_mut(value) else { return };
    let Some(alias) = root.remove("mcpServers") else { return };
    let mcp = root.entry("mcp").or_insert_with(|| Value::Object(Map::new()));
    let Some(mcp) = mcp.as_object_mut() else { return };
    if !mcp.contains_key("servers") {
        mcp.insert("servers".to_owned(), alias);
    }
}

fn rename_mcp_server_type(value: &mut Value) {
    let Some(servers) = value
        .as_object_mut()
        .and_then(|root| root.get_mut("mcp"))
        .and_then(|mcp| mcp.as_object_mut())
        .and_then(|mcp| mcp.get_mut("servers"))
        .and_then(|servers| servers.as_object_mut())
    else {
        return;
    };
    for entry in servers.values_mut() {
        let Some(entry) = entry.as_object_mut() else { continue };
        if !entry.contains_key("transport")
            && let Some(kind) = entry.remove("type")
        {
            entry.insert("transport".to_owned(), kind);
        }
    }
}

fn flatten_telemetry_otlp(value: &mut Value) {
    let Some(telemetry) = value
        .as_object_mut()
        .and_then(|root| root.get_mut("telemetry"))
        .and_then(|t| t.as_object_mut())
    else {
        return;
    };
    let Some(nested) = telemetry.remove("otlp") else { return };
    let Some(nested) = nested.as_object() else { return };
    for (key, value) in nested {
        let flat_key = format!("otlp_{key}");
        telemetry.entry(flat_key).or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mcp_servers_alias_is_adopted_when_mcp_servers_absent() {
        let mut value = json!({ "mcpServers": { "fs": { "command": "mcp-fs" } } });
        apply(&mut value);
        assert_eq!(value["mcp"]["servers"]["fs"]["command"], "mcp-fs");
        assert!(value.get("mcpServers").is_none());
    }

    #[test]
    fn server_type_renames_to_transport_when_transport_absent() {
        let mut value = json!({ "mcp": { "servers": { "fs": { "type": "stdio" } } } });
        apply(&mut value);
        assert_eq!(value["mcp"]["servers"]["fs"]["transport"], "stdio");
        assert!(value["mcp"]["servers"]["fs"].get("type").is_none());
    }

    #[test]
    fn server_type_is_ignored_when_transport_already_present() {
        let mut value = json!({ "mcp": { "servers": { "fs": { "type": "stdio", "transport": "http" } } } });
        apply(&mut value);
        assert_eq!(value["mcp"]["servers"]["fs"]["transport"], "http");
    }

    #[test]
    fn nested_otlp_keys_alias_to_flat_keys() {
        let mut value = json!({ "telemetry": { "otlp": { "endpoint": "http://collector:4317" } } });
        apply(&mut value);
        assert_eq!(value["telemetry"]["otlp_endpoint"], "http://collector:4317");
    }
}
