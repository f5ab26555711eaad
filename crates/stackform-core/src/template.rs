//! Synthesized template (read-only)
//!
//! ```text
//! {
//!   "Resources": { <id>: { "Type", "Properties"?, "DeletionPolicy"?,
//!                          "UpdateReplacePolicy"?, "DependsOn"?, "Condition"? } },
//!   "Conditions"?: { <name>: { "Fn::Equals" | "Fn::Not" | ... } },
//!   "Outputs"?: { <id>: { "Value", "Export"?: { "Name" } } }
//! }
//! ```

use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Template {
    document: Value,
}

impl Template {
    pub(crate) fn new(document: Value) -> Self {
        Self { document }
    }

    /// Add an export output; an existing output of the same id is kept.
    pub(crate) fn add_export(&mut self, output_id: &str, value: Value, export_name: &str) {
        let Some(root) = self.document.as_object_mut() else {
            return;
        };
        let outputs = root
            .entry("Outputs")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(outputs) = outputs.as_object_mut() {
            outputs
                .entry(output_id)
                .or_insert_with(|| json!({ "Value": value, "Export": { "Name": export_name } }));
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.document
    }

    pub fn into_value(self) -> Value {
        self.document
    }

    pub fn resources(&self) -> Option<&Map<String, Value>> {
        self.document.get("Resources").and_then(Value::as_object)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Value> {
        self.resources().and_then(|r| r.get(logical_id))
    }

    /// `(logical id, definition)` of every resource with the given type
    pub fn find_resources(&self, resource_type: &str) -> Vec<(&str, &Value)> {
        self.resources()
            .map(|r| {
                r.iter()
                    .filter(|(_, def)| def.get("Type").and_then(Value::as_str) == Some(resource_type))
                    .map(|(id, def)| (id.as_str(), def))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether some resource of the type has properties containing `expected`
    pub fn has_resource_properties(&self, resource_type: &str, expected: &Value) -> bool {
        self.find_resources(resource_type).into_iter().any(|(_, def)| {
            let props = def.get("Properties").cloned().unwrap_or_else(|| json!({}));
            is_subset(expected, &props)
        })
    }

    /// Whether some resource of the type has a definition containing `expected`
    pub fn has_resource(&self, resource_type: &str, expected: &Value) -> bool {
        self.find_resources(resource_type)
            .into_iter()
            .any(|(_, def)| is_subset(expected, def))
    }

    pub fn output(&self, output_id: &str) -> Option<&Value> {
        self.document
            .get("Outputs")
            .and_then(|o| o.get(output_id))
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.document).unwrap_or_default()
    }
}

/// Objects match when every expected key matches; everything else is equality
fn is_subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => e
            .iter()
            .all(|(k, v)| a.get(k).is_some_and(|av| is_subset(v, av))),
        _ => expected == actual,
    }
}
