use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::env::StackEnv;

// ── Helper defaults for serde ──

fn default_true() -> bool {
    true
}

// ── Top-level DTO ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDto {
    #[serde(default)]
    pub settings: SettingsDto,
    pub stacks: Vec<StackDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsDto {
    /// Fold literal sub-trees during synthesis
    #[serde(default = "default_true")]
    pub fold: bool,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self { fold: true }
    }
}

// ── Stack ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackDto {
    pub name: String,
    #[serde(default)]
    pub env: StackEnv,
    #[serde(default)]
    pub resources: Vec<ResourceDto>,
    /// Condition name → condition expression (`Equals`, `Not`, `And`, `Or`, `Condition`)
    #[serde(default)]
    pub conditions: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputDto>,
    /// Placeholder name → recipe expression, used via `{ Placeholder: name }`
    #[serde(default)]
    pub placeholders: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDto {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_policy: Option<String>,
    /// Resources sharing a key are created once; later ids alias the first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singleton: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

// ── Output ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputDto {
    Detailed {
        value: Value,
        #[serde(default)]
        export_name: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    Bare(Value),
}

impl OutputDto {
    pub fn value(&self) -> &Value {
        match self {
            OutputDto::Detailed { value, .. } | OutputDto::Bare(value) => value,
        }
    }
}
