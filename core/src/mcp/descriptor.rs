//! Tool descriptors discovered from the tool server

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declaration of one callable remote tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name the model must use in a tool call
    pub name: String,

    /// Human readable description reported by the server
    #[serde(default)]
    pub description: String,

    /// Parameter name to JSON schema fragment
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,

    /// Parameters the server marks as required
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolDescriptor {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Add a parameter with its schema fragment
    pub fn with_parameter<S: Into<String>>(mut self, name: S, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required && !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.parameters.insert(name, schema);
        self
    }

    /// Build a descriptor from one entry of an MCP `tools/list` result.
    ///
    /// Returns `None` when the entry has no usable name.
    pub fn from_mcp(entry: &Value) -> Option<Self> {
        let name = entry.get("name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }

        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let schema = entry.get("inputSchema");
        let parameters = schema
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();
        let required = schema
            .and_then(|s| s.get("required"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            name: name.to_string(),
            description,
            parameters,
            required,
        })
    }

    pub fn is_required(&self, parameter: &str) -> bool {
        self.required.iter().any(|r| r == parameter)
    }

    /// Compact call signature, e.g. `list_tables(database: string, like?: string)`
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|(name, schema)| {
                let optional = if self.is_required(name) { "" } else { "?" };
                format!("{}{}: {}", name, optional, schema_type(schema))
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.name, params)
    }
}

fn schema_type(schema: &Value) -> String {
    match schema.get("type") {
        Some(Value::String(t)) => t.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        _ => {
            // anyOf/oneOf unions, typical for Optional[...] parameters
            let variants = schema
                .get("anyOf")
                .or_else(|| schema.get("oneOf"))
                .and_then(Value::as_array);
            match variants {
                Some(variants) => {
                    let types: Vec<String> = variants.iter().map(schema_type).collect();
                    types.join(" | ")
                }
                None => "any".to_string(),
            }
        }
    }
}

/// Immutable set of tools available for a session, ordered by name
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// Build a catalog; later duplicates of a name are dropped
    pub fn new(mut tools: Vec<ToolDescriptor>) -> Self {
        let mut seen = std::collections::HashSet::new();
        tools.retain(|tool| {
            let fresh = seen.insert(tool.name.clone());
            if !fresh {
                tracing::warn!("Ignoring duplicate tool descriptor '{}'", tool.name);
            }
            fresh
        });
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools
            .binary_search_by(|tool| tool.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.tools[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
