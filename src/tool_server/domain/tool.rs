//! Tool descriptors and the catalog discovered from a running server.

use super::ToolServerDomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Metadata for one tool offered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
}

impl ToolDescriptor {
    /// Creates a descriptor. A missing description is stored as empty.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerDomainError::EmptyToolName`] when `name` is empty
    /// after trimming.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Result<Self, ToolServerDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolServerDomainError::EmptyToolName);
        }

        Ok(Self {
            name: normalized_name,
            description: description.into().trim().to_owned(),
            input_schema,
        })
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the JSON schema for the tool arguments.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Returns the names of required arguments declared by the schema.
    #[must_use]
    pub fn required_arguments(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// The set of tools a server advertised through `tools/list`.
///
/// The catalog is the runtime source of truth for tool names and argument
/// schemas; nothing in this crate hard-codes argument field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// Creates a catalog preserving server order.
    #[must_use]
    pub const fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    /// Returns every descriptor.
    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Returns the number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Finds a tool by exact name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// Returns whether a tool with `name` is offered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Returns a SHA-256 hex digest identifying this catalog version.
    ///
    /// Tools are hashed in name order so the fingerprint does not depend on
    /// the order the server listed them in.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut sorted: Vec<&ToolDescriptor> = self.tools.iter().collect();
        sorted.sort_by(|left, right| left.name.cmp(&right.name));

        let mut hasher = Sha256::new();
        for tool in sorted {
            hasher.update(tool.name.as_bytes());
            hasher.update([0]);
            hasher.update(tool.description.as_bytes());
            hasher.update([0]);
            hasher.update(tool.input_schema.to_string().as_bytes());
            hasher.update([0xff]);
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(
            name,
            format!("Tool {name}"),
            json!({"type": "object", "required": ["dqlStatement"]}),
        )
        .expect("valid descriptor")
    }

    #[test]
    fn blank_tool_name_is_rejected() {
        assert_eq!(
            ToolDescriptor::new("  ", "desc", json!({})),
            Err(ToolServerDomainError::EmptyToolName)
        );
    }

    #[test]
    fn required_arguments_come_from_schema() {
        assert_eq!(
            descriptor("execute_dql").required_arguments(),
            vec!["dqlStatement"]
        );
    }

    #[test]
    fn fingerprint_ignores_listing_order() {
        let forward = ToolCatalog::new(vec![descriptor("a"), descriptor("b")]);
        let reversed = ToolCatalog::new(vec![descriptor("b"), descriptor("a")]);

        assert_eq!(forward.fingerprint(), reversed.fingerprint());
        assert_eq!(forward.fingerprint().len(), 64);
    }

    #[test]
    fn fingerprint_changes_with_schema() {
        let original = ToolCatalog::new(vec![descriptor("a")]);
        let changed = ToolCatalog::new(vec![
            ToolDescriptor::new("a", "Tool a", json!({"type": "object"})).expect("valid"),
        ]);

        assert_ne!(original.fingerprint(), changed.fingerprint());
    }
}
