//! Tool specifications and their parameter schemas.
//!
//! Parameter schemas are kept in a small structural form (ordered field name
//! → type, description, required) and translated to the provider-facing
//! JSON-Schema object by one deterministic function, rather than
//! introspecting any validation library's internals.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Field kinds
// ---------------------------------------------------------------------------

/// Primitive type of one schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// Array of strings (labels, attendee emails, and the like).
    StringArray,
}

impl FieldKind {
    /// JSON-Schema `type` value for this kind.
    fn json_type(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::StringArray => "array",
        }
    }
}

/// One named, typed parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Description written for the LLM: what the value means and where to
    /// get it.
    pub description: String,
    pub required: bool,
}

// ---------------------------------------------------------------------------
// InputSchema
// ---------------------------------------------------------------------------

/// Ordered parameter schema for one tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    /// Create an empty schema (for tools that take no parameters).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to append a required field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        });
        self
    }

    /// Builder method to append an optional field.
    pub fn optional_field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        });
        self
    }

    /// The declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Translate to the JSON-Schema object form LLM providers expect.
    ///
    /// Optional fields appear under `properties` but are excluded from the
    /// `required` list. String arrays carry an `items` clause.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required: Vec<Value> = Vec::new();

        for field in &self.fields {
            let mut prop = serde_json::Map::new();
            prop.insert("type".to_string(), json!(field.kind.json_type()));
            prop.insert("description".to_string(), json!(field.description));
            if field.kind == FieldKind::StringArray {
                prop.insert("items".to_string(), json!({ "type": "string" }));
            }
            properties.insert(field.name.clone(), Value::Object(prop));
            if field.required {
                required.push(json!(field.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

// ---------------------------------------------------------------------------
// ToolSpec
// ---------------------------------------------------------------------------

/// One callable capability a plugin exposes.
///
/// `name` follows the `<service>_<verb>` convention and must be unique
/// across the registry (enforced structurally at registration). The
/// description is consumed by the LLM to decide applicability, so it states
/// *when* to use the tool, not only what it does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: InputSchema,
}

impl ToolSpec {
    /// Create a tool specification.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }

    /// Render the provider-facing tool declaration:
    /// `{name, description, input_schema}`.
    pub fn to_provider_schema(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.schema.to_json_schema(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_schema() -> InputSchema {
        InputSchema::new()
            .field("title", FieldKind::String, "Issue title")
            .optional_field("body", FieldKind::String, "Issue body in Markdown")
            .optional_field("labels", FieldKind::StringArray, "Labels to apply")
    }

    #[test]
    fn test_required_list_excludes_optional_fields() {
        let schema = issue_schema().to_json_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["title"]);
        assert!(schema["properties"]["body"].is_object());
        assert!(schema["properties"]["labels"].is_object());
    }

    #[test]
    fn test_string_array_carries_items_clause() {
        let schema = issue_schema().to_json_schema();
        assert_eq!(schema["properties"]["labels"]["type"], "array");
        assert_eq!(schema["properties"]["labels"]["items"]["type"], "string");
    }

    #[test]
    fn test_empty_schema_is_valid_object() {
        let schema = InputSchema::new().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["required"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_provider_schema_shape() {
        let spec = ToolSpec::new("github_create_issue", "Create a GitHub issue.", issue_schema());
        let rendered = spec.to_provider_schema();
        assert_eq!(rendered["name"], "github_create_issue");
        assert_eq!(rendered["input_schema"]["type"], "object");
    }
}
