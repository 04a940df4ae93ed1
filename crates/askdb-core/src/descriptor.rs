//! Capability descriptor types.
//!
//! A descriptor is the schema advertised to the language engine for one
//! capability: name, description, and a JSON Schema for its arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON Schema-compatible parameter definition for a capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Top-level JSON Schema type.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property definitions (when type is `object`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, Value>>,
    /// Required property names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ParameterSchema {
    /// An object schema with the given properties, all required.
    #[must_use]
    pub fn object(properties: &[(&str, &str, &str)]) -> Self {
        let mut props = serde_json::Map::new();
        let mut required = Vec::new();
        for (name, schema_type, description) in properties {
            let _ = props.insert(
                (*name).to_string(),
                serde_json::json!({"type": schema_type, "description": description}),
            );
            required.push((*name).to_string());
        }
        Self {
            schema_type: "object".to_string(),
            properties: Some(props),
            required: Some(required),
        }
    }

    /// An object schema with no parameters.
    #[must_use]
    pub fn empty_object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
        }
    }
}

/// A capability definition advertised to the language engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Capability name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the capability's arguments.
    pub parameters: ParameterSchema,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_schema_lists_all_properties_as_required() {
        let schema = ParameterSchema::object(&[
            ("query", "string", "the SQL query to run"),
            ("label", "string", "what the rows contain"),
        ]);
        assert_eq!(schema.schema_type, "object");
        let props = schema.properties.unwrap();
        assert_eq!(props["query"]["type"], "string");
        assert_eq!(
            schema.required.unwrap(),
            vec!["query".to_string(), "label".to_string()]
        );
    }

    #[test]
    fn empty_object_omits_properties() {
        let schema = ParameterSchema::empty_object();
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json, serde_json::json!({"type": "object"}));
    }
}
