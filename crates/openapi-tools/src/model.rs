//! Parameter, tool and specification model.

use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Map a JSON-schema `type` keyword. Unknown or missing types are treated as strings.
    #[must_use]
    pub fn from_schema_type(ty: Option<&str>) -> Self {
        match ty {
            Some("integer") => Self::Integer,
            Some("number") => Self::Number,
            Some("boolean") => Self::Boolean,
            Some("array") => Self::Array,
            Some("object") => Self::Object,
            _ => Self::String,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

impl ParamLocation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
        }
    }
}

/// Optional value constraints copied from the parameter schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Constraints {
    /// Read constraint keywords from a (resolved) JSON schema object.
    #[must_use]
    pub fn from_schema(schema: &Value) -> Self {
        Self {
            enum_values: schema
                .get("enum")
                .and_then(Value::as_array)
                .filter(|v| !v.is_empty())
                .cloned(),
            minimum: schema.get("minimum").and_then(Value::as_f64),
            maximum: schema.get("maximum").and_then(Value::as_f64),
            min_length: schema.get("minLength").and_then(Value::as_u64),
            max_length: schema.get("maxLength").and_then(Value::as_u64),
            pattern: schema
                .get("pattern")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub location: ParamLocation,
    pub required: bool,
    #[serde(skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Item schema for arrays, kept for the published input schema.
    #[serde(skip)]
    pub items: Option<Value>,
    /// Carries the entire JSON request body (non-object body schemas).
    #[serde(skip)]
    pub raw_body: bool,
}

impl ParameterDescriptor {
    /// Build a descriptor from a resolved JSON schema.
    #[must_use]
    pub fn from_schema(
        name: impl Into<String>,
        location: ParamLocation,
        required: bool,
        schema: &Value,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: ParamType::from_schema_type(schema.get("type").and_then(Value::as_str)),
            location,
            required,
            constraints: Constraints::from_schema(schema),
            description: schema
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            format: schema
                .get("format")
                .and_then(Value::as_str)
                .map(str::to_string),
            default: schema.get("default").cloned(),
            items: schema.get("items").cloned(),
            raw_body: false,
        }
    }

    /// JSON-schema fragment describing this parameter to callers.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.param_type.as_str()));
        if let Some(desc) = &self.description {
            schema.insert("description".to_string(), json!(desc));
        }
        if let Some(format) = &self.format {
            schema.insert("format".to_string(), json!(format));
        }
        if let Some(items) = &self.items {
            schema.insert("items".to_string(), items.clone());
        }
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.clone());
        }
        let c = &self.constraints;
        if let Some(values) = &c.enum_values {
            schema.insert("enum".to_string(), json!(values));
        }
        if let Some(v) = c.minimum {
            schema.insert("minimum".to_string(), json!(v));
        }
        if let Some(v) = c.maximum {
            schema.insert("maximum".to_string(), json!(v));
        }
        if let Some(v) = c.min_length {
            schema.insert("minLength".to_string(), json!(v));
        }
        if let Some(v) = c.max_length {
            schema.insert("maxLength".to_string(), json!(v));
        }
        if let Some(p) = &c.pattern {
            schema.insert("pattern".to_string(), json!(p));
        }
        schema.insert("x-location".to_string(), json!(self.location.as_str()));
        Value::Object(schema)
    }
}

/// One callable operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    pub path: String,
    pub description: String,
    pub spec_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Ordered: path-item parameters, operation parameters, then flattened body properties.
    pub parameters: Vec<ParameterDescriptor>,
}

fn serialize_method<S: serde::Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

impl ToolDescriptor {
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// Object schema listing every parameter, as published by `list_tools`.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required: Vec<String> = Vec::new();

        for param in &self.parameters {
            properties.insert(param.name.clone(), param.json_schema());
            if param.required {
                required.push(param.name.clone());
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecKind {
    OpenApi3,
    Swagger2,
}

/// A loaded OpenAPI/Swagger document.
#[derive(Debug, Clone)]
pub struct Specification {
    pub name: String,
    pub kind: SpecKind,
    pub title: Option<String>,
    pub version: Option<String>,
    pub base_url: String,
    pub file: PathBuf,
    pub document: Arc<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_from_schema_copies_constraints() {
        let schema = json!({
            "type": "number",
            "minimum": 0.01,
            "maximum": 10000,
            "description": "Amount to pay"
        });
        let p = ParameterDescriptor::from_schema("amount", ParamLocation::Body, true, &schema);
        assert_eq!(p.param_type, ParamType::Number);
        assert_eq!(p.constraints.minimum, Some(0.01));
        assert_eq!(p.constraints.maximum, Some(10000.0));
        assert_eq!(p.description.as_deref(), Some("Amount to pay"));
    }

    #[test]
    fn missing_type_defaults_to_string() {
        let p = ParameterDescriptor::from_schema("q", ParamLocation::Query, false, &json!({}));
        assert_eq!(p.param_type, ParamType::String);
        assert!(p.constraints.is_empty());
    }

    #[test]
    fn input_schema_lists_required_in_declaration_order() {
        let tool = ToolDescriptor {
            name: "pay_createPayment".to_string(),
            method: Method::POST,
            path: "/payments".to_string(),
            description: "Create".to_string(),
            spec_name: "pay".to_string(),
            operation_id: Some("createPayment".to_string()),
            tags: vec![],
            parameters: vec![
                ParameterDescriptor::from_schema(
                    "currency",
                    ParamLocation::Body,
                    true,
                    &json!({"type": "string", "enum": ["EUR", "USD"]}),
                ),
                ParameterDescriptor::from_schema(
                    "amount",
                    ParamLocation::Body,
                    true,
                    &json!({"type": "number"}),
                ),
                ParameterDescriptor::from_schema(
                    "memo",
                    ParamLocation::Body,
                    false,
                    &json!({"type": "string"}),
                ),
            ],
        };
        let schema = tool.input_schema();
        assert_eq!(schema["required"], json!(["currency", "amount"]));
        assert_eq!(schema["properties"]["currency"]["enum"], json!(["EUR", "USD"]));
        assert_eq!(schema["properties"]["memo"]["x-location"], json!("body"));
        assert_eq!(tool.required_parameters().count(), 2);
        assert!(tool.parameter("memo").is_some());
    }
}
