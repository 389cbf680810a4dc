//! OpenAPI 3.0 type definitions
//!
//! A narrow adapter over the parts of OpenAPI the operation model consumes.
//! Vendor extensions (`x-*`) are kept on the objects that carry them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Vendor extensions captured from an OpenAPI object
pub type Extensions = BTreeMap<String, Value>;

/// OpenAPI document root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenApiDoc {
    /// OpenAPI version (e.g., "3.0.0")
    #[serde(default)]
    pub openapi: String,

    /// API metadata
    #[serde(default)]
    pub info: Info,

    /// API paths (endpoints)
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,

    /// Reusable components
    #[serde(default)]
    pub components: Components,

    /// Servers
    #[serde(default)]
    pub servers: Vec<Server>,

    /// Extensions (x-stackql-provider, etc.)
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// API information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Info {
    /// API title
    #[serde(default)]
    pub title: String,

    /// API version
    #[serde(default)]
    pub version: String,

    /// API description
    #[serde(default)]
    pub description: Option<String>,

    /// Extensions (x-serviceName)
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// Server information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    /// Server URL template
    pub url: String,

    /// Server description
    #[serde(default)]
    pub description: Option<String>,

    /// Template variables
    #[serde(default)]
    pub variables: BTreeMap<String, ServerVariable>,
}

/// Server URL template variable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerVariable {
    #[serde(default)]
    pub default: Option<String>,

    #[serde(rename = "enum", default)]
    pub enum_values: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// Path item (operations for a path)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(default)]
    pub get: Option<Operation>,

    #[serde(default)]
    pub put: Option<Operation>,

    #[serde(default)]
    pub post: Option<Operation>,

    #[serde(default)]
    pub delete: Option<Operation>,

    #[serde(default)]
    pub options: Option<Operation>,

    #[serde(default)]
    pub head: Option<Operation>,

    #[serde(default)]
    pub patch: Option<Operation>,

    #[serde(default)]
    pub trace: Option<Operation>,

    /// Parameters shared by every operation on the path
    #[serde(default)]
    pub parameters: Vec<RefOr<Parameter>>,

    /// Servers overriding the document servers for this path
    #[serde(default)]
    pub servers: Vec<Server>,
}

impl PathItem {
    /// Look up an operation by HTTP verb, case-insensitively
    pub fn operation(&self, verb: &str) -> Option<&Operation> {
        match verb.to_ascii_lowercase().as_str() {
            "get" => self.get.as_ref(),
            "put" => self.put.as_ref(),
            "post" => self.post.as_ref(),
            "delete" => self.delete.as_ref(),
            "options" => self.options.as_ref(),
            "head" => self.head.as_ref(),
            "patch" => self.patch.as_ref(),
            "trace" => self.trace.as_ref(),
            _ => None,
        }
    }
}

/// HTTP operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "operationId", default)]
    pub operation_id: Option<String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub parameters: Vec<RefOr<Parameter>>,

    #[serde(rename = "requestBody", default)]
    pub request_body: Option<RefOr<RequestBody>>,

    #[serde(default)]
    pub responses: BTreeMap<String, RefOr<Response>>,

    #[serde(default)]
    pub servers: Vec<Server>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// Either an inline object or a `$ref` to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefOr<T> {
    /// Reference to a component
    Reference {
        #[serde(rename = "$ref")]
        ref_path: String,
    },

    /// Inline definition
    Item(T),
}

/// Parameter definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    /// Location: query, header, path, cookie
    #[serde(rename = "in")]
    pub location: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(rename = "allowEmptyValue", default)]
    pub allow_empty_value: bool,

    #[serde(default)]
    pub schema: Option<SchemaOrRef>,
}

/// Request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,

    #[serde(default)]
    pub required: bool,
}

/// Response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub content: BTreeMap<String, MediaType>,
}

/// Media type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    #[serde(default)]
    pub schema: Option<SchemaOrRef>,
}

/// Schema or reference
pub type SchemaOrRef = RefOr<Box<Schema>>;

/// `additionalProperties` is either a flag or a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Flag(bool),
    Schema(Box<SchemaOrRef>),
}

/// XML naming hints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Xml {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub attribute: bool,

    #[serde(default)]
    pub wrapped: bool,
}

/// Schema definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Type: string, number, integer, boolean, array, object
    #[serde(rename = "type", default)]
    pub schema_type: Option<String>,

    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, SchemaOrRef>,

    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub items: Option<Box<SchemaOrRef>>,

    #[serde(rename = "additionalProperties", default)]
    pub additional_properties: Option<AdditionalProperties>,

    #[serde(rename = "allOf", default)]
    pub all_of: Vec<SchemaOrRef>,

    #[serde(rename = "enum", default)]
    pub enum_values: Vec<Value>,

    #[serde(default)]
    pub default: Option<Value>,

    #[serde(rename = "readOnly", default)]
    pub read_only: bool,

    #[serde(default)]
    pub xml: Option<Xml>,

    /// Extensions (x-alwaysRequired, x-stringOnly, etc.)
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// Reusable components
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub schemas: BTreeMap<String, Schema>,

    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,

    #[serde(rename = "requestBodies", default)]
    pub request_bodies: BTreeMap<String, RequestBody>,

    #[serde(default)]
    pub responses: BTreeMap<String, Response>,

    /// Extensions (x-stackQL-resources, x-stackQL-config)
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// Last segment of a JSON pointer reference, unescaped
pub fn ref_last_segment(ref_path: &str) -> &str {
    ref_path.rsplit('/').next().unwrap_or(ref_path)
}

impl Components {
    /// Get a schema by reference path
    /// e.g., "#/components/schemas/Pod" -> returns Pod schema
    pub fn resolve_schema_ref(&self, ref_path: &str) -> Option<&Schema> {
        let name = ref_path.strip_prefix("#/components/schemas/")?;
        self.schemas.get(name)
    }

    pub fn resolve_parameter_ref(&self, ref_path: &str) -> Option<&Parameter> {
        let name = ref_path.strip_prefix("#/components/parameters/")?;
        self.parameters.get(name)
    }

    pub fn resolve_request_body_ref(&self, ref_path: &str) -> Option<&RequestBody> {
        let name = ref_path.strip_prefix("#/components/requestBodies/")?;
        self.request_bodies.get(name)
    }

    pub fn resolve_response_ref(&self, ref_path: &str) -> Option<&Response> {
        let name = ref_path.strip_prefix("#/components/responses/")?;
        self.responses.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_or_prefers_reference() {
        let parsed: SchemaOrRef =
            serde_json::from_str(r##"{"$ref": "#/components/schemas/Pod"}"##).unwrap();
        assert_eq!(
            parsed,
            RefOr::Reference {
                ref_path: "#/components/schemas/Pod".to_string()
            }
        );

        let parsed: SchemaOrRef = serde_json::from_str(r#"{"type": "string"}"#).unwrap();
        match parsed {
            RefOr::Item(schema) => assert_eq!(schema.schema_type.as_deref(), Some("string")),
            other => panic!("expected inline schema, got {:?}", other),
        }
    }

    #[test]
    fn test_path_item_operation_lookup_is_case_insensitive() {
        let item: PathItem =
            serde_json::from_str(r#"{"get": {"operationId": "listPods"}}"#).unwrap();
        assert!(item.operation("GET").is_some());
        assert!(item.operation("post").is_none());
    }

    #[test]
    fn test_ref_last_segment() {
        assert_eq!(ref_last_segment("#/components/schemas/Pod"), "Pod");
        assert_eq!(ref_last_segment("Pod"), "Pod");
    }
}
