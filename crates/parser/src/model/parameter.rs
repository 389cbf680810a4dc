//! Addressable parameters

use super::schema::Schema;
use serde_json::Value;
use stackql_provider_common::{request_body_key, strip_request_body_key, ParamLocation};

/// A named, located, schema-typed parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub schema: Option<Schema>,
    pub required: bool,
    pub allow_empty_value: bool,
    pub description: Option<String>,
}

impl Parameter {
    /// Synthesize a request body property, addressed as `data__<property>`
    pub fn body_property(property: &str, schema: Schema, required: bool) -> Self {
        Self {
            name: request_body_key(property),
            location: ParamLocation::RequestBody,
            description: schema.description().map(str::to_string),
            schema: Some(schema),
            required,
            allow_empty_value: false,
        }
    }

    pub fn is_body(&self) -> bool {
        self.location == ParamLocation::RequestBody
    }

    /// Name on the wire; body properties lose their `data__` prefix
    pub fn wire_name(&self) -> &str {
        if self.is_body() {
            strip_request_body_key(&self.name).unwrap_or(&self.name)
        } else {
            &self.name
        }
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.schema.as_ref().and_then(|s| s.default_value())
    }

    pub fn schema_type(&self) -> Option<&str> {
        self.schema.as_ref().and_then(|s| s.schema_type())
    }
}
