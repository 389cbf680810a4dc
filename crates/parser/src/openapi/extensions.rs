//! Document shapes for the `x-stackQL-*` extensions and the provider,
//! provider-service and resource-register documents that sit beside the
//! OpenAPI service documents.

use super::types::{SchemaOrRef, Server};
use serde::{Deserialize, Serialize};
use stackql_provider_common::{Config, GraphQl};
use std::collections::BTreeMap;

/// Extension on `components` holding the resource map
pub const RESOURCES_EXTENSION: &str = "x-stackQL-resources";

/// Extension on `components` holding the service-level config
pub const CONFIG_EXTENSION: &str = "x-stackQL-config";

/// Extension on the document root naming the provider
pub const PROVIDER_EXTENSION: &str = "x-stackql-provider";

/// Extension on `info` overriding the service name
pub const SERVICE_NAME_EXTENSION: &str = "x-serviceName";

/// Extension on a schema forcing its property to be required
pub const ALWAYS_REQUIRED_EXTENSION: &str = "x-alwaysRequired";

/// Extension on a schema disabling the string-as-JSON body heuristic
pub const STRING_ONLY_EXTENSION: &str = "x-stringOnly";

/// `{"$ref": ...}` pointer to another document or a location inside one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRef {
    #[serde(rename = "$ref")]
    pub ref_path: String,
}

impl DocRef {
    pub fn new(ref_path: &str) -> Self {
        Self {
            ref_path: ref_path.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ref_path.trim().is_empty()
    }
}

/// Provider document root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDoc {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub provider_services: BTreeMap<String, ProviderServiceDoc>,
    #[serde(default)]
    pub config: Option<Config>,
}

/// One API surface listed by a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderServiceDoc {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub preferred: bool,
    #[serde(default)]
    pub service: Option<DocRef>,
    #[serde(default)]
    pub resources: Option<DocRef>,
    #[serde(default)]
    pub config: Option<Config>,
}

/// Shallow resources document: the resource map and a pointer to the
/// OpenAPI document the methods resolve against
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRegisterDoc {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDoc>,
    #[serde(default)]
    pub service_doc: Option<DocRef>,
}

/// A named bundle of methods
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDoc {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub selector_algorithm: Option<String>,
    #[serde(default)]
    pub methods: BTreeMap<String, MethodDoc>,
    #[serde(default)]
    pub sql_verbs: BTreeMap<String, Vec<DocRef>>,
    #[serde(default)]
    pub service_doc: Option<DocRef>,
    #[serde(default)]
    pub config: Option<Config>,
}

/// A single method binding one OpenAPI operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodDoc {
    /// `#/paths/<escaped path>/<verb>`, or just the verb when `path` is set
    pub operation: DocRef,
    /// `#/paths/<escaped path>`
    #[serde(default)]
    pub path: Option<DocRef>,
    #[serde(default)]
    pub request: Option<ExpectedRequestDoc>,
    #[serde(default)]
    pub response: Option<ExpectedResponseDoc>,
    #[serde(default)]
    pub servers: Option<Vec<Server>>,
    #[serde(rename = "graphQL", default)]
    pub graphql: Option<GraphQl>,
    #[serde(default)]
    pub config: Option<Config>,
    #[serde(rename = "sqlVerb", default)]
    pub sql_verb: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedRequestDoc {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    /// Body property names required in addition to the schema's own list
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub schema_override: Option<SchemaOrRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedResponseDoc {
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(rename = "openAPIDocKey", default)]
    pub open_api_doc_key: Option<String>,
    #[serde(rename = "objectKey", default)]
    pub object_key: Option<String>,
    #[serde(default)]
    pub schema_override: Option<SchemaOrRef>,
}
