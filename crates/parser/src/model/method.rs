//! A single operation bound to one SQL verb

use super::parameter::Parameter;
use super::schema::Schema;
use crate::openapi::Server;
use crate::suffix_map::SuffixMap;
use stackql_provider_common::{Config, GraphQl, ParamMap, Result, SqlVerb};
use std::collections::BTreeMap;
use tracing::debug;

/// Declared request wire shape
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedRequest {
    pub media_type: String,
    pub schema: Option<Schema>,
    /// Body property names required beyond the schema's own list
    pub required: Vec<String>,
}

/// Declared response wire shape
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedResponse {
    pub media_type: String,
    /// Response status key in the OpenAPI document (e.g. "200")
    pub open_api_doc_key: String,
    /// Path to the rows inside the response body
    pub object_key: Option<String>,
    pub schema: Option<Schema>,
}

/// An operation store: one OpenAPI operation exposed under a SQL verb
#[derive(Debug, Clone)]
pub struct Method {
    pub key: String,
    pub sql_verb: SqlVerb,
    /// Upper-case HTTP verb
    pub api_method: String,
    /// Parameterized path, e.g. `/projects/{project}/zones`
    pub path: String,
    pub operation_id: Option<String>,
    pub(crate) parameters: Vec<Parameter>,
    pub request: Option<ExpectedRequest>,
    pub response: Option<ExpectedResponse>,
    /// Method-level server override
    pub servers: Vec<Server>,
    pub operation_servers: Vec<Server>,
    pub path_servers: Vec<Server>,
    /// Servers of the document the method was loaded from
    pub service_servers: Vec<Server>,
    pub graphql: Option<GraphQl>,
    pub config: Option<Config>,
}

impl Method {
    /// Non-body parameters (path item and operation level, operation wins)
    pub fn parameters(&self) -> Vec<Parameter> {
        self.parameters.clone()
    }

    pub fn non_body_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn request_schema(&self) -> Option<&Schema> {
        self.request.as_ref().and_then(|r| r.schema.as_ref())
    }

    pub fn response_schema(&self) -> Option<&Schema> {
        self.response.as_ref().and_then(|r| r.schema.as_ref())
    }

    pub fn request_media_type(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.media_type.as_str())
    }

    pub fn response_media_type(&self) -> Option<&str> {
        self.response.as_ref().map(|r| r.media_type.as_str())
    }

    /// Request body properties as `data__<name>` parameters
    pub fn body_parameters(&self) -> Vec<Parameter> {
        let Some(request) = self.request.as_ref() else {
            return Vec::new();
        };
        let Some(schema) = request.schema.as_ref() else {
            return Vec::new();
        };
        let required = schema.required_properties();
        schema
            .properties()
            .into_iter()
            .map(|(name, prop)| {
                let is_required = required.contains(&name) || request.required.contains(&name);
                Parameter::body_property(&name, prop, is_required)
            })
            .collect()
    }

    /// Body parameter by external (`data__`) name
    pub fn body_parameter(&self, name: &str) -> Option<Parameter> {
        self.body_parameters().into_iter().find(|p| p.name == name)
    }

    pub fn required_non_body_parameters(&self) -> Vec<Parameter> {
        self.parameters.iter().filter(|p| p.required).cloned().collect()
    }

    pub fn optional_non_body_parameters(&self) -> Vec<Parameter> {
        self.parameters.iter().filter(|p| !p.required).cloned().collect()
    }

    pub fn required_body_parameters(&self) -> Vec<Parameter> {
        self.body_parameters().into_iter().filter(|p| p.required).collect()
    }

    pub fn optional_body_parameters(&self) -> Vec<Parameter> {
        self.body_parameters().into_iter().filter(|p| !p.required).collect()
    }

    /// Required non-body parameters followed by required body properties
    pub fn required_parameters(&self) -> Vec<Parameter> {
        let mut out = self.required_non_body_parameters();
        out.extend(self.required_body_parameters());
        out
    }

    pub fn optional_parameters(&self) -> Vec<Parameter> {
        let mut out = self.optional_non_body_parameters();
        out.extend(self.optional_body_parameters());
        out
    }

    /// Required parameters keyed by name
    pub fn required_parameter_map(&self) -> BTreeMap<String, Parameter> {
        self.required_parameters()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect()
    }

    fn suffix_table(&self, params: Vec<Parameter>) -> Result<SuffixMap<Parameter>> {
        let mut table = SuffixMap::new();
        for param in params {
            table.insert(format!("{}.{}", self.key, param.name), param)?;
        }
        Ok(table)
    }

    /// Match user parameters against this method's required and optional
    /// sets.
    ///
    /// Returns the unmatched user parameters when every required parameter
    /// was supplied, `None` when something required is missing.
    pub fn parameter_match(&self, params: &ParamMap) -> Result<Option<ParamMap>> {
        let mut required = self.suffix_table(self.required_parameters())?;
        let mut optional = self.suffix_table(self.optional_parameters())?;
        let mut unmatched = ParamMap::new();

        for (key, value) in params {
            if required.take(key).is_some() || optional.take(key).is_some() {
                continue;
            }
            unmatched.insert(key.clone(), value.clone());
        }

        if required.is_empty() {
            Ok(Some(unmatched))
        } else {
            debug!(
                method = %self.key,
                missing = ?required.keys().collect::<Vec<_>>(),
                "method does not match supplied parameters"
            );
            Ok(None)
        }
    }

    /// Servers by precedence: method override, operation, path item, service
    pub fn servers(&self) -> &[Server] {
        [
            &self.servers,
            &self.operation_servers,
            &self.path_servers,
            &self.service_servers,
        ]
        .into_iter()
        .find(|list| !list.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
    }

    /// Whether `name` is a variable of the selected server template
    pub fn is_server_variable(&self, name: &str) -> bool {
        self.servers()
            .first()
            .map(|server| server.variables.contains_key(name))
            .unwrap_or(false)
    }
}
