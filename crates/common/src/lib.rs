//! Common types and utilities for stackql-provider
//!
//! This crate contains the error taxonomy, parameter values and locations,
//! and the capability-typed configuration objects shared by the parser,
//! runtime and CLI components.

mod config;
mod graphql;
mod value;

pub use config::{
    AuthDto, Config, Pagination, SqlExternalColumn, SqlExternalTable, TokenLocation,
    TokenSemantic, Transform, Variations, View,
};
pub use graphql::{GraphQl, GraphQlElement};
pub use value::{ParamMap, ParamValue, SqlFunction, SqlFunctionKind};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Prefix given to request body properties when they are addressed as columns
pub const REQUEST_BODY_KEY_PREFIX: &str = "data";

/// Delimiter between [`REQUEST_BODY_KEY_PREFIX`] and the property name
pub const REQUEST_BODY_KEY_DELIMITER: &str = "__";

/// Column name used when a response is a bare scalar
pub const ANONYMOUS_COLUMN_NAME: &str = "_";

/// Errors raised while loading documents or preparing and shaping requests
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Document error: {0}")]
    Document(String),

    #[error("Parameter error: {0}")]
    Parameter(String),

    #[error("Missing required parameter '{name}' in {location}")]
    MissingRequired { name: String, location: ParamLocation },

    #[error("Missing server variable '{0}'")]
    MissingServerVariable(String),

    #[error("Unsupported media type '{0}'")]
    UnsupportedMediaType(String),

    #[error("Unsupported response media type '{0}'")]
    UnsupportedResponseMediaType(String),

    #[error("Unsupported token location '{0}'")]
    UnsupportedTokenLocation(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Stable classification of [`ProviderError`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Document,
    Parameter,
    MissingServerVariable,
    UnsupportedMediaType,
    UnsupportedResponseMediaType,
    UnsupportedTokenLocation,
    Transform,
    Io,
}

impl ProviderError {
    /// Shorthand for a missing required parameter
    pub fn missing(name: impl Into<String>, location: ParamLocation) -> Self {
        ProviderError::MissingRequired {
            name: name.into(),
            location,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Document(_) | ProviderError::Yaml(_) => ErrorKind::Document,
            ProviderError::Json(_) => ErrorKind::Document,
            ProviderError::Parameter(_) | ProviderError::MissingRequired { .. } => {
                ErrorKind::Parameter
            }
            ProviderError::MissingServerVariable(_) => ErrorKind::MissingServerVariable,
            ProviderError::UnsupportedMediaType(_) => ErrorKind::UnsupportedMediaType,
            ProviderError::UnsupportedResponseMediaType(_) => {
                ErrorKind::UnsupportedResponseMediaType
            }
            ProviderError::UnsupportedTokenLocation(_) => ErrorKind::UnsupportedTokenLocation,
            ProviderError::Transform(_) => ErrorKind::Transform,
            ProviderError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error must abort the operation it was raised in.
    ///
    /// An unsupported pagination token location only ends the page loop.
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::UnsupportedTokenLocation
    }
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Wire location of an addressable parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    Server,
    RequestBody,
}

impl ParamLocation {
    /// Parse the OpenAPI `in` field
    pub fn from_openapi(location: &str) -> Option<Self> {
        match location.to_ascii_lowercase().as_str() {
            "path" => Some(ParamLocation::Path),
            "query" => Some(ParamLocation::Query),
            "header" => Some(ParamLocation::Header),
            "cookie" => Some(ParamLocation::Cookie),
            "server" => Some(ParamLocation::Server),
            _ => None,
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
            ParamLocation::Server => "server",
            ParamLocation::RequestBody => "requestBody",
        };
        f.write_str(s)
    }
}

/// SQL verb a method is exposed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlVerb {
    Select,
    Insert,
    Delete,
    Update,
    Exec,
}

impl SqlVerb {
    /// Bucket order used when listing methods
    pub const ORDERED: [SqlVerb; 5] = [
        SqlVerb::Select,
        SqlVerb::Insert,
        SqlVerb::Delete,
        SqlVerb::Update,
        SqlVerb::Exec,
    ];

    /// Parse a verb case-insensitively; anything unrecognised is `exec`
    pub fn parse(verb: &str) -> Self {
        match verb.trim().to_ascii_lowercase().as_str() {
            "select" => SqlVerb::Select,
            "insert" => SqlVerb::Insert,
            "delete" => SqlVerb::Delete,
            "update" => SqlVerb::Update,
            _ => SqlVerb::Exec,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SqlVerb::Select => "select",
            SqlVerb::Insert => "insert",
            SqlVerb::Delete => "delete",
            SqlVerb::Update => "update",
            SqlVerb::Exec => "exec",
        }
    }

    /// Method keys consulted when a resource declares no methods for this verb
    pub fn default_method_keys(&self) -> &'static [&'static str] {
        match self {
            SqlVerb::Select => &["select", "list", "aggregatedList", "get"],
            SqlVerb::Insert => &["insert", "create"],
            SqlVerb::Delete => &["delete"],
            SqlVerb::Update | SqlVerb::Exec => &[],
        }
    }
}

impl fmt::Display for SqlVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the external column name of a request body property (`data__<name>`)
pub fn request_body_key(property: &str) -> String {
    format!(
        "{}{}{}",
        REQUEST_BODY_KEY_PREFIX, REQUEST_BODY_KEY_DELIMITER, property
    )
}

/// Strip the request body prefix, if present
pub fn strip_request_body_key(key: &str) -> Option<&str> {
    key.strip_prefix(REQUEST_BODY_KEY_PREFIX)
        .and_then(|rest| rest.strip_prefix(REQUEST_BODY_KEY_DELIMITER))
}
