//! Document-embedded configuration
//!
//! Providers, provider services, services, resources and methods can each
//! carry a `config` object. Lookups walk from the most specific owner to the
//! least specific one, so every field here is optional.

use crate::{ProviderError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Configuration block shared by every level of the document hierarchy
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Credential binding description
    #[serde(default)]
    pub auth: Option<AuthDto>,
    /// How `JSON(...)` query values are flattened
    #[serde(default)]
    pub query_param_transpose: Option<Transform>,
    /// Request rewrite applied after construction
    #[serde(default)]
    pub request_translate: Option<Transform>,
    /// Pagination token semantics
    #[serde(default)]
    pub pagination: Option<Pagination>,
    /// Schema handling variations
    #[serde(default)]
    pub variations: Option<Variations>,
    /// Per-dialect view definitions, keyed by view name
    #[serde(default)]
    pub views: BTreeMap<String, View>,
    /// Declared external SQL tables, keyed by table name
    #[serde(default)]
    pub sql_external_tables: BTreeMap<String, SqlExternalTable>,
}

impl Config {
    /// Parse a standalone YAML (or JSON) configuration block
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ProviderError::Document(format!("Failed to parse config: {}", e)))
    }

    pub fn query_transpose_algorithm(&self) -> Option<&str> {
        self.query_param_transpose
            .as_ref()
            .map(|t| t.algorithm.as_str())
            .filter(|a| !a.is_empty())
    }

    pub fn request_translate_algorithm(&self) -> Option<&str> {
        self.request_translate
            .as_ref()
            .map(|t| t.algorithm.as_str())
            .filter(|a| !a.is_empty())
    }

    pub fn request_token(&self) -> Option<&TokenSemantic> {
        self.pagination.as_ref().and_then(|p| p.request_token.as_ref())
    }

    pub fn response_token(&self) -> Option<&TokenSemantic> {
        self.pagination.as_ref().and_then(|p| p.response_token.as_ref())
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    pub fn sql_external_table(&self, name: &str) -> Option<&SqlExternalTable> {
        self.sql_external_tables.get(name)
    }
}

/// Named transform algorithm (query transposition, request translation)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Transform {
    #[serde(default)]
    pub algorithm: String,
}

/// Request and response pagination tokens
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub request_token: Option<TokenSemantic>,
    #[serde(default)]
    pub response_token: Option<TokenSemantic>,
}

/// Where a pagination token is read from or written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLocation {
    Header,
    Body,
    Query,
    Path,
    /// The token is a complete URL that replaces the request URL
    RequestString,
    Other(String),
}

impl fmt::Display for TokenLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenLocation::Header => f.write_str("header"),
            TokenLocation::Body => f.write_str("body"),
            TokenLocation::Query => f.write_str("query"),
            TokenLocation::Path => f.write_str("path"),
            TokenLocation::RequestString => f.write_str("requestString"),
            TokenLocation::Other(s) => f.write_str(s),
        }
    }
}

/// How a pagination token is extracted from a response or injected into a request
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TokenSemantic {
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub args: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub location: String,
}

impl TokenSemantic {
    pub fn new(key: &str, location: &str) -> Self {
        Self {
            key: key.to_string(),
            location: location.to_string(),
            ..Default::default()
        }
    }

    pub fn location(&self) -> TokenLocation {
        match self.location.to_ascii_lowercase().as_str() {
            "header" => TokenLocation::Header,
            "body" => TokenLocation::Body,
            "query" => TokenLocation::Query,
            "path" => TokenLocation::Path,
            "requeststring" => TokenLocation::RequestString,
            _ => TokenLocation::Other(self.location.clone()),
        }
    }

    /// True for the `Link` header with no explicit algorithm
    pub fn is_link_header(&self) -> bool {
        self.location() == TokenLocation::Header
            && self.algorithm.is_empty()
            && self.key.eq_ignore_ascii_case("link")
    }
}

/// Schema handling variations
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variations {
    #[serde(default)]
    pub is_object_schema_implicitly_unioned: bool,
}

/// Credential binding description. Nothing here performs authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthDto {
    #[serde(rename = "type", default)]
    pub auth_type: String,
    #[serde(rename = "keyID", default)]
    pub key_id: Option<String>,
    #[serde(rename = "keyIDenvvar", default)]
    pub key_id_env_var: Option<String>,
    #[serde(rename = "credentialsfilepath", default)]
    pub credentials_file_path: Option<String>,
    #[serde(rename = "credentialsenvvar", default)]
    pub credentials_env_var: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(rename = "valuePrefix", default)]
    pub value_prefix: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "username_var", default)]
    pub username_env_var: Option<String>,
    #[serde(rename = "password_var", default)]
    pub password_env_var: Option<String>,
    #[serde(rename = "client_id_env_var", default)]
    pub client_id_env_var: Option<String>,
    #[serde(rename = "client_secret_env_var", default)]
    pub client_secret_env_var: Option<String>,
    #[serde(rename = "token_url", default)]
    pub token_url: Option<String>,
    #[serde(rename = "grant_type", default)]
    pub grant_type: Option<String>,
}

/// View DDL that applies to some SQL dialects, with an optional fallback
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct View {
    /// Empty, a bare dialect name, or `sqlDialect == "<name>"`
    #[serde(default, alias = "sqlBackend")]
    pub predicate: String,
    #[serde(default)]
    pub ddl: String,
    #[serde(default)]
    pub fallback: Option<Box<View>>,
}

fn dialect_predicate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*sqlDialect\s*==\s*"([^"]*)"\s*$"#).expect("static regex is valid")
    })
}

impl View {
    /// Whether this view's predicate selects `dialect`
    pub fn applies_to(&self, dialect: &str) -> bool {
        let predicate = self.predicate.trim();
        if predicate.is_empty() {
            return true;
        }
        match dialect_predicate_regex().captures(predicate) {
            Some(caps) => caps[1].eq_ignore_ascii_case(dialect),
            None => predicate.eq_ignore_ascii_case(dialect),
        }
    }

    /// DDL for `dialect`, walking the fallback chain
    pub fn ddl_for_sql_dialect(&self, dialect: &str) -> Option<&str> {
        if self.applies_to(dialect) {
            return Some(self.ddl.as_str());
        }
        self.fallback
            .as_deref()
            .and_then(|fallback| fallback.ddl_for_sql_dialect(dialect))
    }
}

/// Column of a declared external SQL table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SqlExternalColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: String,
    #[serde(default)]
    pub oid: i64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub precision: i64,
}

/// External SQL table declared by a provider; returned verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlExternalTable {
    #[serde(default)]
    pub catalog_name: String,
    #[serde(default)]
    pub schema_name: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<SqlExternalColumn>,
}
