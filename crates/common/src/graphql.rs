//! GraphQL method description

use serde::{Deserialize, Serialize};

/// JSON path selecting part of a GraphQL response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlElement {
    #[serde(default)]
    pub json_path: String,
}

/// A method served by a GraphQL endpoint rather than a plain REST operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQl {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub http_verb: String,
    #[serde(default)]
    pub cursor: Option<GraphQlElement>,
    #[serde(default)]
    pub response_selection: Option<GraphQlElement>,
}

impl GraphQl {
    pub fn cursor_json_path(&self) -> Option<&str> {
        self.cursor
            .as_ref()
            .map(|c| c.json_path.as_str())
            .filter(|p| !p.is_empty())
    }

    pub fn response_json_path(&self) -> Option<&str> {
        self.response_selection
            .as_ref()
            .map(|r| r.json_path.as_str())
            .filter(|p| !p.is_empty())
    }
}
