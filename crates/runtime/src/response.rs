//! Response classification and row projection

use crate::json_path;
use crate::xml::{parse_xml, XmlNode};
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use stackql_provider_common::{ProviderError, Result, ANONYMOUS_COLUMN_NAME};
use stackql_provider_parser::ExpectedResponse;
use tracing::debug;

pub const MEDIA_TYPE_HTML: &str = "text/html";
pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_SCIM_JSON: &str = "application/scim+json";
pub const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";
pub const MEDIA_TYPE_TEXT_PLAIN: &str = "text/plain";
pub const MEDIA_TYPE_XML: &str = "application/xml";
pub const MEDIA_TYPE_TEXT_XML: &str = "text/xml";

/// Where an element of a response is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpElementLocation {
    Header,
    Body,
    Query,
    Path,
}

/// A named element of a response, e.g. a pagination token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpElement {
    /// Header name, JSON path or XML path
    pub name: String,
    pub location: HttpElementLocation,
}

impl HttpElement {
    pub fn header(name: &str) -> Self {
        Self {
            name: name.to_string(),
            location: HttpElementLocation::Header,
        }
    }

    pub fn body(path: &str) -> Self {
        Self {
            name: path.to_string(),
            location: HttpElementLocation::Body,
        }
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Xml(XmlNode),
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug)]
pub struct Response {
    /// Body decoded by media type
    pub raw: ResponseBody,
    /// Body narrowed to its rows by the response's object key
    pub processed: Value,
    pub http_response: http::Response<Vec<u8>>,
    pub body_media_type: String,
}

fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or(media_type)
        .trim()
        .to_ascii_lowercase()
}

fn anonymous(value: Value) -> Value {
    let mut row = Map::new();
    row.insert(ANONYMOUS_COLUMN_NAME.to_string(), value);
    Value::Object(row)
}

fn decode(media_type: &str, body: &[u8]) -> Result<ResponseBody> {
    match media_type {
        MEDIA_TYPE_JSON | MEDIA_TYPE_SCIM_JSON => {
            if body.iter().all(u8::is_ascii_whitespace) {
                Ok(ResponseBody::Json(Value::Null))
            } else {
                Ok(ResponseBody::Json(serde_json::from_slice(body)?))
            }
        }
        MEDIA_TYPE_XML | MEDIA_TYPE_TEXT_XML => Ok(ResponseBody::Xml(parse_xml(body)?)),
        MEDIA_TYPE_HTML | MEDIA_TYPE_TEXT_PLAIN => {
            Ok(ResponseBody::Text(String::from_utf8_lossy(body).into_owned()))
        }
        MEDIA_TYPE_OCTET_STREAM => Ok(ResponseBody::Bytes(body.to_vec())),
        other => Err(ProviderError::UnsupportedResponseMediaType(other.to_string())),
    }
}

/// Narrow a JSON body to its rows: the object key when declared, the
/// anonymous column for scalar roots, the `items` member when the schema
/// has one, else the whole body
fn project_json(body: &Value, expected: Option<&ExpectedResponse>) -> Result<Value> {
    let schema = expected.and_then(|e| e.schema.as_ref());
    if let Some(key) = expected.and_then(|e| e.object_key.as_deref()) {
        let selected = json_path::select(body, key)?;
        return Ok(match selected.as_slice() {
            [] => Value::Null,
            [single] => (*single).clone(),
            many => Value::Array(many.iter().map(|v| (*v).clone()).collect()),
        });
    }
    if schema.is_some_and(|s| s.is_scalar_root()) {
        return Ok(anonymous(body.clone()));
    }
    if let Some(item_key) = schema.and_then(|s| s.select_item_key()) {
        if let Some(items) = body.get(item_key) {
            return Ok(items.clone());
        }
    }
    Ok(body.clone())
}

fn project_xml(root: &XmlNode, expected: Option<&ExpectedResponse>) -> Value {
    match expected.and_then(|e| e.object_key.as_deref()) {
        Some(path) => Value::Array(root.select(path).into_iter().map(XmlNode::to_json).collect()),
        None => root.to_json(),
    }
}

/// Classify and project a response.
///
/// The media type comes from `Content-Type`, else the declared response
/// media type, else JSON.
pub fn project_response(
    http_response: http::Response<Vec<u8>>,
    expected: Option<&ExpectedResponse>,
) -> Result<Response> {
    let declared = http_response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| expected.map(|e| e.media_type.clone()))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| MEDIA_TYPE_JSON.to_string());
    let media_type = essence(&declared);

    let raw = decode(&media_type, http_response.body())?;
    let processed = match &raw {
        ResponseBody::Json(body) => project_json(body, expected)?,
        ResponseBody::Xml(root) => project_xml(root, expected),
        ResponseBody::Text(text) => anonymous(Value::String(text.clone())),
        ResponseBody::Bytes(bytes) => {
            anonymous(Value::String(String::from_utf8_lossy(bytes).into_owned()))
        }
    };
    debug!(
        status = http_response.status().as_u16(),
        media_type = %media_type,
        "projected response"
    );

    Ok(Response {
        raw,
        processed,
        http_response,
        body_media_type: media_type,
    })
}

impl Response {
    /// Projected rows: arrays yield their elements, objects one row,
    /// scalars one anonymous-column row, `null` nothing
    pub fn rows(&self) -> Vec<Value> {
        match &self.processed {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Object(_) => item.clone(),
                    scalar => anonymous(scalar.clone()),
                })
                .collect(),
            Value::Object(_) => vec![self.processed.clone()],
            scalar => vec![anonymous(scalar.clone())],
        }
    }

    pub fn status(&self) -> http::StatusCode {
        self.http_response.status()
    }

    /// Read a named element: a header value, or the text at a body path.
    /// Absent elements are `None`.
    pub fn extract_element(&self, element: &HttpElement) -> Result<Option<String>> {
        match element.location {
            HttpElementLocation::Header => Ok(self
                .http_response
                .headers()
                .get(element.name.as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)),
            HttpElementLocation::Body => match &self.raw {
                ResponseBody::Json(body) => {
                    let text = json_path::scalar_text(json_path::select_one(body, &element.name)?);
                    Ok(Some(text).filter(|t| !t.is_empty()))
                }
                ResponseBody::Xml(root) => Ok(root
                    .select(&element.name)
                    .first()
                    .map(|node| node.text.clone())
                    .filter(|t| !t.is_empty())),
                ResponseBody::Text(_) | ResponseBody::Bytes(_) => Ok(None),
            },
            HttpElementLocation::Query | HttpElementLocation::Path => {
                Err(ProviderError::UnsupportedTokenLocation(format!(
                    "cannot read '{}' from the response {}",
                    element.name,
                    if element.location == HttpElementLocation::Query {
                        "query"
                    } else {
                        "path"
                    }
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackql_provider_parser::openapi::{self, Components};
    use stackql_provider_parser::Schema;
    use std::sync::Arc;

    fn http(content_type: &str, body: &str) -> http::Response<Vec<u8>> {
        http::Response::builder()
            .status(200)
            .header(CONTENT_TYPE, content_type)
            .body(body.as_bytes().to_vec())
            .unwrap()
    }

    fn expected(object_key: Option<&str>, schema: Option<Schema>) -> ExpectedResponse {
        ExpectedResponse {
            media_type: MEDIA_TYPE_JSON.to_string(),
            open_api_doc_key: "200".to_string(),
            object_key: object_key.map(str::to_string),
            schema,
        }
    }

    fn schema(raw: serde_json::Value) -> Schema {
        let raw: openapi::Schema = serde_json::from_value(raw).unwrap();
        Schema::new("Body", raw, Arc::new(Components::default()))
    }

    #[test]
    fn test_object_key_projection() {
        let response = project_response(
            http("application/json; charset=utf-8", r#"{"items": [{"id": 1}, {"id": 2}], "nextPageToken": "t"}"#),
            Some(&expected(Some("$.items"), None)),
        )
        .unwrap();
        assert_eq!(response.body_media_type, "application/json");
        assert_eq!(response.rows(), vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn test_scalar_root_goes_to_anonymous_column() {
        let response = project_response(
            http("application/json", r#""hello""#),
            Some(&expected(None, Some(schema(json!({"type": "string"}))))),
        )
        .unwrap();
        assert_eq!(response.rows(), vec![json!({"_": "hello"})]);
    }

    #[test]
    fn test_items_property_selected() {
        let response = project_response(
            http("application/json", r#"{"items": [{"id": 1}], "kind": "list"}"#),
            Some(&expected(
                None,
                Some(schema(json!({"type": "object", "properties": {"items": {"type": "array"}}}))),
            )),
        )
        .unwrap();
        assert_eq!(response.rows(), vec![json!({"id": 1})]);
    }

    #[test]
    fn test_root_when_nothing_narrows() {
        let response =
            project_response(http("application/scim+json", r#"{"id": "u1"}"#), None).unwrap();
        assert_eq!(response.rows(), vec![json!({"id": "u1"})]);
    }

    #[test]
    fn test_xml_projection() {
        let body = r#"<R><set><item><id>a</id></item><item><id>b</id></item></set><token>n</token></R>"#;
        let response = project_response(
            http("text/xml", body),
            Some(&expected(Some("/R/set/item"), None)),
        )
        .unwrap();
        assert_eq!(response.rows(), vec![json!({"id": "a"}), json!({"id": "b"})]);
        assert_eq!(
            response.extract_element(&HttpElement::body("/R/token")).unwrap(),
            Some("n".to_string())
        );
    }

    #[test]
    fn test_text_body() {
        let response = project_response(http("text/plain", "ok"), None).unwrap();
        assert_eq!(response.rows(), vec![json!({"_": "ok"})]);
    }

    #[test]
    fn test_unsupported_media_type() {
        let err = project_response(http("application/x-protobuf", ""), None).unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedResponseMediaType(_)));
    }

    #[test]
    fn test_empty_json_body_has_no_rows() {
        let response = project_response(http("application/json", ""), None).unwrap();
        assert!(response.rows().is_empty());
    }

    #[test]
    fn test_extract_element_locations() {
        let mut raw = http("application/json", r#"{"meta": {"next": "abc"}}"#);
        raw.headers_mut()
            .insert("x-next", http::HeaderValue::from_static("h"));
        let response = project_response(raw, None).unwrap();

        assert_eq!(
            response.extract_element(&HttpElement::header("X-Next")).unwrap(),
            Some("h".to_string())
        );
        assert_eq!(
            response.extract_element(&HttpElement::body("$.meta.next")).unwrap(),
            Some("abc".to_string())
        );
        assert_eq!(
            response.extract_element(&HttpElement::body("$.meta.none")).unwrap(),
            None
        );
        let query = HttpElement {
            name: "cursor".to_string(),
            location: HttpElementLocation::Query,
        };
        assert!(matches!(
            response.extract_element(&query),
            Err(ProviderError::UnsupportedTokenLocation(_))
        ));
    }
}
