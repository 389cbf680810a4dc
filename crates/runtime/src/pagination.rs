//! Pagination engine
//!
//! Reads the response token after each page and derives the next request
//! from the previous one. A `Link` header token is a complete URL and always
//! replaces the request URL; other tokens are written where the request
//! token says.

use crate::request::{encode_body, media_type_essence, HttpArmouryParameters, HttpRequest};
use crate::response::{HttpElement, Response, MEDIA_TYPE_JSON, MEDIA_TYPE_TEXT_XML, MEDIA_TYPE_XML};
use crate::xml::{parse_xml, to_xml};
use http::header::CONTENT_TYPE;
use regex::Regex;
use serde_json::{Map, Value};
use stackql_provider_common::{ProviderError, Result, TokenLocation, TokenSemantic};
use stackql_provider_parser::{MethodContext, Schema};
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

const LINK_HEADER: &str = "link";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Idle,
    Fetching,
    HasNext,
    Done,
}

fn link_next() -> &'static Regex {
    static LINK_NEXT: OnceLock<Regex> = OnceLock::new();
    LINK_NEXT.get_or_init(|| {
        Regex::new(r#"<(?P<next>[^>]+)>\s*;\s*rel="?next"?"#).expect("static regex is valid")
    })
}

/// A token read from a response
#[derive(Debug, Clone, PartialEq, Eq)]
enum NextToken {
    /// Next page URL from a `Link`-style header
    Url(String),
    Value(String),
}

impl NextToken {
    fn as_str(&self) -> &str {
        match self {
            NextToken::Url(s) | NextToken::Value(s) => s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Paginator {
    request_token: Option<TokenSemantic>,
    response_token: Option<TokenSemantic>,
    state: PaginationState,
    last_token: Option<NextToken>,
    /// Bound request body that body tokens are merged into
    request_body: Option<Value>,
    request_media_type: Option<String>,
    request_schema: Option<Schema>,
}

impl Paginator {
    pub fn new(request_token: Option<TokenSemantic>, response_token: Option<TokenSemantic>) -> Self {
        Self {
            request_token,
            response_token,
            state: PaginationState::Idle,
            last_token: None,
            request_body: None,
            request_media_type: None,
            request_schema: None,
        }
    }

    /// Token semantics configured nearest to the method, with the method's
    /// request media type and schema
    pub fn from_context(ctx: &MethodContext<'_>) -> Self {
        let mut paginator = Self::new(ctx.request_token().cloned(), ctx.response_token().cloned());
        paginator.request_media_type = ctx.method.request_media_type().map(str::to_string);
        paginator.request_schema = ctx.method.request_schema().cloned();
        paginator
    }

    /// Paginator for one prepared request, merging body tokens into the
    /// body bound from its row
    pub fn for_request(ctx: &MethodContext<'_>, prepared: &HttpArmouryParameters) -> Self {
        Self::from_context(ctx).with_request_body(prepared.parameters.body_json())
    }

    pub fn with_request_body(mut self, body: Option<Value>) -> Self {
        self.request_body = body;
        self
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    /// Token read by the last [`Paginator::observe`], empty when none
    pub fn last_token(&self) -> &str {
        self.last_token.as_ref().map(NextToken::as_str).unwrap_or("")
    }

    fn header_token(&self, response: &Response, semantic: &TokenSemantic) -> Option<NextToken> {
        let headers = response.http_response.headers();
        let scan_links = |name: &str| {
            headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .find_map(|v| link_next().captures(v).map(|c| c["next"].to_string()))
                .map(NextToken::Url)
        };
        if semantic.is_link_header() {
            scan_links(LINK_HEADER)
        } else {
            scan_links(&semantic.key)
        }
    }

    fn read_token(&self, response: &Response) -> Result<Option<NextToken>> {
        let Some(semantic) = self.response_token.as_ref() else {
            return Ok(None);
        };
        match semantic.location() {
            TokenLocation::Header => Ok(self.header_token(response, semantic)),
            TokenLocation::Body => Ok(response
                .extract_element(&HttpElement::body(&semantic.key))?
                .map(NextToken::Value)),
            other => Err(ProviderError::UnsupportedTokenLocation(format!(
                "response token '{}' in {}",
                semantic.key, other
            ))),
        }
    }

    /// Read the next-page token from `response`. Continues only when the
    /// token is non-empty and the page produced rows.
    pub fn observe(&mut self, response: &Response) -> Result<PaginationState> {
        self.state = PaginationState::Fetching;
        let token = match self.read_token(response) {
            Ok(token) => token.filter(|t| !t.as_str().is_empty()),
            Err(e) => {
                self.state = PaginationState::Done;
                self.last_token = None;
                return Err(e);
            }
        };
        let has_rows = !response.rows().is_empty();
        self.state = if token.is_some() && has_rows {
            PaginationState::HasNext
        } else {
            PaginationState::Done
        };
        debug!(
            token = token.as_ref().map(NextToken::as_str).unwrap_or(""),
            rows = has_rows,
            state = ?self.state,
            "observed page"
        );
        self.last_token = token;
        Ok(self.state)
    }

    /// Derive the next request from `previous` and the last observed token.
    /// The derived request keeps the previous request's extensions.
    pub fn next_request(&self, previous: &HttpRequest) -> Result<HttpRequest> {
        let token = self
            .last_token
            .as_ref()
            .ok_or_else(|| ProviderError::Transform("no next page token".to_string()))?;
        let mut request = previous.clone();
        if let NextToken::Url(url) = token {
            request.url = parse_next_url(previous, url)?;
            return Ok(request);
        }

        let location = self
            .request_token
            .as_ref()
            .map(TokenSemantic::location)
            .unwrap_or(TokenLocation::RequestString);
        let key = self.request_token.as_ref().map(|t| t.key.as_str()).unwrap_or("");
        match location {
            TokenLocation::Query => request.set_query_param(key, token.as_str()),
            TokenLocation::RequestString => request.url = parse_next_url(previous, token.as_str())?,
            TokenLocation::Body => request.set_body(self.merge_body_token(previous, key, token.as_str())?),
            other => {
                return Err(ProviderError::UnsupportedTokenLocation(format!(
                    "request token '{}' in {}",
                    key, other
                )))
            }
        }
        Ok(request)
    }

    /// Insert the token into the request body map and re-encode it with the
    /// request media type. Without a bound body the previous body is decoded.
    fn merge_body_token(&self, previous: &HttpRequest, key: &str, token: &str) -> Result<Vec<u8>> {
        let media_type = self
            .request_media_type
            .clone()
            .or_else(|| {
                previous
                    .headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| MEDIA_TYPE_JSON.to_string());
        let essence = media_type_essence(&media_type);

        // root element of a decoded XML body, kept for re-encoding
        let mut xml_root = None;
        let mut body = match (&self.request_body, previous.body.as_deref()) {
            (Some(bound), _) => bound.clone(),
            (None, Some(bytes)) if !bytes.is_empty() => match essence.as_str() {
                MEDIA_TYPE_JSON => serde_json::from_slice(bytes)?,
                MEDIA_TYPE_XML | MEDIA_TYPE_TEXT_XML => {
                    let node = parse_xml(bytes)?;
                    xml_root = Some(node.name.clone());
                    node.to_json()
                }
                _ => return Err(ProviderError::UnsupportedMediaType(media_type)),
            },
            _ => Value::Object(Map::new()),
        };
        if matches!(&body, Value::String(text) if text.is_empty()) {
            body = Value::Object(Map::new());
        }
        let Value::Object(members) = &mut body else {
            return Err(ProviderError::Transform(format!(
                "cannot set token '{}' on a non-object request body",
                key
            )));
        };
        members.insert(key.to_string(), Value::String(token.to_string()));

        match xml_root {
            Some(root) => to_xml(&root, &body, self.request_schema.as_ref()),
            None => encode_body(&media_type, &body, self.request_schema.as_ref()),
        }
    }

    /// Fetch every page starting at `first`, concatenating rows in page
    /// order. An unsupported token location ends the loop after the current
    /// page; a token seen twice ends it as well.
    pub fn run<F>(&mut self, first: HttpRequest, mut fetch: F) -> Result<Vec<Value>>
    where
        F: FnMut(&HttpRequest) -> Result<Response>,
    {
        let mut rows = Vec::new();
        let mut request = first;
        let mut seen: Vec<String> = Vec::new();
        loop {
            self.state = PaginationState::Fetching;
            let response = fetch(&request)?;
            rows.extend(response.rows());
            match self.observe(&response) {
                Ok(PaginationState::HasNext) => {}
                Ok(_) => break,
                Err(e) if !e.is_fatal() => {
                    warn!(error = %e, "pagination stopped");
                    break;
                }
                Err(e) => return Err(e),
            }
            let token = self.last_token().to_string();
            if seen.contains(&token) {
                warn!(token = %token, "pagination token repeated, stopping");
                self.state = PaginationState::Done;
                break;
            }
            seen.push(token);
            request = match self.next_request(&request) {
                Ok(next) => next,
                Err(e) if !e.is_fatal() => {
                    warn!(error = %e, "pagination stopped");
                    self.state = PaginationState::Done;
                    break;
                }
                Err(e) => return Err(e),
            };
        }
        Ok(rows)
    }
}

/// Absolute URLs replace the request URL; relative ones resolve against it
fn parse_next_url(previous: &HttpRequest, next: &str) -> Result<Url> {
    previous
        .url
        .join(next)
        .map_err(|e| ProviderError::Parameter(format!("invalid next page url '{}': {}", next, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::project_response;
    use http::header::{CONTENT_TYPE, LINK};
    use http::Method;
    use serde_json::json;

    fn page(body: Value, links: &[&str]) -> Response {
        let mut builder = http::Response::builder()
            .status(200)
            .header(CONTENT_TYPE, "application/json");
        for link in links {
            builder = builder.header(LINK, *link);
        }
        project_response(builder.body(serde_json::to_vec(&body).unwrap()).unwrap(), None).unwrap()
    }

    fn get(url: &str) -> HttpRequest {
        HttpRequest::new(Method::GET, Url::parse(url).unwrap())
    }

    fn link_paginator() -> Paginator {
        Paginator::new(
            Some(TokenSemantic::new("after", "query")),
            Some(TokenSemantic::new("Link", "header")),
        )
    }

    #[test]
    fn test_link_header_next_url() {
        let mut paginator = link_paginator();
        assert_eq!(paginator.state(), PaginationState::Idle);
        let response = page(
            json!([{"id": 1}]),
            &[
                r#"<https://x/api/v1/apps?limit=1>; rel="self""#,
                r#"<https://x/api/v1/apps?after=abc>; rel="next""#,
            ],
        );
        assert_eq!(paginator.observe(&response).unwrap(), PaginationState::HasNext);
        assert_eq!(paginator.last_token(), "https://x/api/v1/apps?after=abc");

        let next = paginator.next_request(&get("https://x/api/v1/apps?limit=1")).unwrap();
        assert_eq!(next.url.as_str(), "https://x/api/v1/apps?after=abc");
    }

    #[test]
    fn test_missing_link_is_done() {
        let mut paginator = link_paginator();
        let response = page(json!([{"id": 1}]), &[r#"<https://x/a>; rel="self""#]);
        assert_eq!(paginator.observe(&response).unwrap(), PaginationState::Done);
        assert_eq!(paginator.last_token(), "");
    }

    #[test]
    fn test_empty_page_is_done_even_with_token() {
        let mut paginator = link_paginator();
        let response = page(json!([]), &[r#"<https://x/a?after=z>; rel="next""#]);
        assert_eq!(paginator.observe(&response).unwrap(), PaginationState::Done);
    }

    #[test]
    fn test_observe_is_idempotent() {
        let mut paginator = Paginator::new(
            Some(TokenSemantic::new("pageToken", "query")),
            Some(TokenSemantic::new("$.nextPageToken", "body")),
        );
        let response = page(json!({"items": [{"id": 1}], "nextPageToken": "t2"}), &[]);
        let first = paginator.observe(&response).unwrap();
        let token = paginator.last_token().to_string();
        assert_eq!(paginator.observe(&response).unwrap(), first);
        assert_eq!(paginator.last_token(), token);
    }

    #[test]
    fn test_body_token_into_query() {
        let mut paginator = Paginator::new(
            Some(TokenSemantic::new("pageToken", "query")),
            Some(TokenSemantic::new("$.nextPageToken", "body")),
        );
        paginator
            .observe(&page(json!({"items": [{"id": 1}], "nextPageToken": "t2"}), &[]))
            .unwrap();
        let next = paginator
            .next_request(&get("https://compute/v1/projects/p/addresses?pageToken=t1&maxResults=5"))
            .unwrap();
        assert_eq!(next.url.query(), Some("maxResults=5&pageToken=t2"));
    }

    #[test]
    fn test_token_into_json_body() {
        let mut paginator = Paginator::new(
            Some(TokenSemantic::new("NextToken", "body")),
            Some(TokenSemantic::new("$.NextToken", "body")),
        );
        paginator
            .observe(&page(json!({"ResourceDescriptions": [{"a": 1}], "NextToken": "n2"}), &[]))
            .unwrap();
        let mut previous = get("https://cloudcontrolapi/");
        previous.method = Method::POST;
        previous.set_body(br#"{"TypeName":"AWS::S3::Bucket"}"#.to_vec());

        let next = paginator.next_request(&previous).unwrap();
        let body: Value = serde_json::from_slice(next.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"TypeName": "AWS::S3::Bucket", "NextToken": "n2"}));
        assert_eq!(
            next.headers[http::header::CONTENT_LENGTH],
            next.body.as_ref().unwrap().len().to_string().as_str()
        );
    }

    #[test]
    fn test_named_header_token_uses_link_pattern() {
        let mut paginator = Paginator::new(
            Some(TokenSemantic::new("cursor", "query")),
            Some(TokenSemantic::new("X-Next", "header")),
        );
        let response = {
            let http_response = http::Response::builder()
                .status(200)
                .header(CONTENT_TYPE, "application/json")
                .header("X-Next", r#"<https://api.example.com/x?cursor=abc>; rel="next""#)
                .body(br#"[{"id": 1}]"#.to_vec())
                .unwrap();
            project_response(http_response, None).unwrap()
        };
        assert_eq!(paginator.observe(&response).unwrap(), PaginationState::HasNext);
        assert_eq!(paginator.last_token(), "https://api.example.com/x?cursor=abc");

        let plain = {
            let http_response = http::Response::builder()
                .status(200)
                .header(CONTENT_TYPE, "application/json")
                .header("X-Next", "abc")
                .body(br#"[{"id": 1}]"#.to_vec())
                .unwrap();
            project_response(http_response, None).unwrap()
        };
        assert_eq!(paginator.observe(&plain).unwrap(), PaginationState::Done);
        assert_eq!(paginator.last_token(), "");
    }

    #[test]
    fn test_token_into_xml_body() {
        let mut paginator = Paginator::new(
            Some(TokenSemantic::new("NextToken", "body")),
            Some(TokenSemantic::new("$.NextToken", "body")),
        );
        paginator
            .observe(&page(json!({"items": [{"id": 1}], "NextToken": "n2"}), &[]))
            .unwrap();
        let mut previous = get("https://api.example.com/");
        previous.method = Method::POST;
        previous
            .headers
            .insert(CONTENT_TYPE, http::HeaderValue::from_static("application/xml"));
        previous.set_body(b"<Req><Name>a</Name></Req>".to_vec());

        let next = paginator.next_request(&previous).unwrap();
        let root = parse_xml(next.body.as_deref().unwrap()).unwrap();
        assert_eq!(root.name, "Req");
        assert_eq!(root.to_json(), json!({"Name": "a", "NextToken": "n2"}));
        assert_eq!(next.headers[CONTENT_TYPE], "application/xml");
    }

    #[test]
    fn test_token_merged_into_bound_xml_body() {
        let mut paginator = Paginator::new(
            Some(TokenSemantic::new("Marker", "body")),
            Some(TokenSemantic::new("$.NextMarker", "body")),
        )
        .with_request_body(Some(json!({"Name": "a"})));
        paginator.request_media_type = Some("text/xml".to_string());
        paginator
            .observe(&page(json!({"items": [{"id": 1}], "NextMarker": "m2"}), &[]))
            .unwrap();
        let mut previous = get("https://api.example.com/");
        previous.method = Method::POST;
        previous.set_body(b"<root><Name>a</Name></root>".to_vec());

        let next = paginator.next_request(&previous).unwrap();
        let root = parse_xml(next.body.as_deref().unwrap()).unwrap();
        assert_eq!(root.to_json(), json!({"Name": "a", "Marker": "m2"}));
    }

    #[test]
    fn test_body_token_rejects_unknown_media_type() {
        let mut paginator = Paginator::new(
            Some(TokenSemantic::new("NextToken", "body")),
            Some(TokenSemantic::new("$.NextToken", "body")),
        );
        paginator
            .observe(&page(json!({"items": [{"id": 1}], "NextToken": "n2"}), &[]))
            .unwrap();
        let mut previous = get("https://api.example.com/");
        previous.method = Method::POST;
        previous
            .headers
            .insert(CONTENT_TYPE, http::HeaderValue::from_static("application/x-protobuf"));
        previous.set_body(vec![1, 2, 3]);

        assert!(matches!(
            paginator.next_request(&previous),
            Err(ProviderError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_derived_request_keeps_extensions() {
        #[derive(Debug, Clone, PartialEq)]
        struct Caller(u8);

        let mut paginator = link_paginator();
        paginator
            .observe(&page(json!([{"id": 1}]), &[r#"<https://x/b>; rel="next""#]))
            .unwrap();
        let mut previous = get("https://x/a");
        previous.extensions.insert(Caller(7));
        let next = paginator.next_request(&previous).unwrap();
        assert_eq!(next.extensions.get::<Caller>(), Some(&Caller(7)));
    }

    #[test]
    fn test_query_response_token_is_not_fatal() {
        let mut paginator = Paginator::new(None, Some(TokenSemantic::new("cursor", "query")));
        let err = paginator.observe(&page(json!([{"id": 1}]), &[])).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(paginator.state(), PaginationState::Done);

        let rows = paginator
            .run(get("https://x/a"), |_| Ok(page(json!([{"id": 1}]), &[])))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(paginator.state(), PaginationState::Done);
    }

    #[test]
    fn test_run_concatenates_pages() {
        let mut paginator = link_paginator();
        let mut calls = Vec::new();
        let rows = paginator
            .run(get("https://x/apps"), |request| {
                calls.push(request.url.to_string());
                Ok(match calls.len() {
                    1 => page(json!([{"id": 1}]), &[r#"<https://x/apps?after=1>; rel="next""#]),
                    2 => page(json!([{"id": 2}]), &[r#"<https://x/apps?after=2>; rel="next""#]),
                    _ => page(json!([{"id": 3}]), &[]),
                })
            })
            .unwrap();
        assert_eq!(rows, vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
        assert_eq!(
            calls,
            vec!["https://x/apps", "https://x/apps?after=1", "https://x/apps?after=2"]
        );
    }

    #[test]
    fn test_run_stops_on_repeated_token() {
        let mut paginator = link_paginator();
        let mut calls = 0;
        let rows = paginator
            .run(get("https://x/apps"), |_| {
                calls += 1;
                Ok(page(json!([{"id": calls}]), &[r#"<https://x/apps?after=same>; rel="next""#]))
            })
            .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(paginator.state(), PaginationState::Done);
    }
}
