//! Request construction
//!
//! One [`HttpArmouryParameters`] per input row: bind the row, resolve the
//! server, render the path, append the query, serialise the body and apply
//! the configured request translator.

use crate::binder::{bind, HttpParameters};
use crate::response::{MEDIA_TYPE_JSON, MEDIA_TYPE_TEXT_XML, MEDIA_TYPE_XML};
use crate::server::{resolve_server_url, ParameterizedUrl};
use crate::translate::request_translator;
use crate::transpose::query_transposer;
use crate::xml::to_xml;
use http::header::{HeaderName, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, HeaderValue, Method};
use stackql_provider_common::{ParamMap, ProviderError, Result};
use stackql_provider_parser::{MethodContext, Schema};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// An outgoing request. `extensions` carries caller context and is cloned
/// into every request derived from this one.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub extensions: http::Extensions,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            extensions: http::Extensions::new(),
        }
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Set `key` to `value`, replacing any existing occurrences
    pub fn set_query_param(&mut self, key: &str, value: &str) {
        let mut pairs: Vec<(String, String)> =
            self.query_pairs().into_iter().filter(|(k, _)| k != key).collect();
        pairs.push((key.to_string(), value.to_string()));
        self.url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    /// Replace the body and keep `Content-Length` in step
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.body = Some(body);
    }

    /// Convert into an `http::Request`, keeping headers and extensions
    pub fn into_http(self) -> Result<http::Request<Vec<u8>>> {
        let mut builder = http::Request::builder()
            .method(self.method)
            .uri(self.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers);
        }
        let mut request = builder
            .body(self.body.unwrap_or_default())
            .map_err(|e| ProviderError::Parameter(format!("invalid request: {}", e)))?;
        *request.extensions_mut() = self.extensions;
        Ok(request)
    }
}

/// A caller-prepared body that takes the place of the bound request body
#[derive(Debug, Clone, Default)]
pub struct ExecPayload {
    pub media_type: String,
    pub body: Vec<u8>,
    pub headers: HeaderMap,
}

/// Per-invocation context supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    pub payload: Option<ExecPayload>,
    /// Copied into every request built for this invocation
    pub extensions: http::Extensions,
}

/// One prepared request and the parameters it was built from
#[derive(Debug, Clone)]
pub struct HttpArmouryParameters {
    pub parameters: HttpParameters,
    pub request: HttpRequest,
    /// Path variables recovered from the rendered path
    pub path_params: BTreeMap<String, String>,
}

/// Prepared requests for one method invocation
#[derive(Debug, Clone)]
pub struct HttpArmoury {
    pub request_schema: Option<Schema>,
    pub response_schema: Option<Schema>,
    pub requests: Vec<HttpArmouryParameters>,
}

fn header_error(name: &str, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Parameter(format!("invalid header '{}': {}", name, e))
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| header_error(name, e))?;
    let value = HeaderValue::from_str(value).map_err(|e| header_error(name, e))?;
    headers.insert(header, value);
    Ok(())
}

/// Media type without parameters, lowercased
pub(crate) fn media_type_essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or(media_type)
        .trim()
        .to_ascii_lowercase()
}

/// Serialise the bound body for the request media type
pub(crate) fn encode_body(
    media_type: &str,
    body: &serde_json::Value,
    schema: Option<&Schema>,
) -> Result<Vec<u8>> {
    match media_type_essence(media_type).as_str() {
        MEDIA_TYPE_JSON => Ok(serde_json::to_vec(body)?),
        MEDIA_TYPE_XML | MEDIA_TYPE_TEXT_XML => {
            let root = schema.map(Schema::xml_root_name).unwrap_or("root");
            to_xml(root, body, schema)
        }
        _ => Err(ProviderError::UnsupportedMediaType(media_type.to_string())),
    }
}

fn build_request(
    ctx: &MethodContext<'_>,
    row: &ParamMap,
    exec: Option<&ExecContext>,
) -> Result<HttpArmouryParameters> {
    let method = ctx.method;
    let parameters = bind(ctx, row)?;

    let server = resolve_server_url(method.servers(), &parameters.server_values())?;
    let route = ParameterizedUrl::parse(&method.path)?;
    let path = route.render_path(&parameters.path_values())?;
    let path_params = route.matches(&path)?.unwrap_or_default();

    let mut url = Url::parse(&format!("{}{}", server, path))
        .map_err(|e| ProviderError::Parameter(format!("invalid url '{}{}': {}", server, path, e)))?;
    let transposer = query_transposer(ctx.query_transpose_algorithm());
    let pairs = parameters.query_pairs(transposer.as_ref())?;
    if !pairs.is_empty() {
        // appends with '&' when the path already carries a query
        url.query_pairs_mut().extend_pairs(pairs);
    }

    let http_method = Method::from_bytes(method.api_method.as_bytes()).map_err(|e| {
        ProviderError::Document(format!("invalid HTTP verb '{}': {}", method.api_method, e))
    })?;
    let mut request = HttpRequest::new(http_method, url);

    for (name, value) in parameters.header_values() {
        insert_header(&mut request.headers, &name, &value)?;
    }
    if let Some(cookie) = parameters.cookie_header() {
        insert_header(&mut request.headers, COOKIE.as_str(), &cookie)?;
    }
    if !ctx.is_aws() {
        if let Some(accept) = method.response_media_type().filter(|m| !m.is_empty()) {
            insert_header(&mut request.headers, ACCEPT.as_str(), accept)?;
        }
    }

    match exec.and_then(|e| e.payload.as_ref()) {
        Some(payload) => {
            request.headers.extend(payload.headers.clone());
            if !payload.media_type.is_empty() {
                insert_header(&mut request.headers, CONTENT_TYPE.as_str(), &payload.media_type)?;
            }
            request.set_body(payload.body.clone());
        }
        None => {
            if let Some(body) = parameters.body_json() {
                let media_type = method.request_media_type().unwrap_or(MEDIA_TYPE_JSON);
                let bytes = encode_body(media_type, &body, method.request_schema())?;
                insert_header(&mut request.headers, CONTENT_TYPE.as_str(), media_type)?;
                request.set_body(bytes);
            }
        }
    }
    if let Some(exec) = exec {
        request.extensions = exec.extensions.clone();
    }

    let request = request_translator(ctx.request_translate_algorithm()).translate(request)?;
    debug!(
        method = %request.method,
        url = %request.url,
        body = request.body.as_ref().map(Vec::len).unwrap_or(0),
        "built request"
    );

    Ok(HttpArmouryParameters {
        parameters,
        request,
        path_params,
    })
}

/// Build one request per row. No rows builds a single request with no
/// parameters.
pub fn build_http_armoury(
    ctx: &MethodContext<'_>,
    rows: &[ParamMap],
    exec: Option<&ExecContext>,
) -> Result<HttpArmoury> {
    let empty = [ParamMap::new()];
    let rows = if rows.is_empty() { &empty[..] } else { rows };
    let requests = rows
        .iter()
        .map(|row| build_request(ctx, row, exec))
        .collect::<Result<Vec<_>>>()?;
    Ok(HttpArmoury {
        request_schema: ctx.method.request_schema().cloned(),
        response_schema: ctx.method.response_schema().cloned(),
        requests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_query_param_replaces() {
        let mut request = HttpRequest::new(
            Method::GET,
            Url::parse("https://example.com/x?after=1&limit=5").unwrap(),
        );
        request.set_query_param("after", "2");
        assert_eq!(request.url.query(), Some("limit=5&after=2"));
    }

    #[test]
    fn test_encode_body_media_types() {
        let body = json!({"name": "n"});
        assert_eq!(
            encode_body("application/json; charset=utf-8", &body, None).unwrap(),
            br#"{"name":"n"}"#.to_vec()
        );
        let xml = encode_body("text/xml", &body, None).unwrap();
        assert!(String::from_utf8(xml).unwrap().contains("<root><name>n</name></root>"));
        assert!(matches!(
            encode_body("application/x-protobuf", &body, None),
            Err(ProviderError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_into_http_keeps_extensions() {
        #[derive(Debug, Clone, PartialEq)]
        struct Caller(&'static str);

        let mut request =
            HttpRequest::new(Method::GET, Url::parse("https://example.com/x").unwrap());
        request.extensions.insert(Caller("ctx"));
        request.headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_TYPE_JSON));

        let http = request.into_http().unwrap();
        assert_eq!(http.uri(), "https://example.com/x");
        assert_eq!(http.headers()[ACCEPT], MEDIA_TYPE_JSON);
        assert_eq!(http.extensions().get::<Caller>(), Some(&Caller("ctx")));
    }
}
