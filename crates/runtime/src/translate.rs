//! Post-construction request rewrites selected by `requestTranslate`

use crate::request::HttpRequest;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method};
use stackql_provider_common::{ProviderError, Result};
use tracing::debug;

pub const GET_QUERY_TO_POST_FORM_UTF_8: &str = "get_query_to_post_form_utf_8";

const FORM_UTF_8: &str = "application/x-www-form-urlencoded; charset=utf-8";

pub trait RequestTranslator: Send + Sync {
    fn name(&self) -> &'static str;

    fn translate(&self, request: HttpRequest) -> Result<HttpRequest>;
}

/// Moves a GET's query string into a form-encoded POST body
#[derive(Debug, Clone, Copy, Default)]
pub struct GetQueryToPostFormUtf8;

/// Leaves the request untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NilTranslator;

impl RequestTranslator for GetQueryToPostFormUtf8 {
    fn name(&self) -> &'static str {
        GET_QUERY_TO_POST_FORM_UTF_8
    }

    fn translate(&self, mut request: HttpRequest) -> Result<HttpRequest> {
        if request.method != Method::GET {
            return Err(ProviderError::Transform(format!(
                "{} requires a GET request, got {}",
                GET_QUERY_TO_POST_FORM_UTF_8, request.method
            )));
        }
        if request.body.as_ref().is_some_and(|b| !b.is_empty()) {
            return Err(ProviderError::Transform(format!(
                "{} requires a request without a body",
                GET_QUERY_TO_POST_FORM_UTF_8
            )));
        }

        let form = request.url.query().unwrap_or_default().as_bytes().to_vec();
        request.url.set_query(None);
        request.method = Method::POST;
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(FORM_UTF_8));
        request.headers.insert(CONTENT_LENGTH, HeaderValue::from(form.len()));
        request.body = Some(form);
        Ok(request)
    }
}

impl RequestTranslator for NilTranslator {
    fn name(&self) -> &'static str {
        "nil"
    }

    fn translate(&self, request: HttpRequest) -> Result<HttpRequest> {
        Ok(request)
    }
}

/// Translator for a configured algorithm name; unknown names do nothing
pub fn request_translator(algorithm: Option<&str>) -> Box<dyn RequestTranslator> {
    match algorithm {
        Some(name) if name.eq_ignore_ascii_case(GET_QUERY_TO_POST_FORM_UTF_8) => {
            Box::new(GetQueryToPostFormUtf8)
        }
        Some(name) => {
            debug!(algorithm = %name, "unknown request translate algorithm, leaving request as built");
            Box::new(NilTranslator)
        }
        None => Box::new(NilTranslator),
    }
}
