//! Request construction and response handling for provider methods
//!
//! Given a method chosen by [`Resource::select_method`] and the rows of
//! parameters a query supplied, this crate:
//!
//! - binds each row's parameters to their wire locations ([`bind`])
//! - resolves the server URL and renders the path ([`resolve_server_url`],
//!   [`ParameterizedUrl`])
//! - builds the outgoing requests ([`build_http_armoury`]), applying the
//!   configured query transposer and request translator
//! - projects responses into rows ([`project_response`])
//! - follows pagination tokens ([`Paginator`])
//!
//! Performing the HTTP exchange is left to the caller.
//!
//! [`Resource::select_method`]: stackql_provider_parser::Resource::select_method
//!
//! ## Example
//!
//! ```no_run
//! use stackql_provider_common::{ParamMap, SqlVerb};
//! use stackql_provider_parser::{Loader, MethodContext};
//! use stackql_provider_runtime::build_http_armoury;
//!
//! let service = Loader::new().load_service_from_file("okta/v1/services/application.yaml")?;
//! let resource = service.resource("apps")?;
//! let (method, _) = resource.select_method(SqlVerb::Select, &ParamMap::new())?;
//! let ctx = MethodContext::new(&service, resource, method);
//! let armoury = build_http_armoury(&ctx, &[], None)?;
//! println!("{}", armoury.requests[0].request.url);
//! # Ok::<(), stackql_provider_common::ProviderError>(())
//! ```

mod binder;
pub mod json_path;
mod pagination;
mod request;
mod response;
mod server;
mod translate;
mod transpose;
pub mod xml;

pub use binder::{bind, row_schema, HttpParameters, ParameterBinding, REGION_KEY};
pub use pagination::{PaginationState, Paginator};
pub use request::{
    build_http_armoury, ExecContext, ExecPayload, HttpArmoury, HttpArmouryParameters, HttpRequest,
};
pub use response::{
    project_response, HttpElement, HttpElementLocation, Response, ResponseBody, MEDIA_TYPE_HTML,
    MEDIA_TYPE_JSON, MEDIA_TYPE_OCTET_STREAM, MEDIA_TYPE_SCIM_JSON, MEDIA_TYPE_TEXT_PLAIN,
    MEDIA_TYPE_TEXT_XML, MEDIA_TYPE_XML,
};
pub use server::{resolve_server_url, ParameterizedUrl};
pub use translate::{
    request_translator, GetQueryToPostFormUtf8, NilTranslator, RequestTranslator,
    GET_QUERY_TO_POST_FORM_UTF_8,
};
pub use transpose::{
    query_transposer, unflatten, AwsCanonical, AwsCloudControl, QueryTransposer, AWS_CANONICAL,
    AWS_CLOUD_CONTROL,
};
