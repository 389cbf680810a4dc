//! Parameter binding
//!
//! Distributes a selected method's user parameters into per-location
//! buckets. A parameter name lands in at most one location bucket.

use crate::transpose::QueryTransposer;
use serde_json::{Map, Value};
use stackql_provider_common::{
    strip_request_body_key, ParamLocation, ParamMap, ParamValue, ProviderError, Result,
    SqlFunctionKind,
};
use stackql_provider_parser::{Method, MethodContext, Parameter, Schema};
use std::collections::BTreeMap;
use tracing::debug;

/// Key of the region server variable
pub const REGION_KEY: &str = "region";

/// A parameter with the value the caller supplied for it
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    pub param: Parameter,
    pub value: ParamValue,
}

impl ParameterBinding {
    pub fn new(param: Parameter, value: ParamValue) -> Self {
        Self { param, value }
    }
}

/// Bound parameters, one bucket per location
#[derive(Debug, Clone, Default)]
pub struct HttpParameters {
    pub path_params: BTreeMap<String, ParameterBinding>,
    pub query_params: BTreeMap<String, ParameterBinding>,
    pub header_params: BTreeMap<String, ParameterBinding>,
    pub cookie_params: BTreeMap<String, ParameterBinding>,
    pub server_params: BTreeMap<String, ParameterBinding>,
    /// Request body members by wire name (without `data__`)
    pub request_body: BTreeMap<String, Value>,
    /// User keys naming a column of the response rows rather than a
    /// parameter; kept for filtering the projected rows
    pub response_body: BTreeMap<String, Value>,
    /// User keys matching no parameter
    pub unassigned: BTreeMap<String, ParamValue>,
    pub region: Option<String>,
}

impl HttpParameters {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_mut(
        &mut self,
        location: ParamLocation,
    ) -> Option<&mut BTreeMap<String, ParameterBinding>> {
        match location {
            ParamLocation::Path => Some(&mut self.path_params),
            ParamLocation::Query => Some(&mut self.query_params),
            ParamLocation::Header => Some(&mut self.header_params),
            ParamLocation::Cookie => Some(&mut self.cookie_params),
            ParamLocation::Server => Some(&mut self.server_params),
            ParamLocation::RequestBody => None,
        }
    }

    /// Location bucket holding `name`, if any
    pub fn location_of(&self, name: &str) -> Option<ParamLocation> {
        [
            (ParamLocation::Path, &self.path_params),
            (ParamLocation::Query, &self.query_params),
            (ParamLocation::Header, &self.header_params),
            (ParamLocation::Cookie, &self.cookie_params),
            (ParamLocation::Server, &self.server_params),
        ]
        .into_iter()
        .find(|(_, bucket)| bucket.contains_key(name))
        .map(|(location, _)| location)
    }

    /// Store a binding in its location bucket. A name already bound in any
    /// location bucket is a parameter error.
    pub fn store(&mut self, binding: ParameterBinding) -> Result<()> {
        let name = binding.param.name.clone();
        let location = binding.param.location;
        if let Some(existing) = self.location_of(&name) {
            return Err(ProviderError::Parameter(format!(
                "parameter '{}' bound to both {} and {}",
                name, existing, location
            )));
        }
        if location == ParamLocation::RequestBody {
            let key = binding.param.wire_name().to_string();
            self.request_body.insert(key, binding.value.to_json());
            return Ok(());
        }
        if let Some(bucket) = self.bucket_mut(location) {
            bucket.insert(name, binding);
        }
        Ok(())
    }

    /// Number of user keys bound or set aside
    pub fn len(&self) -> usize {
        self.path_params.len()
            + self.query_params.len()
            + self.header_params.len()
            + self.cookie_params.len()
            + self.server_params.len()
            + self.request_body.len()
            + self.response_body.len()
            + self.unassigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path_values(&self) -> BTreeMap<String, String> {
        self.path_params
            .iter()
            .map(|(k, b)| (k.clone(), b.value.to_query_value()))
            .collect()
    }

    pub fn server_values(&self) -> BTreeMap<String, String> {
        self.server_params
            .iter()
            .map(|(k, b)| (k.clone(), b.value.to_query_value()))
            .collect()
    }

    pub fn header_values(&self) -> Vec<(String, String)> {
        self.header_params
            .iter()
            .map(|(k, b)| (k.clone(), b.value.to_query_value()))
            .collect()
    }

    /// Query pairs: lists repeat their key, `JSON(...)` values go through
    /// the transposer under the parameter name, `STRING(...)` values pass
    /// their literal through
    pub fn query_pairs(&self, transposer: &dyn QueryTransposer) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for (name, binding) in &self.query_params {
            match &binding.value {
                ParamValue::Function(f) if f.kind == SqlFunctionKind::Json => {
                    let value: Value = serde_json::from_str(&f.literal).map_err(|e| {
                        ProviderError::Parameter(format!(
                            "JSON value for '{}' is not valid JSON: {}",
                            name, e
                        ))
                    })?;
                    pairs.extend(transposer.transpose(&value, name)?);
                }
                ParamValue::List(items) => {
                    pairs.extend(items.iter().map(|v| (name.clone(), v.to_query_value())));
                }
                other => pairs.push((name.clone(), other.to_query_value())),
            }
        }
        Ok(pairs)
    }

    /// Cookies folded into a single `Cookie` header value
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookie_params.is_empty() {
            return None;
        }
        Some(
            self.cookie_params
                .iter()
                .map(|(k, b)| format!("{}={}", k, b.value.to_query_value()))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn body_json(&self) -> Option<Value> {
        if self.request_body.is_empty() {
            return None;
        }
        Some(Value::Object(
            self.request_body
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        ))
    }
}

/// User value for `name`, matched exactly or as a dotted suffix
fn lookup<'p>(params: &'p ParamMap, name: &str) -> Option<(&'p String, &'p ParamValue)> {
    params.get_key_value(name).or_else(|| {
        params.iter().find(|(key, _)| {
            key.strip_suffix(name)
                .map(|head| head.ends_with('.'))
                .unwrap_or(false)
        })
    })
}

/// Body values arriving as text are parsed as JSON when the property is
/// object or array shaped, unless the schema marks it `x-stringOnly`
fn body_value(param: &Parameter, value: &ParamValue) -> ParamValue {
    let ParamValue::String(text) = value else {
        return value.clone();
    };
    let Some(schema) = param.schema.as_ref() else {
        return value.clone();
    };
    if schema.is_string_only() || !schema.is_structured() {
        return value.clone();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(parsed @ (Value::Object(_) | Value::Array(_))) => ParamValue::from(parsed),
        _ => value.clone(),
    }
}

/// Schema of one response row: the object key target, stepped into array
/// items
pub fn row_schema(method: &Method) -> Option<Schema> {
    let response = method.response.as_ref()?;
    let schema = response.schema.as_ref()?;
    let target = match response.object_key.as_deref() {
        Some(key) => schema.schema_at_path(key)?,
        None => schema.clone(),
    };
    match target.items() {
        Some(items) => Some(items),
        None => Some(target),
    }
}

/// Bind `params` to the method in `ctx`.
///
/// Every user key ends up in exactly one place: a location bucket, the
/// request body, the response columns or the unassigned bucket.
pub fn bind(ctx: &MethodContext<'_>, params: &ParamMap) -> Result<HttpParameters> {
    let method = ctx.method;
    let mut out = HttpParameters::new();
    let mut consumed: Vec<&String> = Vec::new();

    for param in method.parameters() {
        let found = lookup(params, &param.name);
        match param.location {
            ParamLocation::Header => {
                let value = match found {
                    Some((key, value)) => {
                        consumed.push(key);
                        Some(value.clone())
                    }
                    None => param.default_value().cloned().map(ParamValue::from),
                };
                match value {
                    Some(value) => out.store(ParameterBinding::new(param, value))?,
                    None if param.required => {
                        return Err(ProviderError::missing(param.name, ParamLocation::Header))
                    }
                    None => {}
                }
            }
            location => match found {
                Some((key, value)) => {
                    consumed.push(key);
                    out.store(ParameterBinding::new(param, value.clone()))?;
                }
                None if param.required || location == ParamLocation::Path => {
                    return Err(ProviderError::missing(param.name, location));
                }
                None => {}
            },
        }
    }

    for param in method.body_parameters() {
        match lookup(params, &param.name) {
            Some((key, value)) => {
                consumed.push(key);
                let value = body_value(&param, value);
                out.store(ParameterBinding::new(param, value))?;
            }
            None if param.required => {
                return Err(ProviderError::missing(param.name, ParamLocation::RequestBody));
            }
            None => {}
        }
    }

    let row = row_schema(method);
    for (key, value) in params {
        if consumed.contains(&key) {
            continue;
        }
        let short = key.rsplit('.').next().unwrap_or(key);
        if let Some(property) = strip_request_body_key(short) {
            debug!(key = %key, "binding undeclared request body member");
            out.request_body
                .insert(property.to_string(), value.to_json());
        } else if method.is_server_variable(short) {
            let param = Parameter {
                name: short.to_string(),
                location: ParamLocation::Server,
                schema: None,
                required: false,
                allow_empty_value: false,
                description: None,
            };
            out.store(ParameterBinding::new(param, value.clone()))?;
        } else if row.as_ref().is_some_and(|s| s.property(short).is_some()) {
            out.response_body.insert(short.to_string(), value.to_json());
        } else {
            out.unassigned.insert(key.clone(), value.clone());
        }
    }

    out.region = out
        .server_params
        .get(REGION_KEY)
        .map(|b| b.value.to_query_value())
        .or_else(|| out.unassigned.get(REGION_KEY).map(ParamValue::to_query_value));

    debug!(
        method = %method.key,
        path = out.path_params.len(),
        query = out.query_params.len(),
        header = out.header_params.len(),
        server = out.server_params.len(),
        body = out.request_body.len(),
        response = out.response_body.len(),
        unassigned = out.unassigned.len(),
        "bound parameters"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpose::{AwsCanonical, AwsCloudControl};
    use serde_json::json;
    use stackql_provider_parser::{Loader, Service};

    const DOC: &str = r##"
openapi: 3.0.0
info:
  title: Things
  version: '1'
servers:
  - url: https://{region}.things.example
    variables:
      region:
        default: use1
paths:
  /projects/{project}/things:
    post:
      parameters:
        - name: project
          in: path
          required: true
          schema:
            type: string
        - name: filter
          in: query
          schema:
            type: object
        - name: ids
          in: query
          schema:
            type: array
        - name: X-Api-Version
          in: header
          schema:
            type: string
            default: '2024-01-01'
        - name: X-Trace
          in: header
          required: true
          schema:
            type: string
        - name: session
          in: cookie
          schema:
            type: string
      requestBody:
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties:
                name:
                  type: string
                spec:
                  type: object
                raw:
                  type: object
                  x-stringOnly: true
      responses:
        200:
          description: ok
components:
  x-stackQL-resources:
    things:
      id: t.things
      name: things
      methods:
        insert:
          operation:
            $ref: '#/paths/~1projects~1{project}~1things/post'
"##;

    fn service() -> Service {
        Loader::new().load_service(DOC.as_bytes()).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> ParamMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ParamValue::from(*v)))
            .collect()
    }

    fn bind_things(service: &Service, p: &ParamMap) -> Result<HttpParameters> {
        let resource = service.resource("things").unwrap();
        let method = resource.method("insert").unwrap();
        bind(&MethodContext::new(service, resource, method), p)
    }

    #[test]
    fn test_bind_locations() {
        let service = service();
        let p = params(&[
            ("project", "p1"),
            ("X-Trace", "t-1"),
            ("session", "abc"),
            ("data__name", "n"),
            ("region", "apse1"),
            ("unrelated", "x"),
        ]);
        let bound = bind_things(&service, &p).unwrap();

        assert_eq!(bound.path_values()["project"], "p1");
        assert_eq!(
            bound.header_values(),
            vec![
                ("X-Api-Version".to_string(), "2024-01-01".to_string()),
                ("X-Trace".to_string(), "t-1".to_string()),
            ]
        );
        assert_eq!(bound.cookie_header().as_deref(), Some("session=abc"));
        assert_eq!(bound.body_json(), Some(json!({"name": "n"})));
        assert_eq!(bound.server_values()["region"], "apse1");
        assert_eq!(bound.region.as_deref(), Some("apse1"));
        assert!(bound.unassigned.contains_key("unrelated"));
        // header default is not a user key
        assert_eq!(bound.len() - 1, p.len());
    }

    #[test]
    fn test_missing_required_header() {
        let service = service();
        let err = bind_things(&service, &params(&[("project", "p1"), ("data__name", "n")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingRequired { ref name, location: ParamLocation::Header } if name == "X-Trace"
        ));
    }

    #[test]
    fn test_missing_path_parameter() {
        let service = service();
        let err = bind_things(&service, &params(&[("X-Trace", "t"), ("data__name", "n")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingRequired { location: ParamLocation::Path, .. }
        ));
    }

    #[test]
    fn test_body_json_strings_are_parsed() {
        let service = service();
        let p = params(&[
            ("project", "p1"),
            ("X-Trace", "t"),
            ("data__name", "n"),
            ("data__spec", r#"{"size": 2}"#),
            ("data__raw", r#"{"kept": "as text"}"#),
        ]);
        let body = bind_things(&service, &p).unwrap().body_json().unwrap();
        assert_eq!(body["spec"], json!({"size": 2}));
        assert_eq!(body["raw"], json!(r#"{"kept": "as text"}"#));
        assert_eq!(body["name"], json!("n"));
    }

    #[test]
    fn test_json_query_value_transposed() {
        let service = service();
        let p = params(&[
            ("project", "p1"),
            ("X-Trace", "t"),
            ("data__name", "n"),
            ("filter", r#"JSON({"k":"v"})"#),
        ]);
        let bound = bind_things(&service, &p).unwrap();
        assert_eq!(
            bound.query_pairs(&AwsCanonical).unwrap(),
            vec![("filter.k".to_string(), "v".to_string())]
        );
        assert_eq!(
            bound.query_pairs(&AwsCloudControl).unwrap(),
            vec![("filter".to_string(), r#"{"k":"v"}"#.to_string())]
        );
    }

    #[test]
    fn test_string_function_and_list_query_values() {
        let service = service();
        let mut p = params(&[
            ("project", "p1"),
            ("X-Trace", "t"),
            ("data__name", "n"),
            ("filter", "STRING('it''s')"),
        ]);
        p.insert(
            "ids".to_string(),
            ParamValue::List(vec![ParamValue::from("a"), ParamValue::from("b")]),
        );
        let pairs = bind_things(&service, &p)
            .unwrap()
            .query_pairs(&AwsCanonical)
            .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("filter".to_string(), "it's".to_string()),
                ("ids".to_string(), "a".to_string()),
                ("ids".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_name_bound_to_one_location_only() {
        let service = service();
        let mut bound = bind_things(
            &service,
            &params(&[("project", "p1"), ("X-Trace", "t"), ("data__name", "n")]),
        )
        .unwrap();
        let clash = bound.path_params["project"].clone();
        let mut as_query = clash.param.clone();
        as_query.location = ParamLocation::Query;
        let err = bound
            .store(ParameterBinding::new(as_query, clash.value))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Parameter(_)));
    }
}
