//! Integration tests for request construction

use http::header::{ACCEPT, CONTENT_TYPE};
use http::Method;
use serde_json::{json, Value};
use stackql_provider_common::{ParamLocation, ParamMap, ParamValue, ProviderError, SqlVerb};
use stackql_provider_parser::{load_service_from_file, Loader, MethodContext, Service};
use stackql_provider_runtime::{build_http_armoury, project_response, ExecContext, ExecPayload};
use std::path::PathBuf;

fn okta() -> Service {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../parser/tests/fixtures/okta/services/Application.yaml");
    load_service_from_file(path).expect("okta fixture should load")
}

fn params(pairs: &[(&str, &str)]) -> ParamMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), ParamValue::from(*v)))
        .collect()
}

const EC2: &str = r#"
openapi: 3.0.0
info:
  title: Amazon EC2
  version: '2016-11-15'
  x-serviceName: ec2
x-stackql-provider: aws
servers:
  - url: https://ec2.{region}.amazonaws.com
    variables:
      region:
        default: us-east-1
paths:
  /?Action=DescribeVpcs&Version=2016-11-15:
    get:
      operationId: DescribeVpcs
      parameters:
        - name: filter
          in: query
          schema:
            type: object
      responses:
        '200':
          description: Success
          content:
            text/xml:
              schema:
                $ref: '#/components/schemas/DescribeVpcsResponse'
components:
  schemas:
    DescribeVpcsResponse:
      type: object
      properties:
        vpcSet:
          type: array
          items:
            $ref: '#/components/schemas/Vpc'
    Vpc:
      type: object
      properties:
        vpcId:
          type: string
        cidrBlock:
          type: string
  x-stackQL-resources:
    vpcs:
      id: aws.ec2.vpcs
      name: vpcs
      methods:
        describeVpcs:
          operation:
            $ref: '#/paths/~1?Action=DescribeVpcs&Version=2016-11-15/get'
          response:
            mediaType: text/xml
            openAPIDocKey: '200'
            objectKey: /DescribeVpcsResponse/vpcSet/item
      sqlVerbs:
        select:
          - $ref: '#/components/x-stackQL-resources/vpcs/methods/describeVpcs'
  x-stackQL-config:
    queryParamTranspose:
      algorithm: AWSCanonical
__TRANSLATE__
"#;

fn ec2(translate: bool) -> Service {
    let translate = if translate {
        "    requestTranslate:\n      algorithm: get_query_to_post_form_utf_8"
    } else {
        ""
    };
    Loader::new()
        .load_service(EC2.replace("__TRANSLATE__", translate).as_bytes())
        .expect("ec2 document should load")
}

#[test]
fn test_okta_list_request() {
    let service = okta();
    let apps = service.resource("apps").unwrap();
    let (method, unmatched) = apps.select_method(SqlVerb::Select, &ParamMap::new()).unwrap();
    assert_eq!(method.key, "listApplications");
    assert!(unmatched.is_empty());

    let ctx = MethodContext::new(&service, apps, method);
    let armoury = build_http_armoury(&ctx, &[], None).unwrap();
    assert_eq!(armoury.requests.len(), 1);
    assert_eq!(armoury.response_schema.as_ref().unwrap().key(), "[]Application");

    let request = &armoury.requests[0].request;
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.url.as_str(), "https://my-org.okta.com/api/v1/apps");
    assert_eq!(request.headers[ACCEPT], "application/json");
    assert!(request.body.is_none());
}

#[test]
fn test_okta_server_variable_and_path() {
    let service = okta();
    let apps = service.resource("apps").unwrap();
    let row = params(&[("subdomain", "acme"), ("appId", "0oa1 x"), ("expand", "user")]);
    let (method, unmatched) = apps.select_method(SqlVerb::Select, &row).unwrap();
    assert_eq!(method.key, "getApplication");
    assert!(unmatched.contains_key("subdomain"));

    let ctx = MethodContext::new(&service, apps, method);
    let armoury = build_http_armoury(&ctx, &[row], None).unwrap();
    let built = &armoury.requests[0];
    assert_eq!(
        built.request.url.as_str(),
        "https://acme.okta.com/api/v1/apps/0oa1%20x?expand=user"
    );
    assert_eq!(built.path_params["appId"], "0oa1 x");
    assert_eq!(built.parameters.server_params.len(), 1);
    assert_eq!(built.parameters.len(), 3);
}

#[test]
fn test_okta_insert_body() {
    let service = okta();
    let apps = service.resource("apps").unwrap();
    let row = params(&[
        ("data__label", "My App"),
        ("data__signOnMode", "BOOKMARK"),
        ("data__profile", r#"{"team": "core"}"#),
        ("OktaAccessGateway-Agent", "agent/1"),
    ]);
    let (method, _) = apps.select_method(SqlVerb::Insert, &row).unwrap();
    let ctx = MethodContext::new(&service, apps, method);
    let armoury = build_http_armoury(&ctx, &[row], None).unwrap();
    let request = &armoury.requests[0].request;

    assert_eq!(request.method, Method::POST);
    assert_eq!(request.headers[CONTENT_TYPE], "application/json");
    assert_eq!(request.headers["OktaAccessGateway-Agent"], "agent/1");
    let body: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
    // x-stringOnly keeps the profile as text
    assert_eq!(
        body,
        json!({"label": "My App", "signOnMode": "BOOKMARK", "profile": r#"{"team": "core"}"#})
    );
}

#[test]
fn test_missing_path_parameter_on_delete() {
    let service = okta();
    let apps = service.resource("apps").unwrap();
    let delete = apps.method("deleteApplication").unwrap();
    let ctx = MethodContext::new(&service, apps, delete);
    let err = build_http_armoury(&ctx, &[ParamMap::new()], None).unwrap_err();
    assert!(matches!(
        err,
        ProviderError::MissingRequired { ref name, location: ParamLocation::Path } if name == "appId"
    ));
}

#[test]
fn test_one_request_per_row() {
    let service = okta();
    let apps = service.resource("apps").unwrap();
    let get = apps.method("getApplication").unwrap();
    let ctx = MethodContext::new(&service, apps, get);
    let rows = vec![params(&[("appId", "a1")]), params(&[("appId", "a2")])];
    let armoury = build_http_armoury(&ctx, &rows, None).unwrap();
    let urls: Vec<&str> = armoury.requests.iter().map(|r| r.request.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://my-org.okta.com/api/v1/apps/a1",
            "https://my-org.okta.com/api/v1/apps/a2"
        ]
    );
}

#[test]
fn test_exec_payload_wins_and_extensions_copied() {
    #[derive(Debug, Clone, PartialEq)]
    struct Caller(&'static str);

    let service = okta();
    let apps = service.resource("apps").unwrap();
    let create = apps.method("createApplication").unwrap();
    let ctx = MethodContext::new(&service, apps, create);

    let mut exec = ExecContext {
        payload: Some(ExecPayload {
            media_type: "application/json".to_string(),
            body: br#"{"raw":true}"#.to_vec(),
            ..Default::default()
        }),
        ..Default::default()
    };
    exec.extensions.insert(Caller("session"));
    let row = params(&[("data__label", "ignored"), ("data__signOnMode", "BOOKMARK")]);

    let armoury = build_http_armoury(&ctx, &[row], Some(&exec)).unwrap();
    let request = &armoury.requests[0].request;
    assert_eq!(request.body.as_deref(), Some(&br#"{"raw":true}"#[..]));
    assert_eq!(request.extensions.get::<Caller>(), Some(&Caller("session")));
}

#[test]
fn test_json_query_value_transposed() {
    let service = ec2(false);
    let vpcs = service.resource("vpcs").unwrap();
    let describe = vpcs.method("describeVpcs").unwrap();
    let ctx = MethodContext::new(&service, vpcs, describe);
    assert!(ctx.is_aws());

    let row = params(&[("filter", r#"JSON({"k":"v"})"#)]);
    let armoury = build_http_armoury(&ctx, &[row], None).unwrap();
    let request = &armoury.requests[0].request;

    assert_eq!(
        request.url.as_str(),
        "https://ec2.us-east-1.amazonaws.com/?Action=DescribeVpcs&Version=2016-11-15&filter.k=v"
    );
    assert!(request
        .query_pairs()
        .contains(&("filter.k".to_string(), "v".to_string())));
    // aws providers get no Accept header
    assert!(request.headers.get(ACCEPT).is_none());
}

#[test]
fn test_request_translator_from_config() {
    let service = ec2(true);
    let vpcs = service.resource("vpcs").unwrap();
    let describe = vpcs.method("describeVpcs").unwrap();
    let ctx = MethodContext::new(&service, vpcs, describe);

    let row = params(&[("region", "ap-southeast-2")]);
    let armoury = build_http_armoury(&ctx, &[row], None).unwrap();
    let built = &armoury.requests[0];
    assert_eq!(built.parameters.region.as_deref(), Some("ap-southeast-2"));

    let request = &built.request;
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.url.as_str(), "https://ec2.ap-southeast-2.amazonaws.com/");
    assert_eq!(
        request.body.as_deref(),
        Some(&b"Action=DescribeVpcs&Version=2016-11-15"[..])
    );
    assert_eq!(
        request.headers[CONTENT_TYPE],
        "application/x-www-form-urlencoded; charset=utf-8"
    );
}

#[test]
fn test_xml_response_rows() {
    let service = ec2(false);
    let vpcs = service.resource("vpcs").unwrap();
    let describe = vpcs.method("describeVpcs").unwrap();

    let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeVpcsResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <vpcSet>
    <item><vpcId>vpc-1</vpcId><cidrBlock>10.0.0.0/16</cidrBlock></item>
    <item><vpcId>vpc-2</vpcId><cidrBlock>10.1.0.0/16</cidrBlock></item>
  </vpcSet>
</DescribeVpcsResponse>"#;
    let http_response = http::Response::builder()
        .status(200)
        .header(CONTENT_TYPE, "text/xml;charset=UTF-8")
        .body(body.as_bytes().to_vec())
        .unwrap();

    let response = project_response(http_response, describe.response.as_ref()).unwrap();
    assert_eq!(response.body_media_type, "text/xml");
    assert_eq!(
        response.rows(),
        vec![
            json!({"vpcId": "vpc-1", "cidrBlock": "10.0.0.0/16"}),
            json!({"vpcId": "vpc-2", "cidrBlock": "10.1.0.0/16"}),
        ]
    );
}
