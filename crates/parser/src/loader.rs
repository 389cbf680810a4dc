//! Document loader
//!
//! Turns provider, service and resources document bytes into the entity
//! model. Bytes may be YAML or JSON; YAML is normalised into a JSON value
//! tree first so that non-string mapping keys such as `200:` are accepted.
//!
//! For every method the loader resolves the path item and operation named by
//! its `$ref`s, the request schema for the declared media type and the
//! response schema for the declared status key. Referenced schemas are
//! cached per loader so a schema reached twice is resolved once.

use crate::model::{
    ExpectedRequest, ExpectedResponse, Method, Parameter, Provider, ProviderService, Resource,
    ResourceRegister, Schema, Service, STANDARD_SELECTOR,
};
use crate::openapi::{
    Components, ExpectedRequestDoc, ExpectedResponseDoc, MethodDoc, OpenApiDoc, Operation,
    PathItem, ProviderDoc, RefOr, ResourceDoc, ResourceRegisterDoc, SchemaOrRef, CONFIG_EXTENSION,
    PROVIDER_EXTENSION, RESOURCES_EXTENSION, SERVICE_NAME_EXTENSION,
};
use serde_json::Value;
use stackql_provider_common::{Config, ParamLocation, ProviderError, Result, SqlVerb};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Media type assumed when a request override names none
const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// Decodes a JSON Pointer segment (handles `~1` and `~0`)
pub fn decode_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Parse document bytes, auto-detecting JSON or YAML
pub fn parse_document(bytes: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ProviderError::Document(format!("document is not valid UTF-8: {}", e)))?;
    if text.trim_start().starts_with('{') {
        return Ok(serde_json::from_str(text)?);
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
    yaml_to_json(yaml)
}

fn yaml_key_to_string(key: serde_yaml::Value) -> Result<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok("null".to_string()),
        other => Err(ProviderError::Document(format!(
            "unsupported mapping key {:?}",
            other
        ))),
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(yaml_key_to_string(k)?, yaml_to_json(v)?);
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::Document(format!("Failed to parse {}: {}", what, e)))
}

/// Method key named by `#/components/x-stackQL-resources/<res>/methods/<key>`
fn method_key_from_ref(ref_path: &str) -> String {
    decode_pointer_segment(ref_path.rsplit('/').next().unwrap_or(ref_path))
}

/// `(path, verb)` named by a method's operation and path references
fn operation_location(doc: &MethodDoc) -> Result<(String, String)> {
    let op_ref = doc.operation.ref_path.as_str();
    if let Some(path_ref) = doc.path.as_ref().filter(|p| !p.is_empty()) {
        let escaped = path_ref
            .ref_path
            .strip_prefix("#/paths/")
            .ok_or_else(|| {
                ProviderError::Document(format!("invalid path reference '{}'", path_ref.ref_path))
            })?;
        let verb = op_ref.rsplit('/').next().unwrap_or(op_ref);
        return Ok((decode_pointer_segment(escaped), verb.to_string()));
    }
    let pointer = op_ref.strip_prefix("#/paths/").ok_or_else(|| {
        ProviderError::Document(format!("invalid operation reference '{}'", op_ref))
    })?;
    let (escaped, verb) = pointer.rsplit_once('/').ok_or_else(|| {
        ProviderError::Document(format!("operation reference '{}' names no verb", op_ref))
    })?;
    Ok((decode_pointer_segment(escaped), verb.to_string()))
}

/// Verb whose default method keys include `key`
fn default_verb_for(key: &str) -> Option<SqlVerb> {
    SqlVerb::ORDERED
        .into_iter()
        .find(|verb| verb.default_method_keys().contains(&key))
}

/// First success status key, else `default`
fn default_response_key(operation: &Operation) -> Option<String> {
    operation
        .responses
        .keys()
        .find(|k| k.starts_with('2'))
        .or_else(|| operation.responses.keys().find(|k| k.as_str() == "default"))
        .cloned()
}

/// Loads documents into the entity model. Not reentrant; use one loader
/// per thread.
#[derive(Debug, Default)]
pub struct Loader {
    visited_schemas: HashMap<String, Schema>,
    visited_operations: HashSet<String>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a service document from a file path
    pub fn load_service_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Service> {
        debug!(path = %path.as_ref().display(), "reading service document");
        let bytes = fs::read(path.as_ref())?;
        self.load_service(&bytes)
    }

    /// Load a service document carrying its own `x-stackQL-resources`
    pub fn load_service(&mut self, bytes: &[u8]) -> Result<Service> {
        self.build_service(parse_document(bytes)?, None)
    }

    /// Load a service document whose resources come from a shallow register
    pub fn load_service_with_register(
        &mut self,
        bytes: &[u8],
        register: &ResourceRegister,
    ) -> Result<Service> {
        self.build_service(parse_document(bytes)?, Some(register.resources.clone()))
    }

    pub fn load_resource_register(&mut self, bytes: &[u8]) -> Result<ResourceRegister> {
        let doc: ResourceRegisterDoc = from_value(parse_document(bytes)?, "resources document")?;
        debug!(resources = doc.resources.len(), "loaded resource register");
        Ok(ResourceRegister {
            resources: doc.resources,
            service_doc: doc.service_doc,
        })
    }

    pub fn load_provider(&mut self, bytes: &[u8]) -> Result<Provider> {
        let doc: ProviderDoc = from_value(parse_document(bytes)?, "provider document")?;
        let provider_services = doc
            .provider_services
            .into_iter()
            .map(|(key, ps)| {
                let service = ProviderService {
                    id: ps.id,
                    name: if ps.name.is_empty() { key.clone() } else { ps.name },
                    title: ps.title,
                    version: ps.version,
                    description: ps.description,
                    preferred: ps.preferred,
                    service_ref: ps.service,
                    resources_ref: ps.resources,
                    config: ps.config,
                    provider_name: doc.name.clone(),
                    service: OnceLock::new(),
                    register: OnceLock::new(),
                };
                (key, service)
            })
            .collect::<BTreeMap<_, _>>();
        debug!(provider = %doc.name, services = provider_services.len(), "loaded provider");
        Ok(Provider {
            id: doc.id,
            name: doc.name,
            title: doc.title,
            version: doc.version,
            description: doc.description,
            provider_services,
            config: doc.config,
        })
    }

    /// Operations resolved so far, as `VERB /path`
    pub fn visited_operations(&self) -> Vec<String> {
        let mut out: Vec<String> = self.visited_operations.iter().cloned().collect();
        out.sort();
        out
    }

    fn build_service(
        &mut self,
        value: Value,
        resource_docs: Option<BTreeMap<String, ResourceDoc>>,
    ) -> Result<Service> {
        let doc: OpenApiDoc = from_value(value, "OpenAPI document")?;
        // schema refs are document-relative
        self.visited_schemas.clear();

        let resource_docs = match resource_docs {
            Some(docs) => docs,
            None => {
                let raw = doc
                    .components
                    .extensions
                    .get(RESOURCES_EXTENSION)
                    .cloned()
                    .ok_or_else(|| {
                        ProviderError::Document(format!(
                            "document '{}' has no {} extension",
                            doc.info.title, RESOURCES_EXTENSION
                        ))
                    })?;
                from_value(raw, RESOURCES_EXTENSION)?
            }
        };

        let config: Option<Config> = doc
            .components
            .extensions
            .get(CONFIG_EXTENSION)
            .cloned()
            .map(|raw| from_value(raw, CONFIG_EXTENSION))
            .transpose()?;

        let name = doc
            .info
            .extensions
            .get(SERVICE_NAME_EXTENSION)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| doc.info.title.clone());
        let provider_tag = doc
            .extensions
            .get(PROVIDER_EXTENSION)
            .and_then(Value::as_str)
            .map(str::to_string);

        let components = Arc::new(doc.components.clone());
        let doc = Arc::new(doc);

        let mut resources = BTreeMap::new();
        for (resource_name, resource_doc) in resource_docs {
            let resource = self.build_resource(&doc, &components, &resource_name, resource_doc)?;
            resources.insert(resource_name, resource);
        }

        debug!(service = %name, resources = resources.len(), "loaded service");
        Ok(Service {
            name,
            title: doc.info.title.clone(),
            version: doc.info.version.clone(),
            description: doc.info.description.clone(),
            provider_tag,
            doc,
            components,
            resources,
            config,
        })
    }

    fn build_resource(
        &mut self,
        doc: &OpenApiDoc,
        components: &Arc<Components>,
        resource_name: &str,
        resource_doc: ResourceDoc,
    ) -> Result<Resource> {
        let mut sql_verbs: BTreeMap<SqlVerb, Vec<String>> = BTreeMap::new();
        let mut verb_of: HashMap<String, SqlVerb> = HashMap::new();
        for (verb_name, refs) in &resource_doc.sql_verbs {
            let verb = SqlVerb::parse(verb_name);
            for method_ref in refs {
                let key = method_key_from_ref(&method_ref.ref_path);
                if !resource_doc.methods.contains_key(&key) {
                    return Err(ProviderError::Document(format!(
                        "resource '{}' lists unknown method '{}' under {}",
                        resource_name, key, verb
                    )));
                }
                verb_of.entry(key.clone()).or_insert(verb);
                sql_verbs.entry(verb).or_default().push(key);
            }
        }

        let mut methods = BTreeMap::new();
        for (key, method_doc) in &resource_doc.methods {
            let verb = method_doc
                .sql_verb
                .as_deref()
                .map(SqlVerb::parse)
                .or_else(|| verb_of.get(key).copied())
                .or_else(|| default_verb_for(key))
                .unwrap_or(SqlVerb::Exec);
            let method = self
                .build_method(doc, components, key, method_doc, verb)
                .map_err(|e| match e {
                    ProviderError::Document(msg) => ProviderError::Document(format!(
                        "resource '{}', method '{}': {}",
                        resource_name, key, msg
                    )),
                    other => other,
                })?;
            methods.insert(key.clone(), method);
        }

        Ok(Resource {
            id: resource_doc.id,
            name: if resource_doc.name.is_empty() {
                resource_name.to_string()
            } else {
                resource_doc.name
            },
            title: resource_doc.title,
            description: resource_doc.description,
            selector_algorithm: resource_doc
                .selector_algorithm
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| STANDARD_SELECTOR.to_string()),
            methods,
            sql_verbs,
            config: resource_doc.config,
            service_doc: resource_doc.service_doc,
        })
    }

    fn build_method(
        &mut self,
        doc: &OpenApiDoc,
        components: &Arc<Components>,
        key: &str,
        method_doc: &MethodDoc,
        sql_verb: SqlVerb,
    ) -> Result<Method> {
        let (path, verb) = operation_location(method_doc)?;
        let path_item = doc
            .paths
            .get(&path)
            .ok_or_else(|| ProviderError::Document(format!("path '{}' not found", path)))?;
        let operation = path_item.operation(&verb).ok_or_else(|| {
            ProviderError::Document(format!("operation '{}' not found on path '{}'", verb, path))
        })?;
        let api_method = verb.to_ascii_uppercase();
        self.visited_operations
            .insert(format!("{} {}", api_method, path));

        let parameters = self.resolve_parameters(components, path_item, operation)?;
        let request =
            self.resolve_request(components, key, method_doc.request.as_ref(), operation)?;
        let response =
            self.resolve_response(components, key, method_doc.response.as_ref(), operation)?;

        Ok(Method {
            key: key.to_string(),
            sql_verb,
            api_method,
            path,
            operation_id: operation.operation_id.clone(),
            parameters,
            request,
            response,
            servers: method_doc.servers.clone().unwrap_or_default(),
            operation_servers: operation.servers.clone(),
            path_servers: path_item.servers.clone(),
            service_servers: doc.servers.clone(),
            graphql: method_doc.graphql.clone(),
            config: method_doc.config.clone(),
        })
    }

    /// Resolve a schema, returning the cached handle for a reference
    /// already seen by this loader
    fn resolve_schema(
        &mut self,
        components: &Arc<Components>,
        schema: &SchemaOrRef,
        key_hint: &str,
    ) -> Option<Schema> {
        match schema {
            RefOr::Reference { ref_path } => {
                if let Some(cached) = self.visited_schemas.get(ref_path) {
                    return Some(cached.clone());
                }
                let resolved = Schema::resolve(schema, components, key_hint)?;
                self.visited_schemas
                    .insert(ref_path.clone(), resolved.clone());
                Some(resolved)
            }
            RefOr::Item(_) => Schema::resolve(schema, components, key_hint),
        }
    }

    fn resolve_parameters(
        &mut self,
        components: &Arc<Components>,
        path_item: &PathItem,
        operation: &Operation,
    ) -> Result<Vec<Parameter>> {
        let mut out: Vec<Parameter> = Vec::new();
        for declared in path_item.parameters.iter().chain(operation.parameters.iter()) {
            let raw = match declared {
                RefOr::Item(p) => p.clone(),
                RefOr::Reference { ref_path } => components
                    .resolve_parameter_ref(ref_path)
                    .cloned()
                    .ok_or_else(|| {
                        ProviderError::Document(format!(
                            "parameter reference '{}' not found",
                            ref_path
                        ))
                    })?,
            };
            let location = ParamLocation::from_openapi(&raw.location).ok_or_else(|| {
                ProviderError::Document(format!(
                    "parameter '{}' has unsupported location '{}'",
                    raw.name, raw.location
                ))
            })?;
            let schema = match raw.schema.as_ref() {
                Some(s) => self.resolve_schema(components, s, &raw.name),
                None => None,
            };
            let param = Parameter {
                required: raw.required || location == ParamLocation::Path,
                name: raw.name,
                location,
                schema,
                allow_empty_value: raw.allow_empty_value,
                description: raw.description,
            };
            match out
                .iter_mut()
                .find(|p| p.name == param.name && p.location == param.location)
            {
                Some(existing) => *existing = param,
                None => out.push(param),
            }
        }
        Ok(out)
    }

    fn resolve_request(
        &mut self,
        components: &Arc<Components>,
        key: &str,
        request_doc: Option<&ExpectedRequestDoc>,
        operation: &Operation,
    ) -> Result<Option<ExpectedRequest>> {
        let key_hint = format!("{}.request", key);
        let required = request_doc.map(|r| r.required.clone()).unwrap_or_default();
        let override_schema = request_doc.and_then(|r| r.schema_override.as_ref());
        let named_media_type = request_doc.and_then(|r| r.media_type.clone());

        let body = match operation.request_body.as_ref() {
            Some(RefOr::Item(body)) => Some(body.clone()),
            Some(RefOr::Reference { ref_path }) => Some(
                components
                    .resolve_request_body_ref(ref_path)
                    .cloned()
                    .ok_or_else(|| {
                        ProviderError::Document(format!(
                            "request body reference '{}' not found",
                            ref_path
                        ))
                    })?,
            ),
            None => None,
        };

        let Some(body) = body else {
            return Ok(match override_schema {
                Some(schema) => Some(ExpectedRequest {
                    media_type: named_media_type
                        .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
                    schema: self.resolve_schema(components, schema, &key_hint),
                    required,
                }),
                None => None,
            });
        };

        let media_type = match named_media_type {
            Some(mt) => mt,
            None => body.content.keys().next().cloned().ok_or_else(|| {
                ProviderError::Document("request body declares no media type".to_string())
            })?,
        };

        let schema = match override_schema {
            Some(schema) => self.resolve_schema(components, schema, &key_hint),
            None => {
                let content = body.content.get(&media_type).ok_or_else(|| {
                    ProviderError::Document(format!(
                        "request media type '{}' not declared",
                        media_type
                    ))
                })?;
                match content.schema.as_ref() {
                    Some(s) => self.resolve_schema(components, s, &key_hint),
                    None => None,
                }
            }
        };

        Ok(Some(ExpectedRequest {
            media_type,
            schema,
            required,
        }))
    }

    fn resolve_response(
        &mut self,
        components: &Arc<Components>,
        key: &str,
        response_doc: Option<&ExpectedResponseDoc>,
        operation: &Operation,
    ) -> Result<Option<ExpectedResponse>> {
        let key_hint = format!("{}.response", key);
        let doc_key = match response_doc.and_then(|r| r.open_api_doc_key.clone()) {
            Some(k) => k,
            None => match default_response_key(operation) {
                Some(k) => k,
                None => return Ok(None),
            },
        };

        let response = match operation.responses.get(&doc_key) {
            Some(RefOr::Item(r)) => r.clone(),
            Some(RefOr::Reference { ref_path }) => components
                .resolve_response_ref(ref_path)
                .cloned()
                .ok_or_else(|| {
                    ProviderError::Document(format!(
                        "response reference '{}' not found",
                        ref_path
                    ))
                })?,
            None => {
                return Err(ProviderError::Document(format!(
                    "response '{}' not declared",
                    doc_key
                )))
            }
        };

        let media_type = response_doc
            .and_then(|r| r.media_type.clone())
            .or_else(|| response.content.keys().next().cloned())
            .unwrap_or_default();

        let schema = match response_doc.and_then(|r| r.schema_override.as_ref()) {
            Some(schema) => self.resolve_schema(components, schema, &key_hint),
            None if response.content.is_empty() => None,
            None => {
                let content = response.content.get(&media_type).ok_or_else(|| {
                    ProviderError::Document(format!(
                        "response media type '{}' not declared for '{}'",
                        media_type, doc_key
                    ))
                })?;
                match content.schema.as_ref() {
                    Some(s) => self.resolve_schema(components, s, &key_hint),
                    None => None,
                }
            }
        };

        Ok(Some(ExpectedResponse {
            media_type,
            open_api_doc_key: doc_key,
            object_key: response_doc
                .and_then(|r| r.object_key.clone())
                .filter(|k| !k.is_empty()),
            schema,
        }))
    }
}
