//! Schema handle with lazy `$ref` resolution
//!
//! A [`Schema`] pairs an OpenAPI schema with the components it was declared
//! in. Child schemas are resolved on access, one level at a time, so cyclic
//! schema graphs never recurse during loading.

use crate::openapi::{
    self, ref_last_segment, AdditionalProperties, Components, RefOr, SchemaOrRef,
    ALWAYS_REQUIRED_EXTENSION, STRING_ONLY_EXTENSION,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the property conventionally holding list results
const ITEMS_PROPERTY: &str = "items";

/// A resolved schema with its storage key
#[derive(Debug, Clone)]
pub struct Schema {
    key: String,
    raw: Arc<openapi::Schema>,
    components: Arc<Components>,
}

impl Schema {
    pub fn new(key: &str, raw: openapi::Schema, components: Arc<Components>) -> Self {
        Self {
            key: key.to_string(),
            raw: Arc::new(raw),
            components,
        }
    }

    /// Resolve a schema-or-reference against `components`.
    ///
    /// References take the last pointer segment as their key; inline schemas
    /// take `key_hint`, except an inline array of a referenced type, which is
    /// keyed `[]<type>`.
    pub fn resolve(
        schema_or_ref: &SchemaOrRef,
        components: &Arc<Components>,
        key_hint: &str,
    ) -> Option<Self> {
        match schema_or_ref {
            RefOr::Reference { ref_path } => {
                let raw = components.resolve_schema_ref(ref_path)?;
                Some(Self::new(
                    ref_last_segment(ref_path),
                    raw.clone(),
                    Arc::clone(components),
                ))
            }
            RefOr::Item(raw) => {
                let key = match (raw.schema_type.as_deref(), raw.items.as_deref()) {
                    (Some("array"), Some(RefOr::Reference { ref_path })) => {
                        format!("[]{}", ref_last_segment(ref_path))
                    }
                    _ => key_hint.to_string(),
                };
                Some(Self::new(&key, raw.as_ref().clone(), Arc::clone(components)))
            }
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn raw(&self) -> &openapi::Schema {
        &self.raw
    }

    pub fn schema_type(&self) -> Option<&str> {
        self.raw.schema_type.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.raw.description.as_deref()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.raw.default.as_ref()
    }

    fn flag_extension(&self, name: &str) -> bool {
        self.raw
            .extensions
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// `x-alwaysRequired`: the property is required whatever the parent says
    pub fn is_always_required(&self) -> bool {
        self.flag_extension(ALWAYS_REQUIRED_EXTENSION)
    }

    /// `x-stringOnly`: string values are never parsed as JSON
    pub fn is_string_only(&self) -> bool {
        self.flag_extension(STRING_ONLY_EXTENSION)
    }

    /// XML element name alias, if declared
    pub fn xml_name(&self) -> Option<&str> {
        self.raw
            .xml
            .as_ref()
            .and_then(|xml| xml.name.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// Root element name for XML serialisation
    pub fn xml_root_name(&self) -> &str {
        match self.xml_name() {
            Some(name) => name,
            None if !self.key.is_empty() && !self.key.starts_with("[]") => &self.key,
            None => "root",
        }
    }

    /// Object or array shaped values may arrive as JSON text
    pub fn is_structured(&self) -> bool {
        matches!(self.schema_type(), Some("object") | Some("array"))
            || !self.raw.properties.is_empty()
    }

    /// Scalar roots are projected into an anonymous column
    pub fn is_scalar_root(&self) -> bool {
        matches!(self.schema_type(), Some("string") | Some("integer"))
    }

    /// Properties including those merged from `allOf` members
    pub fn properties(&self) -> BTreeMap<String, Schema> {
        let mut out = BTreeMap::new();
        for member in &self.raw.all_of {
            if let Some(resolved) = Schema::resolve(member, &self.components, &self.key) {
                out.extend(resolved.properties());
            }
        }
        for (name, prop) in &self.raw.properties {
            if let Some(resolved) = Schema::resolve(prop, &self.components, name) {
                out.insert(name.clone(), resolved);
            }
        }
        out
    }

    pub fn property(&self, name: &str) -> Option<Schema> {
        if let Some(prop) = self.raw.properties.get(name) {
            return Schema::resolve(prop, &self.components, name);
        }
        self.properties().remove(name)
    }

    /// Names of required properties: the declared list, `allOf` members'
    /// lists and every property flagged `x-alwaysRequired`
    pub fn required_properties(&self) -> Vec<String> {
        let mut required: Vec<String> = self.raw.required.clone();
        for member in &self.raw.all_of {
            if let Some(resolved) = Schema::resolve(member, &self.components, &self.key) {
                required.extend(resolved.raw.required.iter().cloned());
            }
        }
        for (name, prop) in self.properties() {
            if prop.is_always_required() {
                required.push(name);
            }
        }
        required.sort();
        required.dedup();
        required
    }

    pub fn is_required(&self, property: &str) -> bool {
        self.required_properties().iter().any(|r| r == property)
    }

    /// Element schema of an array
    pub fn items(&self) -> Option<Schema> {
        let items = self.raw.items.as_deref()?;
        Schema::resolve(items, &self.components, &format!("{}[]", self.key))
    }

    /// Value schema of a map-typed object
    pub fn additional_properties(&self) -> Option<Schema> {
        match self.raw.additional_properties.as_ref()? {
            AdditionalProperties::Schema(schema) => {
                Schema::resolve(schema, &self.components, &self.key)
            }
            AdditionalProperties::Flag(_) => None,
        }
    }

    /// The `items` property when the schema has one
    pub fn select_item_key(&self) -> Option<&'static str> {
        if self.raw.properties.contains_key(ITEMS_PROPERTY)
            || self.properties().contains_key(ITEMS_PROPERTY)
        {
            Some(ITEMS_PROPERTY)
        } else {
            None
        }
    }

    /// Schema of the rows selected by `object_key`, when it can be followed
    /// through the declared properties. Supports dotted and `$.`-prefixed
    /// JSON paths, with `[*]` or `[n]` stepping into array items.
    pub fn schema_at_path(&self, object_key: &str) -> Option<Schema> {
        let path = object_key.trim_start_matches('$').trim_start_matches('.');
        let mut current = self.clone();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            let (name, indexed) = match segment.find('[') {
                Some(pos) => (&segment[..pos], true),
                None => (segment, false),
            };
            if !name.is_empty() {
                current = current.property(name)?;
            }
            if indexed {
                current = current.items()?;
            }
        }
        Some(current)
    }

    pub fn components(&self) -> &Arc<Components> {
        &self.components
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.raw == other.raw
    }
}
