//! XML request bodies and response documents
//!
//! Request bodies are written with `quick-xml`, naming the root element after
//! the request schema's XML alias. Responses are read with `roxmltree` into
//! an owned [`XmlNode`] tree that outlives the response bytes and supports a
//! small XPath-like selector.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::{Map, Value};
use stackql_provider_common::{ProviderError, Result};
use stackql_provider_parser::Schema;
use std::collections::BTreeMap;

fn write_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Transform(format!("Failed to write XML body: {}", e))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_attribute(schema: Option<&Schema>) -> bool {
    schema
        .and_then(|s| s.raw().xml.as_ref())
        .map(|xml| xml.attribute)
        .unwrap_or(false)
}

fn is_wrapped(schema: Option<&Schema>) -> bool {
    schema
        .and_then(|s| s.raw().xml.as_ref())
        .map(|xml| xml.wrapped)
        .unwrap_or(false)
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
    schema: Option<&Schema>,
) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut start = BytesStart::new(name);
            let mut children = Vec::new();
            for (key, child) in map {
                let child_schema = schema.and_then(|s| s.property(key));
                let child_name = child_schema
                    .as_ref()
                    .and_then(|s| s.xml_name())
                    .unwrap_or(key)
                    .to_string();
                if is_attribute(child_schema.as_ref()) {
                    start.push_attribute((child_name.as_str(), scalar_text(child).as_str()));
                } else {
                    children.push((child_name, child, child_schema));
                }
            }
            writer.write_event(Event::Start(start)).map_err(write_error)?;
            for (child_name, child, child_schema) in children {
                write_member(writer, &child_name, child, child_schema.as_ref())?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(write_error)?;
        }
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item, schema)?;
            }
        }
        scalar => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(write_error)?;
            writer
                .write_event(Event::Text(BytesText::new(&scalar_text(scalar))))
                .map_err(write_error)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(write_error)?;
        }
    }
    Ok(())
}

/// A property of an object; wrapped arrays get an enclosing element
fn write_member(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
    schema: Option<&Schema>,
) -> Result<()> {
    match value {
        Value::Array(items) if is_wrapped(schema) => {
            let item_schema = schema.and_then(|s| s.items());
            let item_name = item_schema
                .as_ref()
                .and_then(|s| s.xml_name())
                .unwrap_or(name)
                .to_string();
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(write_error)?;
            for item in items {
                write_element(writer, &item_name, item, item_schema.as_ref())?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(write_error)?;
            Ok(())
        }
        Value::Array(items) => {
            let item_schema = schema.and_then(|s| s.items());
            for item in items {
                write_element(writer, name, item, item_schema.as_ref())?;
            }
            Ok(())
        }
        _ => write_element(writer, name, value, schema),
    }
}

/// Serialise a request body as an XML document rooted at `root`
pub fn to_xml(root: &str, body: &Value, schema: Option<&Schema>) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_error)?;
    write_element(&mut writer, root, body, schema)?;
    Ok(writer.into_inner())
}

/// Owned XML element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    /// Local name, without namespace prefix
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: BTreeMap<String, String>,
    /// Concatenated, trimmed text content of this element
    pub text: String,
    pub children: Vec<XmlNode>,
}

fn from_roxml(node: roxmltree::Node<'_, '_>) -> XmlNode {
    let text: String = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect();
    XmlNode {
        name: node.tag_name().name().to_string(),
        namespace: node.tag_name().namespace().map(str::to_string),
        attributes: node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect(),
        text: text.trim().to_string(),
        children: node
            .children()
            .filter(|c| c.is_element())
            .map(from_roxml)
            .collect(),
    }
}

/// Parse a response document into an owned tree
pub fn parse_xml(bytes: &[u8]) -> Result<XmlNode> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ProviderError::Transform(format!("XML response is not UTF-8: {}", e)))?;
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| ProviderError::Transform(format!("Failed to parse XML response: {}", e)))?;
    Ok(from_roxml(doc.root_element()))
}

fn name_matches(node: &XmlNode, segment: &str) -> bool {
    segment == "*" || node.name == segment
}

fn collect_descendants<'n>(node: &'n XmlNode, segment: &str, out: &mut Vec<&'n XmlNode>) {
    if name_matches(node, segment) {
        out.push(node);
    }
    for child in &node.children {
        collect_descendants(child, segment, out);
    }
}

impl XmlNode {
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Select elements by an XPath-like path.
    ///
    /// `/a/b` is absolute (the first step names this element), `//b/c` starts
    /// at any descendant named `b`, and `b/c` is relative to this element's
    /// children. `*` matches any element; `.` is the current element.
    pub fn select(&self, path: &str) -> Vec<&XmlNode> {
        let path = path.trim();
        let (mut current, rest): (Vec<&XmlNode>, &str) =
            if let Some(rest) = path.strip_prefix("//") {
                let (first, rest) = rest.split_once('/').unwrap_or((rest, ""));
                let mut found = Vec::new();
                collect_descendants(self, first, &mut found);
                (found, rest)
            } else if let Some(rest) = path.strip_prefix('/') {
                let (first, rest) = rest.split_once('/').unwrap_or((rest, ""));
                if name_matches(self, first) {
                    (vec![self], rest)
                } else {
                    (Vec::new(), rest)
                }
            } else {
                (vec![self], path)
            };

        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            if segment == "." {
                continue;
            }
            current = current
                .into_iter()
                .flat_map(|node| node.children.iter().filter(|c| name_matches(c, segment)))
                .collect();
        }
        current
    }

    /// JSON rendering: leaf elements become strings; elements with
    /// attributes or children become objects, repeated child names become
    /// arrays and mixed text is kept under `#text`
    pub fn to_json(&self) -> Value {
        if self.children.is_empty() && self.attributes.is_empty() {
            return Value::String(self.text.clone());
        }
        let mut map = Map::new();
        for (key, value) in &self.attributes {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        let mut repeated: Vec<&str> = Vec::new();
        for child in &self.children {
            let value = child.to_json();
            match map.get_mut(&child.name) {
                Some(Value::Array(items)) if repeated.contains(&child.name.as_str()) => {
                    items.push(value)
                }
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                    repeated.push(&child.name);
                }
                None => {
                    map.insert(child.name.clone(), value);
                }
            }
        }
        if !self.text.is_empty() {
            map.insert("#text".to_string(), Value::String(self.text.clone()));
        }
        Value::Object(map)
    }
}
