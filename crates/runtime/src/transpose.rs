//! Query parameter transposition for `JSON(...)` values
//!
//! A structured query value has to be spread over flat query pairs. The
//! algorithm is chosen by the `queryParamTranspose` config; unknown names
//! fall back to [`AwsCloudControl`].

use serde_json::{Map, Value};
use stackql_provider_common::{ProviderError, Result};
use tracing::debug;

pub const AWS_CANONICAL: &str = "AWSCanonical";
pub const AWS_CLOUD_CONTROL: &str = "AWSCloudControl";

pub trait QueryTransposer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Flatten `value` into query pairs rooted at `base_key`
    fn transpose(&self, value: &Value, base_key: &str) -> Result<Vec<(String, String)>>;
}

/// Recursive dotted flattening: objects by member name, arrays 1-indexed,
/// scalars in their plain text form and `null` as the empty string.
///
/// `{"a":{"b":[1,"x"]}}` under `P` becomes `P.a.b.1=1`, `P.a.b.2=x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsCanonical;

/// Passes the value through under its own key
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsCloudControl;

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten(value: &Value, prefix: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(child, format!("{}.{}", prefix, key), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten(child, format!("{}.{}", prefix, i + 1), out);
            }
        }
        scalar => out.push((prefix, scalar_text(scalar))),
    }
}

impl QueryTransposer for AwsCanonical {
    fn name(&self) -> &'static str {
        AWS_CANONICAL
    }

    fn transpose(&self, value: &Value, base_key: &str) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        flatten(value, base_key.to_string(), &mut out);
        Ok(out)
    }
}

impl QueryTransposer for AwsCloudControl {
    fn name(&self) -> &'static str {
        AWS_CLOUD_CONTROL
    }

    fn transpose(&self, value: &Value, base_key: &str) -> Result<Vec<(String, String)>> {
        Ok(vec![(base_key.to_string(), scalar_text(value))])
    }
}

/// Transposer for a configured algorithm name
pub fn query_transposer(algorithm: Option<&str>) -> Box<dyn QueryTransposer> {
    match algorithm {
        Some(name) if name.eq_ignore_ascii_case(AWS_CANONICAL) => Box::new(AwsCanonical),
        Some(name) if name.eq_ignore_ascii_case(AWS_CLOUD_CONTROL) => Box::new(AwsCloudControl),
        Some(name) => {
            debug!(algorithm = %name, "unknown query transpose algorithm, passing values through");
            Box::new(AwsCloudControl)
        }
        None => Box::new(AwsCloudControl),
    }
}

fn infer_scalar(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(text.to_string()),
    }
}

/// `max_index` bounds array positions; no array can hold more elements than
/// there are pairs
fn insert_path(
    node: &mut Value,
    segments: &[&str],
    leaf: Value,
    key: &str,
    max_index: usize,
) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        *node = leaf;
        return Ok(());
    };
    let conflict = || ProviderError::Transform(format!("conflicting shapes at '{}'", key));

    match head.parse::<usize>() {
        Ok(0) => Err(ProviderError::Transform(format!(
            "array index 0 in '{}' (indices start at 1)",
            key
        ))),
        Ok(index) if index > max_index => Err(ProviderError::Transform(format!(
            "array index {} in '{}' exceeds the {} pairs given",
            index, key, max_index
        ))),
        Ok(index) => {
            if node.is_null() {
                *node = Value::Array(Vec::new());
            }
            let items = node.as_array_mut().ok_or_else(conflict)?;
            if items.len() < index {
                items.resize(index, Value::Null);
            }
            insert_path(&mut items[index - 1], rest, leaf, key, max_index)
        }
        Err(_) => {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            let map = node.as_object_mut().ok_or_else(conflict)?;
            let child = map.entry(head.to_string()).or_insert(Value::Null);
            insert_path(child, rest, leaf, key, max_index)
        }
    }
}

/// Rebuild the structured value from [`AwsCanonical`] pairs.
///
/// Numeric segments become 1-indexed array positions; numbers and booleans
/// are recovered from their text and empty text becomes `null`.
pub fn unflatten(pairs: &[(String, String)], base_key: &str) -> Result<Value> {
    let mut root = Value::Null;
    let prefix = format!("{}.", base_key);
    for (key, text) in pairs {
        let path = if key == base_key {
            ""
        } else {
            key.strip_prefix(&prefix).ok_or_else(|| {
                ProviderError::Transform(format!(
                    "key '{}' is not rooted at '{}'",
                    key, base_key
                ))
            })?
        };
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        insert_path(&mut root, &segments, infer_scalar(text), key, pairs.len())?;
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_aws_canonical_flattening() {
        let out = AwsCanonical
            .transpose(&json!({"a": {"b": [1, "x"]}}), "P")
            .unwrap();
        assert_eq!(out, pairs(&[("P.a.b.1", "1"), ("P.a.b.2", "x")]));
    }

    #[test]
    fn test_aws_canonical_null_is_empty() {
        let out = AwsCanonical.transpose(&json!({"k": null}), "F").unwrap();
        assert_eq!(out, pairs(&[("F.k", "")]));
    }

    #[test]
    fn test_cloud_control_passthrough() {
        let out = AwsCloudControl.transpose(&json!({"k": "v"}), "filter").unwrap();
        assert_eq!(out, pairs(&[("filter", r#"{"k":"v"}"#)]));
    }

    #[test]
    fn test_unknown_algorithm_defaults_to_cloud_control() {
        assert_eq!(query_transposer(Some("Nope")).name(), AWS_CLOUD_CONTROL);
        assert_eq!(query_transposer(None).name(), AWS_CLOUD_CONTROL);
        assert_eq!(query_transposer(Some("AWSCanonical")).name(), AWS_CANONICAL);
    }

    #[test]
    fn test_unflatten_round_trip() {
        let inputs = [
            json!({"a": {"b": [1, "x"]}}),
            json!({"Filter": [{"Name": "vpc-id", "Value": ["v1", "v2"]}], "MaxResults": 5}),
            json!({"flag": true, "nested": {"deep": {"n": 1.5}}}),
        ];
        for input in inputs {
            let flat = AwsCanonical.transpose(&input, "B").unwrap();
            assert_eq!(unflatten(&flat, "B").unwrap(), input);
        }
    }

    #[test]
    fn test_unflatten_rejects_zero_index() {
        let err = unflatten(&pairs(&[("B.a.0", "x")]), "B").unwrap_err();
        assert!(matches!(err, ProviderError::Transform(_)));
    }

    #[test]
    fn test_unflatten_rejects_index_beyond_pairs() {
        let err = unflatten(&pairs(&[("B.4000000000", "x")]), "B").unwrap_err();
        assert!(matches!(err, ProviderError::Transform(_)));
        assert_eq!(
            unflatten(&pairs(&[("B.2", "y"), ("B.1", "x")]), "B").unwrap(),
            json!(["x", "y"])
        );
    }

    #[test]
    fn test_unflatten_conflicting_shapes() {
        let err = unflatten(&pairs(&[("B.a", "x"), ("B.a.b", "y")]), "B").unwrap_err();
        assert!(matches!(err, ProviderError::Transform(_)));
    }
}
