//! Minimal JSON path resolution
//!
//! Supports `$`, dotted members (`$.a.b` or `a.b`), bracketed members
//! (`['a.b']`), array indices (`[0]`) and the array wildcard (`[*]`).

use serde_json::Value;
use stackql_provider_common::{ProviderError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Member(String),
    Index(usize),
    Wildcard,
}

fn parse(path: &str) -> Result<Vec<Step>> {
    let path = path.trim();
    let rest = path.strip_prefix('$').unwrap_or(path);
    let chars: Vec<char> = rest.chars().collect();
    let mut steps = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' => i += 1,
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|p| p + i)
                    .ok_or_else(|| {
                        ProviderError::Transform(format!("unclosed '[' in JSON path '{}'", path))
                    })?;
                let inner: String = chars[i + 1..close].iter().collect();
                let inner = inner.trim();
                if inner == "*" {
                    steps.push(Step::Wildcard);
                } else if let Some(quoted) = inner
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
                {
                    steps.push(Step::Member(quoted.to_string()));
                } else {
                    let index = inner.parse::<usize>().map_err(|_| {
                        ProviderError::Transform(format!(
                            "invalid index '{}' in JSON path '{}'",
                            inner, path
                        ))
                    })?;
                    steps.push(Step::Index(index));
                }
                i = close + 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                if name == "*" {
                    steps.push(Step::Wildcard);
                } else {
                    steps.push(Step::Member(name));
                }
            }
        }
    }
    Ok(steps)
}

/// Every value addressed by `path`
pub fn select<'v>(value: &'v Value, path: &str) -> Result<Vec<&'v Value>> {
    let mut current = vec![value];
    for step in parse(path)? {
        let mut next = Vec::new();
        for node in current {
            match (&step, node) {
                (Step::Member(name), Value::Object(map)) => next.extend(map.get(name)),
                (Step::Index(index), Value::Array(items)) => next.extend(items.get(*index)),
                (Step::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                (Step::Wildcard, Value::Object(map)) => next.extend(map.values()),
                _ => {}
            }
        }
        current = next;
    }
    Ok(current)
}

/// First value addressed by `path`
pub fn select_one<'v>(value: &'v Value, path: &str) -> Result<Option<&'v Value>> {
    Ok(select(value, path)?.into_iter().next())
}

/// Render a selected scalar as token text; `null` and absent are empty
pub fn scalar_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
