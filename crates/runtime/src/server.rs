//! Server URL templating and parameterized path routing
//!
//! Templates contain `{name}` or `{name:regex}` placeholders. The regex, when
//! given, validates values on substitution and drives matching when a
//! concrete path is routed back to its variables.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use stackql_provider_common::{ParamLocation, ProviderError, Result};
use stackql_provider_parser::openapi::Server;
use std::collections::BTreeMap;
use tracing::debug;

/// Characters escaped inside a single path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Variable { name: String, pattern: Option<Regex> },
}

#[derive(Debug, Clone)]
pub struct ParameterizedUrl {
    template: String,
    segments: Vec<Segment>,
}

impl ParameterizedUrl {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            // regexes may contain balanced braces, e.g. {id:[0-9]{3}}
            let mut depth = 0usize;
            let mut close = None;
            for (i, c) in rest[open..].char_indices() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            close = Some(open + i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let close = close.ok_or_else(|| {
                ProviderError::Document(format!("unbalanced '{{' in template '{}'", template))
            })?;
            let inner = &rest[open + 1..close];
            let (name, pattern) = match inner.split_once(':') {
                Some((name, pattern)) => {
                    let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                        ProviderError::Document(format!(
                            "invalid pattern for '{}' in template '{}': {}",
                            name, template, e
                        ))
                    })?;
                    (name.trim(), Some(regex))
                }
                None => (inner.trim(), None),
            };
            if name.is_empty() {
                return Err(ProviderError::Document(format!(
                    "empty variable name in template '{}'",
                    template
                )));
            }
            segments.push(Segment::Variable {
                name: name.to_string(),
                pattern,
            });
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn variables(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Variable { name, .. } => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute every variable with `lookup(name)`. Values are checked
    /// against their pattern and, with `encode`, escaped as path segments.
    pub fn render<F>(&self, mut lookup: F, encode: bool) -> Result<String>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable { name, pattern } => {
                    let value = lookup(name)?;
                    if let Some(regex) = pattern {
                        if !regex.is_match(&value) {
                            return Err(ProviderError::Parameter(format!(
                                "value '{}' for '{}' does not match pattern '{}'",
                                value,
                                name,
                                regex.as_str()
                            )));
                        }
                    }
                    if encode {
                        out.extend(utf8_percent_encode(&value, PATH_SEGMENT));
                    } else {
                        out.push_str(&value);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Render with path parameters; a missing value is a missing required
    /// path parameter
    pub fn render_path(&self, values: &BTreeMap<String, String>) -> Result<String> {
        self.render(
            |name| {
                values
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ProviderError::missing(name, ParamLocation::Path))
            },
            true,
        )
    }

    fn router(&self) -> Result<Regex> {
        let mut source = String::from("^");
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => source.push_str(&regex::escape(text)),
                Segment::Variable { name, pattern } => {
                    let inner = pattern
                        .as_ref()
                        .map(|r| {
                            r.as_str()
                                .trim_start_matches("^(?:")
                                .trim_end_matches(")$")
                                .to_string()
                        })
                        .unwrap_or_else(|| "[^/]+".to_string());
                    let group = sanitize_group_name(name);
                    source.push_str(&format!("(?P<{}>{})", group, inner));
                }
            }
        }
        source.push('$');
        Regex::new(&source)
            .map_err(|e| ProviderError::Document(format!("invalid route '{}': {}", self.template, e)))
    }

    /// Recover variable values from a concrete path, percent-decoded.
    /// `None` when the path does not match the template.
    pub fn matches(&self, concrete: &str) -> Result<Option<BTreeMap<String, String>>> {
        let router = self.router()?;
        let Some(caps) = router.captures(concrete) else {
            return Ok(None);
        };
        let mut out = BTreeMap::new();
        for name in self.variables() {
            if let Some(m) = caps.name(&sanitize_group_name(name)) {
                let decoded = percent_decode_str(m.as_str()).decode_utf8_lossy();
                out.insert(name.to_string(), decoded.into_owned());
            }
        }
        Ok(Some(out))
    }
}

/// Regex group names only allow word characters
fn sanitize_group_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("v_{}", cleaned)
}

/// Resolve the first server's URL: variables come from `server_params`, else
/// the variable default, else [`ProviderError::MissingServerVariable`]. A
/// trailing `/` is trimmed.
pub fn resolve_server_url(
    servers: &[Server],
    server_params: &BTreeMap<String, String>,
) -> Result<String> {
    let server = servers
        .first()
        .ok_or_else(|| ProviderError::Document("no servers declared".to_string()))?;
    let template = ParameterizedUrl::parse(&server.url)?;
    let url = template.render(
        |name| {
            if let Some(value) = server_params.get(name) {
                return Ok(value.clone());
            }
            server
                .variables
                .get(name)
                .and_then(|v| v.default.clone())
                .ok_or_else(|| ProviderError::MissingServerVariable(name.to_string()))
        },
        false,
    )?;
    debug!(template = %server.url, url = %url, "resolved server url");
    Ok(url.trim_end_matches('/').to_string())
}
