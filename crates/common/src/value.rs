//! User-supplied parameter values
//!
//! Values arrive as strings, numbers, lists or one of two SQL function
//! forms, `JSON(<literal>)` and `STRING(<literal>)`. Only those two forms are
//! recognised; everything else is left to the caller's SQL layer.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Parameter map keyed by column name
pub type ParamMap = BTreeMap<String, ParamValue>;

/// SQL function forms understood in user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFunctionKind {
    Json,
    String,
}

/// A recognised `JSON(...)` or `STRING(...)` call with its literal argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFunction {
    pub kind: SqlFunctionKind,
    pub literal: String,
}

fn sql_function_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^\s*(JSON|STRING)\s*\((.*)\)\s*$").expect("static regex is valid")
    })
}

impl SqlFunction {
    pub fn json(literal: &str) -> Self {
        Self {
            kind: SqlFunctionKind::Json,
            literal: literal.to_string(),
        }
    }

    /// Recognise `JSON(<literal>)` or `STRING(<literal>)`
    ///
    /// A single-quoted SQL string literal is unquoted (`''` becomes `'`);
    /// anything else is taken verbatim.
    pub fn parse(input: &str) -> Option<Self> {
        let caps = sql_function_regex().captures(input)?;
        let kind = if caps[1].eq_ignore_ascii_case("json") {
            SqlFunctionKind::Json
        } else {
            SqlFunctionKind::String
        };
        let raw = caps[2].trim();
        let literal = match raw
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            Some(quoted) => quoted.replace("''", "'"),
            None => raw.to_string(),
        };
        Some(Self { kind, literal })
    }
}

/// A single heterogeneous parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
    Object(BTreeMap<String, ParamValue>),
    Function(SqlFunction),
}

impl ParamValue {
    /// Interpret raw user text, recognising the SQL function forms
    pub fn parse_user_input(input: &str) -> Self {
        match SqlFunction::parse(input) {
            Some(function) => ParamValue::Function(function),
            None => ParamValue::String(input.to_string()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ParamValue::List(_))
    }

    pub fn as_json_function(&self) -> Option<&str> {
        match self {
            ParamValue::Function(SqlFunction {
                kind: SqlFunctionKind::Json,
                literal,
            }) => Some(literal),
            _ => None,
        }
    }

    /// Render for a query string, header or path segment
    pub fn to_query_value(&self) -> String {
        match self {
            ParamValue::Null => String::new(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Integer(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::String(s) => s.clone(),
            ParamValue::Function(f) => f.literal.clone(),
            ParamValue::List(_) | ParamValue::Object(_) => self.to_json().to_string(),
        }
    }

    /// Convert to a JSON value for request bodies.
    ///
    /// `JSON(...)` literals are parsed; an unparsable literal stays a string.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Integer(i) => Value::from(*i),
            ParamValue::Float(f) => Value::from(*f),
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            ParamValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            ParamValue::Function(SqlFunction {
                kind: SqlFunctionKind::Json,
                literal,
            }) => serde_json::from_str(literal).unwrap_or_else(|_| Value::String(literal.clone())),
            ParamValue::Function(SqlFunction {
                kind: SqlFunctionKind::String,
                literal,
            }) => Value::String(literal.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_value())
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Integer(i),
                None => ParamValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => ParamValue::parse_user_input(&s),
            Value::Array(items) => ParamValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                ParamValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::parse_user_input(value)
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::parse_user_input(&value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(value: Vec<T>) -> Self {
        ParamValue::List(value.into_iter().map(Into::into).collect())
    }
}
