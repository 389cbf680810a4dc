//! Resources: named bundles of methods

use super::method::Method;
use crate::openapi::DocRef;
use stackql_provider_common::{Config, ParamMap, ProviderError, Result, SqlVerb};
use std::collections::BTreeMap;
use tracing::debug;

/// Default method selection algorithm
pub const STANDARD_SELECTOR: &str = "standard";

#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub selector_algorithm: String,
    pub(crate) methods: BTreeMap<String, Method>,
    pub(crate) sql_verbs: BTreeMap<SqlVerb, Vec<String>>,
    pub config: Option<Config>,
    pub service_doc: Option<DocRef>,
}

impl Resource {
    pub fn methods(&self) -> BTreeMap<String, Method> {
        self.methods.clone()
    }

    pub fn method(&self, key: &str) -> Option<&Method> {
        self.methods.get(key)
    }

    /// Declared method keys per verb
    pub fn sql_verbs(&self) -> BTreeMap<SqlVerb, Vec<String>> {
        self.sql_verbs.clone()
    }

    /// Candidate methods for `verb`, in declared order.
    ///
    /// When the resource declares none, the verb's default method keys are
    /// tried in their conventional order.
    pub fn candidate_methods(&self, verb: SqlVerb) -> Vec<&Method> {
        match self.sql_verbs.get(&verb).filter(|keys| !keys.is_empty()) {
            Some(keys) => keys.iter().filter_map(|k| self.methods.get(k)).collect(),
            None => verb
                .default_method_keys()
                .iter()
                .filter_map(|k| self.methods.get(*k))
                .collect(),
        }
    }

    /// First candidate method for `verb`
    pub fn find_method(&self, verb: SqlVerb) -> Option<&Method> {
        self.candidate_methods(verb).into_iter().next()
    }

    /// Choose the method for `verb` whose required parameters are all
    /// present in `params`; the first match wins.
    ///
    /// Returns the method and the user parameters it did not consume.
    pub fn select_method(&self, verb: SqlVerb, params: &ParamMap) -> Result<(&Method, ParamMap)> {
        if self.selector_algorithm != STANDARD_SELECTOR {
            debug!(
                resource = %self.name,
                algorithm = %self.selector_algorithm,
                "unknown selector algorithm, using standard"
            );
        }
        let candidates = self.candidate_methods(verb);
        for method in candidates.iter().copied() {
            if let Some(unmatched) = method.parameter_match(params)? {
                debug!(resource = %self.name, method = %method.key, %verb, "selected method");
                return Ok((method, unmatched));
            }
        }

        let tried: Vec<String> = candidates
            .iter()
            .map(|m| {
                let required: Vec<String> =
                    m.required_parameters().into_iter().map(|p| p.name).collect();
                format!("{} [{}]", m.key, required.join(", "))
            })
            .collect();
        Err(ProviderError::Parameter(format!(
            "no method on resource '{}' matches {} with parameters [{}]; candidates: {}",
            self.name,
            verb,
            params.keys().cloned().collect::<Vec<_>>().join(", "),
            if tried.is_empty() {
                "none".to_string()
            } else {
                tried.join("; ")
            }
        )))
    }

    /// All methods, grouped by verb bucket (select, insert, delete, update,
    /// exec) and sorted by key within each bucket
    pub fn ordered_methods(&self) -> Vec<&Method> {
        let mut out = Vec::with_capacity(self.methods.len());
        for verb in SqlVerb::ORDERED {
            let mut bucket: Vec<&Method> =
                self.methods.values().filter(|m| m.sql_verb == verb).collect();
            bucket.sort_by(|a, b| a.key.cmp(&b.key));
            out.extend(bucket);
        }
        out
    }
}
