//! Services: one augmented OpenAPI document each

use super::resource::Resource;
use crate::openapi::{Components, DocRef, OpenApiDoc, PathItem, ResourceDoc, Server};
use stackql_provider_common::{Config, ProviderError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Service {
    /// `info.x-serviceName`, else `info.title`
    pub name: String,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    /// `x-stackql-provider` tag, informational
    pub provider_tag: Option<String>,
    pub(crate) doc: Arc<OpenApiDoc>,
    pub(crate) components: Arc<Components>,
    pub(crate) resources: BTreeMap<String, Resource>,
    pub config: Option<Config>,
}

impl Service {
    pub fn resources(&self) -> BTreeMap<String, Resource> {
        self.resources.clone()
    }

    pub fn resource(&self, name: &str) -> Result<&Resource> {
        self.resources.get(name).ok_or_else(|| {
            ProviderError::Document(format!(
                "resource '{}' not found in service '{}'",
                name, self.name
            ))
        })
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn servers(&self) -> &[Server] {
        &self.doc.servers
    }

    pub fn path_item(&self, path: &str) -> Option<&PathItem> {
        self.doc.paths.get(path)
    }

    pub fn paths(&self) -> Vec<String> {
        self.doc.paths.keys().cloned().collect()
    }

    pub fn components(&self) -> &Arc<Components> {
        &self.components
    }

    pub fn document(&self) -> &OpenApiDoc {
        &self.doc
    }
}

/// Shallow resources document, kept unresolved until its service document
/// is loaded
#[derive(Debug, Clone, Default)]
pub struct ResourceRegister {
    pub resources: BTreeMap<String, ResourceDoc>,
    pub service_doc: Option<DocRef>,
}

impl ResourceRegister {
    pub fn resource(&self, name: &str) -> Option<&ResourceDoc> {
        self.resources.get(name)
    }

    /// Service document a resource resolves against: its own `serviceDoc`,
    /// else the register's
    pub fn service_doc_for(&self, resource: &str) -> Option<&DocRef> {
        self.resources
            .get(resource)
            .and_then(|r| r.service_doc.as_ref())
            .filter(|r| !r.is_empty())
            .or_else(|| self.service_doc.as_ref().filter(|r| !r.is_empty()))
    }
}
