//! Document sources and lazy service resolution
//!
//! A [`Registry`] fetches provider, service and resources documents from a
//! [`DocSource`] and caches loaded services on their [`ProviderService`].

use crate::loader::Loader;
use crate::model::{Provider, ProviderService, ResourceRegister, Service, ServiceSource};
use stackql_provider_common::{ProviderError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// File name of a provider document inside `<root>/<provider>/<version>/`
pub const PROVIDER_DOC_FILE: &str = "provider.yaml";

/// Where document bytes come from
#[cfg_attr(test, mockall::automock)]
pub trait DocSource {
    /// Bytes of the provider document for `provider` at `version`
    fn provider_doc(&self, provider: &str, version: &str) -> Result<Vec<u8>>;

    /// Bytes of a service (OpenAPI) document named by a `$ref`
    fn service_doc(&self, doc_ref: &str) -> Result<Vec<u8>>;

    /// Bytes of a shallow resources document named by a `$ref`
    fn resources_doc(&self, doc_ref: &str) -> Result<Vec<u8>>;
}

/// Documents laid out on disk as `<root>/<provider>/<version>/provider.yaml`,
/// with every `$ref` resolved relative to `root`
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: PathBuf) -> Result<Vec<u8>> {
        debug!(path = %path.display(), "reading document");
        Ok(fs::read(&path)?)
    }
}

impl DocSource for FileSystemSource {
    fn provider_doc(&self, provider: &str, version: &str) -> Result<Vec<u8>> {
        self.read(self.root.join(provider).join(version).join(PROVIDER_DOC_FILE))
    }

    fn service_doc(&self, doc_ref: &str) -> Result<Vec<u8>> {
        self.read(self.root.join(doc_ref.trim_start_matches('/')))
    }

    fn resources_doc(&self, doc_ref: &str) -> Result<Vec<u8>> {
        self.read(self.root.join(doc_ref.trim_start_matches('/')))
    }
}

pub struct Registry<S: DocSource> {
    source: S,
}

impl<S: DocSource> Registry<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn load_provider(&self, provider: &str, version: &str) -> Result<Provider> {
        let bytes = self.source.provider_doc(provider, version)?;
        let provider = Loader::new().load_provider(&bytes)?;
        info!(provider = %provider.name, version, "loaded provider document");
        Ok(provider)
    }

    /// Service behind `provider_service`, loaded on first call
    pub fn service(&self, provider_service: &ProviderService) -> Result<Arc<Service>> {
        provider_service.service_or_load(|ps| match ps.source()? {
            ServiceSource::Service(doc_ref) => {
                debug!(service = %ps.name, doc_ref, "loading service document");
                Loader::new().load_service(&self.source.service_doc(doc_ref)?)
            }
            ServiceSource::Resources(_) => {
                let register = self.resource_register(ps)?;
                self.load_from_register(&ps.name, &register)
            }
        })
    }

    /// Look up a provider service by name and return its loaded service
    pub fn service_by_name(&self, provider: &Provider, name: &str) -> Result<Arc<Service>> {
        self.service(provider.preferred_service(name)?)
    }

    /// Shallow resources document of `provider_service`, loaded on first call
    pub fn resource_register(
        &self,
        provider_service: &ProviderService,
    ) -> Result<Arc<ResourceRegister>> {
        provider_service.register_or_load(|ps| match ps.source()? {
            ServiceSource::Resources(doc_ref) => {
                debug!(service = %ps.name, doc_ref, "loading resources document");
                Loader::new().load_resource_register(&self.source.resources_doc(doc_ref)?)
            }
            ServiceSource::Service(_) => Err(ProviderError::Document(format!(
                "provider service '{}' has no resources document",
                ps.name
            ))),
        })
    }

    /// Load every service document the register points at and merge their
    /// resources into one service
    fn load_from_register(&self, name: &str, register: &ResourceRegister) -> Result<Service> {
        let mut by_doc: BTreeMap<String, ResourceRegister> = BTreeMap::new();
        for (resource_name, resource_doc) in &register.resources {
            let doc_ref = register.service_doc_for(resource_name).ok_or_else(|| {
                ProviderError::Document(format!(
                    "resource '{}' of service '{}' names no service document",
                    resource_name, name
                ))
            })?;
            by_doc
                .entry(doc_ref.ref_path.clone())
                .or_default()
                .resources
                .insert(resource_name.clone(), resource_doc.clone());
        }

        let mut merged: Option<Service> = None;
        for (doc_ref, subset) in by_doc {
            debug!(
                service = %name,
                doc_ref = %doc_ref,
                resources = subset.resources.len(),
                "loading service document"
            );
            let bytes = self.source.service_doc(&doc_ref)?;
            let service = Loader::new().load_service_with_register(&bytes, &subset)?;
            match merged.as_mut() {
                Some(base) => base.resources.extend(service.resources),
                None => merged = Some(service),
            }
        }
        merged.ok_or_else(|| {
            ProviderError::Document(format!("resources document of '{}' lists no resources", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use stackql_provider_common::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    const PROVIDER: &str = r#"
id: okta
name: okta
version: v1
providerServices:
  application:
    id: application:v1
    name: application
    preferred: true
    service:
      $ref: okta/v1/services/application.yaml
"#;

    const SERVICE: &str = r##"
openapi: 3.0.0
info:
  title: Application API
  version: 1.0.0
  x-serviceName: application
paths:
  /api/v1/apps:
    get:
      operationId: listApplications
      responses:
        200:
          description: ok
          content:
            application/json:
              schema:
                type: array
                items:
                  type: object
components:
  x-stackQL-resources:
    apps:
      id: okta.application.apps
      name: apps
      methods:
        list:
          operation:
            $ref: '#/paths/~1api~1v1~1apps/get'
      sqlVerbs:
        select:
          - $ref: '#/components/x-stackQL-resources/apps/methods/list'
"##;

    #[test]
    fn test_service_loaded_once() {
        let mut source = MockDocSource::new();
        source
            .expect_provider_doc()
            .with(eq("okta"), eq("v1"))
            .times(1)
            .returning(|_, _| Ok(PROVIDER.as_bytes().to_vec()));
        source
            .expect_service_doc()
            .with(eq("okta/v1/services/application.yaml"))
            .times(1)
            .returning(|_| Ok(SERVICE.as_bytes().to_vec()));

        let registry = Registry::new(source);
        let provider = registry.load_provider("okta", "v1").unwrap();
        let first = registry.service_by_name(&provider, "application").unwrap();
        let second = registry.service_by_name(&provider, "application").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name, "application");
    }

    #[test]
    fn test_service_doc_ref_has_no_register() {
        let mut source = MockDocSource::new();
        source
            .expect_provider_doc()
            .returning(|_, _| Ok(PROVIDER.as_bytes().to_vec()));
        let registry = Registry::new(source);
        let provider = registry.load_provider("okta", "v1").unwrap();
        let ps = provider.provider_service("application").unwrap();
        assert!(matches!(
            registry.resource_register(ps),
            Err(ProviderError::Document(_))
        ));
    }

    #[test]
    fn test_file_system_source_layout() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("okta").join("v1");
        fs::create_dir_all(dir.join("services")).unwrap();
        fs::write(dir.join(PROVIDER_DOC_FILE), PROVIDER).unwrap();
        fs::write(dir.join("services").join("application.yaml"), SERVICE).unwrap();

        let registry = Registry::new(FileSystemSource::new(temp.path()));
        let provider = registry.load_provider("okta", "v1").unwrap();
        let service = registry.service_by_name(&provider, "application").unwrap();
        let apps = service.resource("apps").unwrap();
        assert_eq!(apps.id, "okta.application.apps");
        assert!(apps.method("list").is_some());
    }

    #[test]
    fn test_missing_document_is_io_error() {
        let source = FileSystemSource::new("/nonexistent-root");
        let err = source.provider_doc("okta", "v1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(matches!(err, ProviderError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }
}
