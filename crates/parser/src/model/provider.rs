//! Providers and their lazily loaded services

use super::service::{ResourceRegister, Service};
use crate::openapi::DocRef;
use stackql_provider_common::{Config, ProviderError, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Top of the document hierarchy
#[derive(Debug, Clone)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub(crate) provider_services: BTreeMap<String, ProviderService>,
    pub config: Option<Config>,
}

impl Provider {
    pub fn provider_services(&self) -> BTreeMap<String, ProviderService> {
        self.provider_services.clone()
    }

    pub fn provider_service(&self, name: &str) -> Result<&ProviderService> {
        self.provider_services.get(name).ok_or_else(|| {
            ProviderError::Document(format!(
                "service '{}' not found in provider '{}'",
                name, self.name
            ))
        })
    }

    /// Provider services with `name`: the preferred one if flagged, else the
    /// only one keyed by that name
    pub fn preferred_service(&self, name: &str) -> Result<&ProviderService> {
        self.provider_services
            .values()
            .find(|ps| ps.name == name && ps.preferred)
            .map(Ok)
            .unwrap_or_else(|| self.provider_service(name))
    }
}

/// One API surface of a provider. The service behind it is loaded on first
/// access and kept for the life of the value.
#[derive(Debug, Clone)]
pub struct ProviderService {
    pub id: String,
    pub name: String,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub preferred: bool,
    pub service_ref: Option<DocRef>,
    pub resources_ref: Option<DocRef>,
    pub config: Option<Config>,
    /// Name of the owning provider
    pub provider_name: String,
    pub(crate) service: OnceLock<Arc<Service>>,
    pub(crate) register: OnceLock<Arc<ResourceRegister>>,
}

/// Which document a provider service resolves through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSource<'a> {
    /// Shallow resources document pointing at the service document
    Resources(&'a str),
    /// Service document carrying its own `x-stackQL-resources`
    Service(&'a str),
}

impl ProviderService {
    /// Resources document first, then service document; at least one must
    /// be set.
    pub fn source(&self) -> Result<ServiceSource<'_>> {
        if let Some(r) = self.resources_ref.as_ref().filter(|r| !r.is_empty()) {
            return Ok(ServiceSource::Resources(&r.ref_path));
        }
        if let Some(r) = self.service_ref.as_ref().filter(|r| !r.is_empty()) {
            return Ok(ServiceSource::Service(&r.ref_path));
        }
        Err(ProviderError::Document(format!(
            "provider service '{}' has neither a service nor a resources reference",
            self.name
        )))
    }

    /// Already-loaded service, if any
    pub fn loaded_service(&self) -> Option<Arc<Service>> {
        self.service.get().cloned()
    }

    /// Return the cached service, or load it with `load` and cache it.
    ///
    /// `load` runs at most once per provider service unless it fails.
    pub fn service_or_load<F>(&self, load: F) -> Result<Arc<Service>>
    where
        F: FnOnce(&ProviderService) -> Result<Service>,
    {
        if let Some(service) = self.service.get() {
            return Ok(Arc::clone(service));
        }
        let loaded = Arc::new(load(self)?);
        Ok(Arc::clone(self.service.get_or_init(|| loaded)))
    }

    pub fn register_or_load<F>(&self, load: F) -> Result<Arc<ResourceRegister>>
    where
        F: FnOnce(&ProviderService) -> Result<ResourceRegister>,
    {
        if let Some(register) = self.register.get() {
            return Ok(Arc::clone(register));
        }
        let loaded = Arc::new(load(self)?);
        Ok(Arc::clone(self.register.get_or_init(|| loaded)))
    }
}
