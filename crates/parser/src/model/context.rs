//! Ancestor lookups for a method
//!
//! Methods do not point at their parents. A [`MethodContext`] borrows the
//! chain Method → Resource → Service → ProviderService → Provider for the
//! duration of an operation and answers configuration questions by walking
//! it, most specific first.

use super::method::Method;
use super::provider::{Provider, ProviderService};
use super::resource::Resource;
use super::service::Service;
use stackql_provider_common::{
    AuthDto, Config, SqlExternalTable, TokenSemantic, Variations, View,
};

/// Provider name that suppresses the `Accept` header
pub const AWS_PROVIDER: &str = "aws";

#[derive(Debug, Clone, Copy)]
pub struct MethodContext<'a> {
    pub provider: Option<&'a Provider>,
    pub provider_service: Option<&'a ProviderService>,
    pub service: &'a Service,
    pub resource: &'a Resource,
    pub method: &'a Method,
}

impl<'a> MethodContext<'a> {
    /// Context for a service loaded without a provider document
    pub fn new(service: &'a Service, resource: &'a Resource, method: &'a Method) -> Self {
        Self {
            provider: None,
            provider_service: None,
            service,
            resource,
            method,
        }
    }

    pub fn with_provider(
        mut self,
        provider: &'a Provider,
        provider_service: &'a ProviderService,
    ) -> Self {
        self.provider = Some(provider);
        self.provider_service = Some(provider_service);
        self
    }

    /// Configs from the method up to the provider
    pub fn configs(&self) -> impl Iterator<Item = &'a Config> {
        [
            self.method.config.as_ref(),
            self.resource.config.as_ref(),
            self.service.config.as_ref(),
            self.provider_service.and_then(|ps| ps.config.as_ref()),
            self.provider.and_then(|p| p.config.as_ref()),
        ]
        .into_iter()
        .flatten()
    }

    fn first<T: 'a>(&self, pick: impl Fn(&'a Config) -> Option<T>) -> Option<T> {
        self.configs().find_map(pick)
    }

    pub fn query_transpose_algorithm(&self) -> Option<&'a str> {
        self.first(Config::query_transpose_algorithm)
    }

    pub fn request_translate_algorithm(&self) -> Option<&'a str> {
        self.first(Config::request_translate_algorithm)
    }

    pub fn request_token(&self) -> Option<&'a TokenSemantic> {
        self.first(Config::request_token)
    }

    pub fn response_token(&self) -> Option<&'a TokenSemantic> {
        self.first(Config::response_token)
    }

    pub fn auth(&self) -> Option<&'a AuthDto> {
        self.first(|c| c.auth.as_ref())
    }

    pub fn variations(&self) -> Option<&'a Variations> {
        self.first(|c| c.variations.as_ref())
    }

    pub fn view(&self, name: &str) -> Option<&'a View> {
        self.first(|c| c.view(name))
    }

    pub fn sql_external_table(&self, name: &str) -> Option<&'a SqlExternalTable> {
        self.first(|c| c.sql_external_table(name))
    }

    /// Provider name, falling back to the service's `x-stackql-provider` tag
    pub fn provider_name(&self) -> &'a str {
        if let Some(provider) = self.provider {
            return &provider.name;
        }
        if let Some(ps) = self.provider_service {
            return &ps.provider_name;
        }
        self.service.provider_tag.as_deref().unwrap_or("")
    }

    pub fn is_aws(&self) -> bool {
        self.provider_name().eq_ignore_ascii_case(AWS_PROVIDER)
    }
}
