//! Provider document loading for SQL-augmented OpenAPI
//!
//! This crate reads the three document kinds a provider is made of and
//! turns them into an immutable entity model:
//!
//! - **provider**: names the provider and lists its provider services
//! - **service**: an OpenAPI 3 document whose `components` carry the
//!   `x-stackQL-resources` map of resources and methods
//! - **resources**: a shallow resource map pointing at the service
//!   document(s) its methods resolve against
//!
//! Each method binds one OpenAPI operation to a SQL verb (`select`,
//! `insert`, `delete`, `update`, `exec`). [`Resource::select_method`]
//! picks the method for a verb given the parameters a query supplied.
//!
//! ## Example
//!
//! ```no_run
//! use stackql_provider_parser::Loader;
//!
//! let service = Loader::new().load_service_from_file("okta/v1/services/application.yaml")?;
//! println!("successfully parsed svc = '{}'", service.name);
//! # Ok::<(), stackql_provider_common::ProviderError>(())
//! ```

mod loader;
pub mod model;
pub mod openapi;
mod registry;
mod suffix_map;

pub use loader::{decode_pointer_segment, parse_document, Loader};
pub use model::{
    ExpectedRequest, ExpectedResponse, Method, MethodContext, Parameter, Provider,
    ProviderService, Resource, ResourceRegister, Schema, Service, ServiceSource,
};
pub use registry::{DocSource, FileSystemSource, Registry, PROVIDER_DOC_FILE};
pub use suffix_map::SuffixMap;

use stackql_provider_common::Result;
use std::path::Path;

/// Load a service document from disk
pub fn load_service_from_file<P: AsRef<Path>>(path: P) -> Result<Service> {
    Loader::new().load_service_from_file(path)
}
