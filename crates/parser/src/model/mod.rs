//! Entity model
//!
//! Provider → ProviderService → Service → Resource → Method, plus the
//! schema and parameter handles methods expose. Everything here is
//! immutable once loaded; ancestor lookups go through [`MethodContext`].

mod context;
mod method;
mod parameter;
mod provider;
mod resource;
mod schema;
mod service;

pub use context::{MethodContext, AWS_PROVIDER};
pub use method::{ExpectedRequest, ExpectedResponse, Method};
pub use parameter::Parameter;
pub use provider::{Provider, ProviderService, ServiceSource};
pub use resource::{Resource, STANDARD_SELECTOR};
pub use schema::Schema;
pub use service::{ResourceRegister, Service};
