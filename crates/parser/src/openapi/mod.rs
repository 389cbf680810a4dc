//! OpenAPI 3.0 adapter
//!
//! Typed views over the OpenAPI documents and the SQL extensions layered on
//! top of them. Only the subset the operation model needs is represented.
//!
//! ## Document shapes
//! - **Provider document**: `providerServices` pointing at service or
//!   resources documents
//! - **Service document**: an OpenAPI 3 document whose
//!   `components.x-stackQL-resources` lists the resources
//! - **Resources document**: a shallow `resources` map plus a `serviceDoc`
//!   pointer to the OpenAPI document it resolves against

mod extensions;
mod types;

pub use extensions::*;
pub use types::*;
