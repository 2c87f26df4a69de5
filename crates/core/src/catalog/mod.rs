//! Route catalog
//!
//! Parses the API reference document into [`RouteDescriptor`]s and prepares
//! concrete requests from bound arguments.
//!
//! [`RouteDescriptor`]: marketlens_domain::RouteDescriptor

pub mod document;
pub mod invocation;
mod registry;

pub use registry::RouteCatalog;
pub use invocation::{prepare, BoundArguments, ParamValue, PreparedRequest};
