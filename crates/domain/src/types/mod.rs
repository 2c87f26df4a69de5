//! Domain types and models

pub mod pagination;
pub mod response;
pub mod route;

pub use pagination::{compute_windows, PaginationPlan, PaginationWindow};
pub use response::MergedResponse;
pub use route::{
    HttpVerb, ParameterLocation, ParameterSchema, ParameterSpec, RouteDescriptor, SchemaType,
    VerbFilter,
};
