//! Request dispatch: pagination fan-out, bounded concurrency and merging.

mod dispatcher;
pub mod merge;
pub mod ports;

pub use dispatcher::{DispatchHandle, DispatchRequest, RequestDispatcher};
pub use merge::MergePolicy;
pub use ports::ResourceTransport;
