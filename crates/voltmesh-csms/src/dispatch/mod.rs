//! Action dispatch.

pub mod registry;

pub use registry::{ActionRegistry, CallHandler};
