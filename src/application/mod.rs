//! Application layer: services and use cases
//!
//! This layer orchestrates the domain procedures; it performs no I/O itself.

pub mod audit;
pub mod error;
pub mod services;

pub use error::{ApplicationError, ApplicationResult};
