//! Domain layer: entities, invariants, and ports. No I/O.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
