//! Configuration loading: layered defaults → file → local override → env,
//! via `figment`.

pub mod loader;

pub use loader::{Config, ConfigError, ConfigLoader};
