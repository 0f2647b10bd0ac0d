//! Infrastructure: config loading, logging, persistence, and process/PTY
//! plumbing. All I/O lives here, behind the domain ports.

pub mod config;
pub mod database;
pub mod logging;
