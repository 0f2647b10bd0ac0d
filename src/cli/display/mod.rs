//! Table/tree output helpers for the command handlers.

pub mod table;
pub mod tree;
