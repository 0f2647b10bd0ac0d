//! Abathur — a multi-agent coding task orchestrator.
//!
//! Drives external coding agents (CLI tools, HTTP APIs) through a
//! plan → code → test → review → commit → deploy lifecycle inside
//! sandboxed, policy-constrained workspaces, with a durable audit log
//! and a live overlay of agent output.
//!
//! - [`domain`] — entities and ports; no I/O.
//! - [`services`] — the policy guard, overlay broker, sandbox runner,
//!   adapter registry, task state machine, and scheduler.
//! - [`infrastructure`] — config, logging, and SQLite persistence.
//! - [`cli`] — the `abathur` command-line surface.

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
