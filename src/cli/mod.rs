//! Clap-derived command surface over the `Scheduler`: submit, cancel,
//! status, list, overlay tailing, adapter listing, and policy display.

pub mod commands;
pub mod display;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "abathur", version, about = "Multi-agent coding task orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a new task.
    Submit(commands::submit::SubmitArgs),
    /// Cancel a running or queued task.
    Cancel(commands::cancel::CancelArgs),
    /// Show the current status of one task.
    Status(commands::status::StatusArgs),
    /// List tasks, optionally filtered by status.
    List(commands::list::ListArgs),
    /// Tail or replay a task's overlay stream.
    Overlay(commands::overlay::OverlayArgs),
    /// Adapter registry operations.
    Adapter(commands::adapter::AdapterArgs),
    /// Show a policy profile.
    Policy(commands::policy::PolicyArgs),
}
