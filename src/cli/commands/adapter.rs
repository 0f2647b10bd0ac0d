use crate::services::agent_adapter::AdapterRegistry;
use clap::{Args, Subcommand};
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct AdapterArgs {
    #[command(subcommand)]
    pub action: AdapterAction,
}

#[derive(Debug, Subcommand)]
pub enum AdapterAction {
    /// List registered adapters and their capabilities.
    List,
}

pub async fn run(registry: &Arc<AdapterRegistry>, args: AdapterArgs) -> anyhow::Result<()> {
    match args.action {
        AdapterAction::List => {
            println!("{}", crate::cli::display::table::render_adapter_list(registry));
        }
    }
    Ok(())
}
