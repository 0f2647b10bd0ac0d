use crate::services::scheduler::Scheduler;
use clap::Args;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct CancelArgs {
    pub task_id: String,
    #[arg(long, default_value = "operator_cancel")]
    pub reason: String,
}

pub async fn run(scheduler: &Arc<Scheduler>, args: CancelArgs) -> anyhow::Result<()> {
    scheduler.cancel(&args.task_id, &args.reason).await?;
    Ok(())
}
