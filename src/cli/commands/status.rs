use crate::services::scheduler::Scheduler;
use clap::Args;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct StatusArgs {
    pub task_id: String,
}

pub async fn run(scheduler: &Arc<Scheduler>, args: StatusArgs) -> anyhow::Result<()> {
    match scheduler.get_status(&args.task_id).await {
        Some(task) => {
            println!("{}", crate::cli::display::table::render_task_status(&task));
            Ok(())
        }
        None => anyhow::bail!("no such task: {}", args.task_id),
    }
}
