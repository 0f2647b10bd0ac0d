use crate::domain::models::TaskStatus;
use crate::services::scheduler::{Scheduler, TaskFilter};
use clap::Args;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub status: Option<String>,
}

pub async fn run(scheduler: &Arc<Scheduler>, args: ListArgs) -> anyhow::Result<()> {
    let status = args
        .status
        .map(|s| parse_status(&s))
        .transpose()?;
    let tasks = scheduler.list_tasks(&TaskFilter { status }).await;
    println!("{}", crate::cli::display::table::render_task_list(&tasks));
    Ok(())
}

fn parse_status(s: &str) -> anyhow::Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "planning" => Ok(TaskStatus::Planning),
        "coding" => Ok(TaskStatus::Coding),
        "testing" => Ok(TaskStatus::Testing),
        "reviewing" => Ok(TaskStatus::Reviewing),
        "commit_pending" => Ok(TaskStatus::CommitPending),
        "deploying" => Ok(TaskStatus::Deploying),
        "succeeded" => Ok(TaskStatus::Succeeded),
        "failed" => Ok(TaskStatus::Failed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        "suspended" => Ok(TaskStatus::Suspended),
        other => anyhow::bail!("unrecognized status: {other}"),
    }
}
