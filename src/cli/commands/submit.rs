use crate::domain::models::{RepoRef, TaskMode};
use crate::services::scheduler::{Scheduler, TaskSpec};
use clap::Args;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub goal: String,
    #[arg(long)]
    pub repo_url: String,
    #[arg(long, default_value = "main")]
    pub branch: String,
    #[arg(long)]
    pub commit_sha: String,
    #[arg(long, value_enum, default_value = "bugfix")]
    pub mode: CliTaskMode,
    #[arg(long = "acceptance", value_delimiter = ',')]
    pub acceptance_criteria: Vec<String>,
    #[arg(long, default_value = "default")]
    pub policy_profile: String,
    #[arg(long, default_value_t = 3)]
    pub max_iterations: u32,
    #[arg(long, default_value_t = 1.0)]
    pub cost_usd: f64,
    #[arg(long, default_value_t = 300)]
    pub wall_time_seconds: i64,
    #[arg(long, default_value_t = false)]
    pub deploy: bool,
    #[arg(long, default_value_t = 0)]
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliTaskMode {
    Refactor,
    NewFeature,
    Bugfix,
    AppGeneration,
}

impl From<CliTaskMode> for TaskMode {
    fn from(mode: CliTaskMode) -> Self {
        match mode {
            CliTaskMode::Refactor => TaskMode::Refactor,
            CliTaskMode::NewFeature => TaskMode::NewFeature,
            CliTaskMode::Bugfix => TaskMode::Bugfix,
            CliTaskMode::AppGeneration => TaskMode::AppGeneration,
        }
    }
}

pub async fn run(scheduler: &Arc<Scheduler>, args: SubmitArgs) -> anyhow::Result<String> {
    let spec = TaskSpec {
        id: None,
        goal: args.goal,
        repo: RepoRef { url: args.repo_url, branch: args.branch, commit_sha: args.commit_sha },
        mode: args.mode.into(),
        acceptance_criteria: args.acceptance_criteria,
        policy_profile: args.policy_profile,
        budgets: crate::domain::models::Budgets {
            max_iterations: args.max_iterations,
            cost_usd: args.cost_usd,
            wall_time: chrono::Duration::seconds(args.wall_time_seconds),
        },
        deploy: args.deploy,
        priority: args.priority,
    };
    let id = scheduler.submit(spec).await?;
    Ok(id)
}
