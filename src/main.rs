//! `abathur` CLI entry point: wires configuration, logging, persistence,
//! and the service layer together, then dispatches one subcommand.

use abathur::cli::{commands, Cli, Commands};
use abathur::domain::models::{AdapterDescriptor, Capability, CostModel, ExecutionModel, PolicyProfile};
use abathur::domain::models::Phase;
use abathur::domain::ports::AuditStore;
use abathur::infrastructure::config::ConfigLoader;
use abathur::infrastructure::database::{connect, SqliteAuditStore};
use abathur::infrastructure::logging;
use abathur::services::acceptance_predicates::{CommandPredicate, PredicateRegistry};
use abathur::services::agent_adapter::mock::MockAdapter;
use abathur::services::agent_adapter::AdapterRegistry;
use abathur::services::circuit_breaker::CircuitBreaker;
use abathur::services::overlay_broker::OverlayBroker;
use abathur::services::patch_applier::PatchApplier;
use abathur::services::policy_guard::PolicyGuard;
use abathur::services::sandbox_runner::SandboxRunner;
use abathur::services::scheduler::Scheduler;
use abathur::services::task_state_machine::{RoutingTable, TaskStateMachine};
use abathur::services::workspace::WorkspaceAllocator;
use anyhow::Context;
use clap::Parser;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logging_guard = logging::init(&config.logging);

    let pool = connect(&config.database_path).await.context("failed to connect to the audit database")?;
    let audit: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::new(pool));

    let policy = Arc::new(PolicyGuard::new(audit.clone()));
    let overlay = Arc::new(OverlayBroker::with_audit(audit.clone()));
    let sandbox = Arc::new(SandboxRunner::new(overlay.clone()));
    let circuit_breaker = Arc::new(CircuitBreaker::new(abathur::services::circuit_breaker::CircuitBreakerConfig::resilient()));

    let mut adapters = AdapterRegistry::new();
    let mock_id = "mock";
    adapters.register(
        AdapterDescriptor {
            id: mock_id.to_string(),
            capabilities: BTreeSet::from([
                Capability::Plan,
                Capability::Propose,
                Capability::Refine,
                Capability::ApplyPatch,
                Capability::RunTests,
                Capability::SummarizeDiff,
                Capability::CommitMessage,
            ]),
            execution_model: ExecutionModel::InProcess,
            default_policy_profile: "default".to_string(),
            cost_model: CostModel { rate_per_input_token: 0.0, rate_per_output_token: 0.0 },
        },
        Arc::new(MockAdapter::new(mock_id)),
    );
    let adapters = Arc::new(adapters);

    let mut profile = PolicyProfile::permissive_default("default");
    profile.write_scope = vec![config.ephemeral_workspace_root.clone()];

    let mut predicates = PredicateRegistry::new();
    predicates.register(Arc::new(CommandPredicate::new(
        "tests_pass",
        vec!["cargo".to_string(), "test".to_string(), "--quiet".to_string()],
        true,
        sandbox.clone(),
        policy.clone(),
        profile.clone(),
    )));
    let predicates = Arc::new(predicates);

    let routing = RoutingTable {
        by_phase: [Phase::Plan, Phase::Code, Phase::Test, Phase::Review, Phase::Commit, Phase::Deploy]
            .into_iter()
            .map(|phase| (phase, mock_id.to_string()))
            .collect(),
    };

    let patch_applier = Arc::new(PatchApplier::new(policy.clone(), sandbox.clone()));

    let fsm = Arc::new(TaskStateMachine::new(
        audit.clone(),
        policy.clone(),
        overlay.clone(),
        adapters.clone(),
        predicates.clone(),
        circuit_breaker.clone(),
        patch_applier,
        routing,
        profile.clone(),
    ));

    let workspace = Arc::new(WorkspaceAllocator::new(
        PathBuf::from(&config.ephemeral_workspace_root),
        chrono::Duration::seconds(config.workspace_grace_seconds),
    ));

    let scheduler = Arc::new(Scheduler::new(audit.clone(), fsm, workspace, config.max_concurrency as usize));

    let mut profiles = HashMap::new();
    profiles.insert(profile.name.clone(), profile);
    let profiles = Arc::new(profiles);

    match cli.command {
        Commands::Submit(args) => {
            let id = commands::submit::run(&scheduler, args).await?;
            println!("submitted task {id}");
        }
        Commands::Cancel(args) => {
            commands::cancel::run(&scheduler, args).await?;
        }
        Commands::Status(args) => {
            commands::status::run(&scheduler, args).await?;
        }
        Commands::List(args) => {
            commands::list::run(&scheduler, args).await?;
        }
        Commands::Overlay(args) => {
            commands::overlay::run(&overlay, args).await?;
        }
        Commands::Adapter(args) => {
            commands::adapter::run(&adapters, args).await?;
        }
        Commands::Policy(args) => {
            commands::policy::run(&profiles, args).await?;
        }
    }

    Ok(())
}
