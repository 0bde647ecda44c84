use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use uuid::Uuid;

use orca_domain::{
	AgentKind, AgentOutput, GroundingContext, IntentLabel, IntentOutput, PipelineQuery, RankedItem,
	RewriteOutput, Tier,
};

use crate::{
	Decision, FallbackReason, OrcaService, Result, SearchRequest,
	attachments::EnrichmentContext,
	dispatch::{StageCall, StepOutcome},
	prompts,
	request::Request,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
	pub request_id: Uuid,
	#[serde(flatten)]
	pub decision: Decision,
	/// The query the pipeline actually ran, after any rewrite.
	pub query: String,
	pub items: Vec<RankedItem>,
	/// Tier-2 enrichments still running. Poll them by `request_id`.
	pub attachments: Vec<AgentKind>,
}

enum TierOne {
	Ranked { decision: Decision, plan: PipelineQuery },
	Clarify { prompt: String },
}

impl OrcaService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let request = Request::from_search(req, &self.cfg)?;

		tracing::info!(
			request_id = %request.request_id,
			tier = request.tier.as_str(),
			budget_ms = request.remaining().as_millis() as u64,
			"Search admitted."
		);

		let (decision, plan) = match self.run_tier_one(&request).await {
			TierOne::Ranked { decision, plan } => (decision, plan),
			TierOne::Clarify { prompt } => {
				let decision = Decision::AwaitingClarification { prompt };

				self.telemetry.record_request("search", decision.as_str());

				return Ok(SearchResponse {
					request_id: request.request_id,
					decision,
					query: request.query,
					items: Vec::new(),
					attachments: Vec::new(),
				});
			},
		};
		let items = match self.pipeline.search(&plan).await {
			Ok(items) => items,
			Err(err) => {
				self.telemetry.record_pipeline_failure("search");
				self.telemetry.record_request("search", "failed");
				tracing::error!(request_id = %request.request_id, error = %err, "Search pipeline failed.");

				return Err(err);
			},
		};
		let attachments = self.attachments.dispatch(EnrichmentContext {
			request_id: request.request_id,
			query: plan.query.clone(),
			items: items.clone(),
		});

		self.telemetry.record_request("search", decision.as_str());
		tracing::info!(
			request_id = %request.request_id,
			outcome = decision.as_str(),
			reason = decision.fallback_reason().map(FallbackReason::as_str),
			items = items.len(),
			"Search served."
		);

		Ok(SearchResponse {
			request_id: request.request_id,
			decision,
			query: plan.query,
			items,
			attachments,
		})
	}

	async fn run_tier_one(&self, request: &Request) -> TierOne {
		let steps = request.tier.plan();

		if steps.is_empty() {
			return TierOne::Ranked {
				decision: Decision::ServedByFallback { reason: FallbackReason::TierNotRequired },
				plan: deterministic_plan(request),
			};
		}

		let mut all_cached = true;
		let mut intent: Option<IntentOutput> = None;
		let mut rewrite: Option<RewriteOutput> = None;

		for &agent in steps {
			let call = self.tier_one_call(request, agent, intent.as_ref());
			let output = match self.dispatcher.run(call).await {
				StepOutcome::Cached(output) => output,
				StepOutcome::Accepted(output) => {
					all_cached = false;

					output
				},
				StepOutcome::LowConfidence(_) => return self.clarify(request).await,
				StepOutcome::Degraded(reason) =>
					return TierOne::Ranked {
						decision: Decision::ServedByFallback { reason },
						plan: deterministic_plan(request),
					},
			};

			match output {
				AgentOutput::Intent(output) => {
					if output.needs_clarification || output.intent == IntentLabel::Clarify {
						return self.clarify(request).await;
					}

					let question = output.intent == IntentLabel::Question;

					intent = Some(output);

					if question {
						break;
					}
				},
				AgentOutput::Rewrite(output) => rewrite = Some(output),
				other => {
					tracing::warn!(
						agent = other.kind().as_str(),
						"Unexpected stage output in Tier-1 plan."
					);
				},
			}
		}

		let decision = if all_cached { Decision::ServedFromCache } else { Decision::ServedByAgent };

		TierOne::Ranked { decision, plan: agent_plan(request, intent, rewrite) }
	}

	async fn clarify(&self, request: &Request) -> TierOne {
		let call = self.tier_one_call(request, AgentKind::Clarification, None);
		let prompt = match self.dispatcher.run(call).await {
			StepOutcome::Cached(AgentOutput::Clarification(output))
			| StepOutcome::Accepted(AgentOutput::Clarification(output)) => output.question,
			_ => self.cfg.orchestrator.clarification_fallback_prompt.clone(),
		};

		TierOne::Clarify { prompt }
	}

	fn tier_one_call(
		&self,
		request: &Request,
		agent: AgentKind,
		intent: Option<&IntentOutput>,
	) -> StageCall {
		let profile = self.dispatcher.profiles.get(agent);
		let deadline = match profile.deadline.and_then(|limit| Instant::now().checked_add(limit)) {
			Some(limit) if agent.tier() == Tier::One => request.deadline.min(limit),
			_ => request.deadline,
		};
		let query = request.normalized_query.as_str();
		let filter_fields = &self.cfg.orchestrator.filter_fields;
		let label = intent.map(|output| output.intent);
		let (key_input, messages, grounding) = match agent {
			AgentKind::Rewrite => (
				json!({
					"query": query,
					"intent": label.map(IntentLabel::as_str),
					"filter_fields": filter_fields,
				}),
				prompts::rewrite(query, label, filter_fields),
				GroundingContext::default().with_filter_fields(filter_fields.iter().cloned()),
			),
			AgentKind::Clarification =>
				(json!({ "query": query }), prompts::clarification(query), GroundingContext::default()),
			_ => (json!({ "query": query }), prompts::intent(query), GroundingContext::default()),
		};

		StageCall {
			request_id: request.request_id,
			agent,
			key_input,
			messages,
			grounding,
			deadline: Some(deadline),
		}
	}
}

fn deterministic_plan(request: &Request) -> PipelineQuery {
	PipelineQuery {
		query: request.query.clone(),
		filters: request.filters.clone(),
		boosts: Vec::new(),
		intent: None,
		language: None,
		user_id: request.user_id.clone(),
		k: request.k,
	}
}

fn agent_plan(
	request: &Request,
	intent: Option<IntentOutput>,
	rewrite: Option<RewriteOutput>,
) -> PipelineQuery {
	let mut plan = deterministic_plan(request);

	if let Some(intent) = intent {
		plan.intent = Some(intent.intent);
		plan.language = Some(intent.language);
	}
	if let Some(rewrite) = rewrite {
		plan.query = rewrite.normalized_query;
		plan.filters = merge_filters(rewrite.filters, &request.filters);
		plan.boosts = rewrite.boosts;
	}

	plan
}

/// Caller-supplied filters win over agent-suggested ones.
fn merge_filters(suggested: Map<String, Value>, caller: &Map<String, Value>) -> Map<String, Value> {
	let mut merged = suggested;

	for (key, value) in caller {
		merged.insert(key.clone(), value.clone());
	}

	merged
}
