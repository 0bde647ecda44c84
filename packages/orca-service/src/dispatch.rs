use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use orca_domain::{
	AgentKind, AgentOutput, AgentRequest, CacheKey, ConfidenceEvaluator, GroundingContext, Verdict,
	schema,
};
use orca_storage::{CacheEntry, CacheStore};

use crate::{
	AgentError, FallbackReason,
	agent::AgentClient,
	breaker::{BreakerRegistry, CallOutcome, CircuitBreaker, Permit},
	profiles::AgentProfiles,
	telemetry::Telemetry,
};

/// One agent stage of a request.
pub(crate) struct StageCall {
	pub(crate) request_id: Uuid,
	pub(crate) agent: AgentKind,
	/// Normalized input that identifies the stage in the cache.
	pub(crate) key_input: Value,
	pub(crate) messages: Vec<Value>,
	pub(crate) grounding: GroundingContext,
	pub(crate) deadline: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StepOutcome {
	Cached(AgentOutput),
	Accepted(AgentOutput),
	LowConfidence(AgentOutput),
	Degraded(FallbackReason),
}

/// Runs the cache, breaker, agent, evaluator, cache-write sequence for a stage.
#[derive(Clone)]
pub(crate) struct Dispatcher {
	pub(crate) cache: Arc<dyn CacheStore>,
	pub(crate) client: AgentClient,
	pub(crate) breakers: Arc<BreakerRegistry>,
	pub(crate) profiles: Arc<AgentProfiles>,
	pub(crate) telemetry: Telemetry,
	/// USD per 1,000 tokens, when cost accounting is on.
	pub(crate) cost_per_1k: Option<f64>,
}
impl Dispatcher {
	pub(crate) async fn run(&self, call: StageCall) -> StepOutcome {
		let agent = call.agent;
		let profile = self.profiles.get(agent);
		let key = CacheKey::for_stage(agent, &call.key_input);

		if let Some(output) = self.lookup(&key, agent, &call.grounding).await {
			return StepOutcome::Cached(output);
		}
		if !profile.enabled {
			return self.degrade(agent, FallbackReason::AgentDisabled);
		}
		if call.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
			return self.degrade(agent, FallbackReason::Timeout);
		}

		let breaker = self.breakers.get(agent);
		let permit = match breaker.try_acquire() {
			Ok(permit) => permit,
			Err(rejection) => {
				tracing::info!(
					agent = agent.as_str(),
					state = rejection.state.as_str(),
					retry_after_ms = rejection.retry_after.map(|d| d.as_millis() as u64),
					"Circuit rejected agent call."
				);

				return self.degrade(agent, FallbackReason::CircuitOpen);
			},
		};
		let mut guard = CallGuard { breaker, permit: Some(permit) };
		let request = AgentRequest {
			request_id: call.request_id,
			agent,
			messages: call.messages,
			max_tokens: profile.max_tokens,
			grounding: call.grounding,
		};
		let started = Instant::now();
		let result = self.client.invoke(&request, call.deadline).await;

		self.telemetry.observe_latency(agent, started.elapsed());

		let response = match result {
			Ok(response) => response,
			Err(AgentError::Timeout) => {
				guard.settle(CallOutcome::Failure);

				return self.degrade(agent, FallbackReason::Timeout);
			},
			Err(AgentError::Transport { message }) => {
				guard.settle(CallOutcome::Failure);
				tracing::warn!(agent = agent.as_str(), error = %message, "Agent transport failed.");

				return self.degrade(agent, FallbackReason::TransportError);
			},
			Err(AgentError::InvalidResponse { message }) => {
				guard.settle(CallOutcome::Failure);
				self.telemetry.record_verdict(agent, Verdict::Invalid);
				tracing::warn!(
					agent = agent.as_str(),
					error = %message,
					"Agent response was unusable."
				);

				return self.degrade(agent, FallbackReason::SchemaInvalid);
			},
		};

		if let Some(usage) = response.usage {
			self.telemetry.record_usage(agent, usage, self.cost_per_1k);
		}

		let verdict = ConfidenceEvaluator::new(profile.min_confidence).evaluate(&response);

		self.telemetry.record_verdict(agent, verdict);

		match (verdict, response.into_output()) {
			(Verdict::Accept, Some(output)) => {
				guard.settle(CallOutcome::Success);
				self.store(&key, agent, &output, profile.cache_ttl).await;

				StepOutcome::Accepted(output)
			},
			(Verdict::LowConfidence, Some(output)) => {
				guard.settle(CallOutcome::Success);
				tracing::info!(
					agent = agent.as_str(),
					confidence = output.confidence(),
					threshold = profile.min_confidence,
					"Agent output below confidence threshold."
				);

				StepOutcome::LowConfidence(output)
			},
			_ => {
				guard.settle(CallOutcome::Failure);

				self.degrade(agent, FallbackReason::SchemaInvalid)
			},
		}
	}

	async fn lookup(
		&self,
		key: &CacheKey,
		agent: AgentKind,
		grounding: &GroundingContext,
	) -> Option<AgentOutput> {
		let entry = match self.cache.get(key.as_str()).await {
			Ok(entry) => entry,
			Err(err) => {
				tracing::warn!(
					cache_kind = agent.as_str(),
					cache_key_prefix = key.prefix(),
					error = %err,
					"Cache read failed. Treating as miss."
				);

				None
			},
		};
		let output = entry.and_then(|entry| match schema::validate(agent, &entry.value, grounding) {
			Ok(output) => Some(output),
			Err(violation) => {
				tracing::warn!(
					cache_kind = agent.as_str(),
					cache_key_prefix = key.prefix(),
					error = %violation,
					"Cached payload failed validation. Treating as miss."
				);

				None
			},
		});

		self.telemetry.record_cache_lookup(agent, output.is_some());
		tracing::info!(
			cache_kind = agent.as_str(),
			cache_key_prefix = key.prefix(),
			hit = output.is_some(),
			"Cache lookup."
		);

		output
	}

	async fn store(
		&self,
		key: &CacheKey,
		agent: AgentKind,
		output: &AgentOutput,
		ttl: std::time::Duration,
	) {
		let entry = CacheEntry::new(agent.as_str(), output.to_payload(), ttl);

		if let Err(err) = self.cache.set(key.as_str(), entry).await {
			tracing::warn!(
				cache_kind = agent.as_str(),
				cache_key_prefix = key.prefix(),
				error = %err,
				"Cache write failed."
			);
		}
	}

	fn degrade(&self, agent: AgentKind, reason: FallbackReason) -> StepOutcome {
		self.telemetry.record_agent_error(agent, reason);
		tracing::info!(agent = agent.as_str(), reason = reason.as_str(), "Agent stage degraded.");

		StepOutcome::Degraded(reason)
	}
}

/// Holds the breaker permit for an in-flight call. A call abandoned before it settles counts as
/// a failure.
struct CallGuard<'a> {
	breaker: &'a Arc<CircuitBreaker>,
	permit: Option<Permit>,
}
impl CallGuard<'_> {
	fn settle(&mut self, outcome: CallOutcome) {
		if let Some(permit) = self.permit.take() {
			self.breaker.record(permit, outcome);
		}
	}
}
impl Drop for CallGuard<'_> {
	fn drop(&mut self) {
		self.settle(CallOutcome::Failure);
	}
}
