use std::{sync::Arc, time::Duration};

use prometheus::{
	CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Registry, TextEncoder,
	register_counter_vec_with_registry, register_histogram_vec_with_registry,
	register_int_counter_vec_with_registry,
};

use orca_domain::{AgentKind, TokenUsage, Verdict};

use crate::{Error, FallbackReason, Result, breaker::CircuitState};

const LATENCY_BUCKETS: &[f64] =
	&[0.005, 0.01, 0.025, 0.05, 0.08, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Counters and histograms for every dispatch decision.
///
/// Emission never fails the request path. Only registration and rendering return errors.
#[derive(Clone)]
pub struct Telemetry {
	inner: Arc<Metrics>,
}

struct Metrics {
	registry: Registry,
	requests: IntCounterVec,
	agent_errors: IntCounterVec,
	cache_lookups: IntCounterVec,
	breaker_transitions: IntCounterVec,
	confidence_verdicts: IntCounterVec,
	attachments: IntCounterVec,
	pipeline_failures: IntCounterVec,
	agent_tokens: IntCounterVec,
	agent_cost: CounterVec,
	agent_latency: HistogramVec,
}

impl Telemetry {
	pub fn new() -> Result<Self> {
		let registry = Registry::new_custom(Some("orca".to_string()), None)?;
		let requests = register_int_counter_vec_with_registry!(
			"requests_total",
			"Requests by operation and final decision.",
			&["operation", "outcome"],
			registry
		)?;
		let agent_errors = register_int_counter_vec_with_registry!(
			"agent_errors_total",
			"Agent calls that degraded to the deterministic path.",
			&["agent", "reason"],
			registry
		)?;
		let cache_lookups = register_int_counter_vec_with_registry!(
			"cache_lookups_total",
			"Cache lookups by agent and result.",
			&["agent", "result"],
			registry
		)?;
		let breaker_transitions = register_int_counter_vec_with_registry!(
			"breaker_transitions_total",
			"Circuit breaker state changes.",
			&["agent", "from", "to"],
			registry
		)?;
		let confidence_verdicts = register_int_counter_vec_with_registry!(
			"confidence_verdicts_total",
			"Confidence evaluator verdicts.",
			&["agent", "verdict"],
			registry
		)?;
		let attachments = register_int_counter_vec_with_registry!(
			"attachments_total",
			"Tier-2 enrichment results.",
			&["kind", "result"],
			registry
		)?;
		let pipeline_failures = register_int_counter_vec_with_registry!(
			"pipeline_failures_total",
			"Deterministic pipeline calls that failed.",
			&["operation"],
			registry
		)?;
		let agent_tokens = register_int_counter_vec_with_registry!(
			"agent_tokens_total",
			"Tokens reported by the chat provider.",
			&["agent", "kind"],
			registry
		)?;
		let agent_cost = register_counter_vec_with_registry!(
			"agent_cost_usd_total",
			"Estimated provider spend in USD.",
			&["agent"],
			registry
		)?;
		let agent_latency = register_histogram_vec_with_registry!(
			HistogramOpts::new("agent_latency_seconds", "Agent call latency.")
				.buckets(LATENCY_BUCKETS.to_vec()),
			&["agent"],
			registry
		)?;

		Ok(Self {
			inner: Arc::new(Metrics {
				registry,
				requests,
				agent_errors,
				cache_lookups,
				breaker_transitions,
				confidence_verdicts,
				attachments,
				pipeline_failures,
				agent_tokens,
				agent_cost,
				agent_latency,
			}),
		})
	}

	pub fn record_request(&self, operation: &str, outcome: &str) {
		self.inner.requests.with_label_values(&[operation, outcome]).inc();
	}

	pub fn record_agent_error(&self, agent: AgentKind, reason: FallbackReason) {
		self.inner.agent_errors.with_label_values(&[agent.as_str(), reason.as_str()]).inc();
	}

	pub fn record_cache_lookup(&self, agent: AgentKind, hit: bool) {
		let result = if hit { "hit" } else { "miss" };

		self.inner.cache_lookups.with_label_values(&[agent.as_str(), result]).inc();
	}

	pub fn record_transition(&self, agent: AgentKind, from: CircuitState, to: CircuitState) {
		self.inner
			.breaker_transitions
			.with_label_values(&[agent.as_str(), from.as_str(), to.as_str()])
			.inc();
	}

	pub fn record_verdict(&self, agent: AgentKind, verdict: Verdict) {
		self.inner.confidence_verdicts.with_label_values(&[agent.as_str(), verdict.as_str()]).inc();
	}

	pub fn record_attachment(&self, kind: AgentKind, result: &str) {
		self.inner.attachments.with_label_values(&[kind.as_str(), result]).inc();
	}

	pub fn record_pipeline_failure(&self, operation: &str) {
		self.inner.pipeline_failures.with_label_values(&[operation]).inc();
	}

	/// Cost accrues only when both the rate and the token total are positive.
	pub fn record_usage(&self, agent: AgentKind, usage: TokenUsage, cost_per_1k: Option<f64>) {
		let tokens = &self.inner.agent_tokens;

		tokens.with_label_values(&[agent.as_str(), "prompt"]).inc_by(usage.prompt_tokens);
		tokens.with_label_values(&[agent.as_str(), "completion"]).inc_by(usage.completion_tokens);

		if let Some(rate) = cost_per_1k.filter(|rate| *rate > 0.0)
			&& usage.total() > 0
		{
			self.inner
				.agent_cost
				.with_label_values(&[agent.as_str()])
				.inc_by(usage.total() as f64 / 1_000.0 * rate);
		}
	}

	pub fn observe_latency(&self, agent: AgentKind, elapsed: Duration) {
		self.inner.agent_latency.with_label_values(&[agent.as_str()]).observe(elapsed.as_secs_f64());
	}

	/// Current value of a counter, for admin views and tests. Unknown names read as zero.
	pub fn counter(&self, name: &str, labels: &[&str]) -> u64 {
		let vec = match name {
			"requests_total" => &self.inner.requests,
			"agent_errors_total" => &self.inner.agent_errors,
			"cache_lookups_total" => &self.inner.cache_lookups,
			"breaker_transitions_total" => &self.inner.breaker_transitions,
			"confidence_verdicts_total" => &self.inner.confidence_verdicts,
			"attachments_total" => &self.inner.attachments,
			"pipeline_failures_total" => &self.inner.pipeline_failures,
			"agent_tokens_total" => &self.inner.agent_tokens,
			_ => return 0,
		};

		vec.get_metric_with_label_values(labels).map(|counter| counter.get()).unwrap_or(0)
	}

	/// Prometheus text exposition of every registered metric.
	pub fn render(&self) -> Result<String> {
		let mut buffer = Vec::new();

		TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;

		String::from_utf8(buffer).map_err(|err| Error::Telemetry { message: err.to_string() })
	}
}
