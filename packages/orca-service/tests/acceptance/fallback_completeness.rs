use std::time::Duration;

use serde_json::json;

use orca_domain::{AgentKind, TierMode};
use orca_service::{Decision, Error, FallbackReason, RecommendRequest};

use super::{Reply, harness, healthy, search_request, test_config};

async fn assert_fallback<F>(cfg: orca_config::Config, rewrite: F, reason: FallbackReason)
where
	F: Fn() -> Reply + Send + Sync + 'static,
{
	let h = harness(cfg, move |request| match request.agent {
		AgentKind::Rewrite => rewrite(),
		_ => healthy(request),
	});
	let response = h.service.search(search_request("runnig shoes")).await.expect("Search failed.");

	assert_eq!(response.decision, Decision::ServedByFallback { reason }, "Expected {reason:?}.");
	assert_eq!(response.query, "runnig shoes", "Fallback runs the caller's query as given.");
	assert_eq!(response.items.len(), 3);
	assert_eq!(h.pipeline.last_query().query, "runnig shoes");
	assert_eq!(
		h.service.telemetry().counter("requests_total", &["search", "served_by_fallback"]),
		1
	);
}

#[tokio::test]
async fn transport_errors_fall_back() {
	assert_fallback(test_config(), || Reply::Fail, FallbackReason::TransportError).await;
}

#[tokio::test(start_paused = true)]
async fn deadline_overruns_fall_back() {
	let slow = || {
		Reply::Slow(Duration::from_secs(1), json!({ "normalized_query": "x", "confidence": 0.9 }))
	};

	assert_fallback(test_config(), slow, FallbackReason::Timeout).await;
}

#[tokio::test]
async fn structurally_invalid_output_falls_back() {
	let invalid = || Reply::Json(json!({ "query": "running shoes", "confidence": 0.9 }));

	assert_fallback(test_config(), invalid, FallbackReason::SchemaInvalid).await;
}

#[tokio::test]
async fn unparseable_content_is_schema_invalid() {
	assert_fallback(test_config(), || Reply::Malformed, FallbackReason::SchemaInvalid).await;
}

#[tokio::test]
async fn ungrounded_filters_fall_back() {
	let ungrounded = || {
		Reply::Json(json!({
			"normalized_query": "running shoes",
			"filters": { "warehouse": "eu-1" },
			"confidence": 0.9,
		}))
	};

	assert_fallback(test_config(), ungrounded, FallbackReason::SchemaInvalid).await;
}

#[tokio::test]
async fn disabled_agents_fall_back() {
	let mut cfg = test_config();

	cfg.agents.rewrite.enabled = false;

	assert_fallback(cfg, || Reply::Fail, FallbackReason::AgentDisabled).await;
}

#[tokio::test]
async fn deterministic_tier_never_calls_agents() {
	let mut cfg = test_config();

	cfg.orchestrator.default_tier = "deterministic".to_string();

	assert_fallback(cfg, || Reply::Fail, FallbackReason::TierNotRequired).await;
}

#[tokio::test]
async fn budget_overrun_in_the_first_stage_skips_the_rest() {
	let h = harness(test_config(), |request| match request.agent {
		AgentKind::Intent =>
			Reply::Slow(Duration::from_millis(20), json!({ "intent": "search", "confidence": 0.9 })),
		_ => healthy(request),
	});
	let mut req = search_request("runnig shoes");

	req.tier = Some(TierMode::Full);
	req.budget_ms = Some(10);

	let response = h.service.search(req).await.expect("Search failed.");

	assert_eq!(response.decision, Decision::ServedByFallback { reason: FallbackReason::Timeout });
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 0);
}

#[tokio::test]
async fn pipeline_failure_is_the_only_error() {
	let h = harness(test_config(), healthy);

	h.pipeline.fail();

	let err = h
		.service
		.search(search_request("runnig shoes"))
		.await
		.expect_err("Expected pipeline failure.");

	assert!(matches!(err, Error::Pipeline { .. }), "Unexpected error: {err}");
	assert_eq!(h.service.telemetry().counter("pipeline_failures_total", &["search"]), 1);
}

#[tokio::test]
async fn blank_queries_are_rejected() {
	let h = harness(test_config(), healthy);
	let err = h.service.search(search_request(" \t ")).await.expect_err("Expected rejection.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(h.transport.total_calls(), 0);
	assert_eq!(h.pipeline.calls(), 0);
}

#[tokio::test]
async fn k_is_clamped_to_the_configured_maximum() {
	let h = harness(test_config(), healthy);
	let mut req = search_request("runnig shoes");

	req.k = Some(500);

	h.service.search(req).await.expect("Search failed.");

	assert_eq!(h.pipeline.last_query().k, 50);
}

#[tokio::test]
async fn recommendations_skip_tier_one() {
	let h = harness(test_config(), healthy);
	let response = h
		.service
		.recommend(RecommendRequest {
			user_id: "shopper-1".to_string(),
			context: serde_json::Map::new(),
			k: None,
		})
		.await
		.expect("Recommend failed.");

	assert_eq!(
		response.decision,
		Decision::ServedByFallback { reason: FallbackReason::TierNotRequired }
	);
	assert_eq!(response.items.len(), 3);
	assert_eq!(h.transport.total_calls(), 0);
	assert_eq!(h.pipeline.last_query().user_id.as_deref(), Some("shopper-1"));
}
