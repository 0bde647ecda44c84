use serde_json::json;

use orca_domain::{AgentKind, AgentRequest, TierMode};
use orca_service::Decision;

use super::{Reply, harness, healthy, search_request, test_config};

fn rewrite_with_confidence(
	confidence: f64,
) -> impl Fn(&AgentRequest) -> Reply + Send + Sync + 'static {
	move |request: &AgentRequest| match request.agent {
		AgentKind::Rewrite => Reply::Json(json!({
			"normalized_query": "shoes",
			"filters": {},
			"boosts": [],
			"confidence": confidence,
		})),
		_ => healthy(request),
	}
}

#[tokio::test]
async fn low_confidence_rewrite_asks_for_clarification() {
	let h = harness(test_config(), rewrite_with_confidence(0.4));
	let response = h.service.search(search_request("shoes")).await.expect("Search failed.");

	assert_eq!(
		response.decision,
		Decision::AwaitingClarification { prompt: "Which size do you need?".to_string() }
	);
	assert!(response.items.is_empty());
	assert_eq!(h.pipeline.calls(), 0, "Clarification must not run the pipeline.");
	assert_eq!(h.transport.calls(AgentKind::Clarification), 1);

	h.service.search(search_request("shoes")).await.expect("Search failed.");

	assert_eq!(h.transport.calls(AgentKind::Rewrite), 2, "Low-confidence output is never cached.");
	assert_eq!(h.transport.calls(AgentKind::Clarification), 1, "Clarification output is cached.");
}

#[tokio::test]
async fn threshold_is_inclusive() {
	let h = harness(test_config(), rewrite_with_confidence(0.7));
	let response = h.service.search(search_request("shoes")).await.expect("Search failed.");

	assert_eq!(response.decision, Decision::ServedByAgent);
	assert_eq!(h.transport.calls(AgentKind::Clarification), 0);
}

#[tokio::test]
async fn per_agent_threshold_overrides_the_global_one() {
	let mut cfg = test_config();

	cfg.agents.rewrite.min_confidence = Some(0.3);

	let h = harness(cfg, rewrite_with_confidence(0.4));
	let response = h.service.search(search_request("shoes")).await.expect("Search failed.");

	assert_eq!(response.decision, Decision::ServedByAgent);
}

#[tokio::test]
async fn failed_clarification_uses_the_configured_prompt() {
	let h = harness(test_config(), |request| match request.agent {
		AgentKind::Clarification => Reply::Fail,
		_ => rewrite_with_confidence(0.2)(request),
	});
	let response = h.service.search(search_request("shoes")).await.expect("Search failed.");

	assert_eq!(
		response.decision,
		Decision::AwaitingClarification { prompt: "What are you shopping for?".to_string() }
	);
}

#[tokio::test]
async fn intent_flagging_ambiguity_skips_rewrite() {
	let h = harness(test_config(), |request| match request.agent {
		AgentKind::Intent => Reply::Json(json!({
			"intent": "search",
			"confidence": 0.9,
			"needs_clarification": true,
		})),
		_ => healthy(request),
	});
	let mut req = search_request("something nice");

	req.tier = Some(TierMode::Full);

	let response = h.service.search(req).await.expect("Search failed.");

	assert!(matches!(response.decision, Decision::AwaitingClarification { .. }));
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 0);
	assert_eq!(h.pipeline.calls(), 0);
}
