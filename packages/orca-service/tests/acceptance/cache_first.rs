use orca_domain::{AgentKind, IntentLabel, TierMode};
use orca_service::{AttachmentStatus, Decision};
use serde_json::json;

use super::{Reply, harness, healthy, search_request, settled, test_config};

#[tokio::test]
async fn repeat_query_is_served_from_cache_without_agent_call() {
	let h = harness(test_config(), healthy);
	let first = h.service.search(search_request("runnig shoes")).await.expect("Search failed.");

	assert_eq!(first.decision, Decision::ServedByAgent);
	assert_eq!(first.query, "running shoes");
	assert_eq!(h.pipeline.last_query().query, "running shoes");
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 1);

	let second =
		h.service.search(search_request("  Runnig   SHOES ")).await.expect("Search failed.");

	assert_eq!(second.decision, Decision::ServedFromCache);
	assert_eq!(second.query, "running shoes");
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 1, "Cache hit must not reach the agent.");
	assert_eq!(
		h.service.telemetry().counter("cache_lookups_total", &["rewrite", "hit"]),
		1
	);
}

#[tokio::test]
async fn full_tier_chains_intent_into_rewrite() {
	let h = harness(test_config(), |request| match request.agent {
		AgentKind::Rewrite => Reply::Json(json!({
			"normalized_query": "running shoes",
			"filters": { "color": "red" },
			"boosts": ["in_stock"],
			"confidence": 0.92,
		})),
		_ => healthy(request),
	});
	let mut req = search_request("red runnig shoes");

	req.tier = Some(TierMode::Full);
	req.filters.insert("brand".to_string(), json!("acme"));

	let response = h.service.search(req.clone()).await.expect("Search failed.");
	let plan = h.pipeline.last_query();

	assert_eq!(response.decision, Decision::ServedByAgent);
	assert_eq!(plan.intent, Some(IntentLabel::Search));
	assert_eq!(plan.language.as_deref(), Some("en"));
	assert_eq!(plan.filters.get("color"), Some(&json!("red")));
	assert_eq!(plan.filters.get("brand"), Some(&json!("acme")));
	assert_eq!(plan.boosts, vec!["in_stock".to_string()]);

	let again = h.service.search(req).await.expect("Search failed.");

	assert_eq!(again.decision, Decision::ServedFromCache);
	assert_eq!(h.transport.calls(AgentKind::Intent), 1);
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 1);
}

#[tokio::test]
async fn question_intent_skips_rewrite() {
	let h = harness(test_config(), |request| match request.agent {
		AgentKind::Intent =>
			Reply::Json(json!({ "intent": "question", "confidence": 0.9, "language": "en" })),
		_ => healthy(request),
	});
	let mut req = search_request("are these shoes waterproof");

	req.tier = Some(TierMode::Full);

	let response = h.service.search(req).await.expect("Search failed.");

	assert_eq!(response.decision, Decision::ServedByAgent);
	assert_eq!(response.query, "are these shoes waterproof");
	assert_eq!(h.pipeline.last_query().intent, Some(IntentLabel::Question));
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 0);
}

#[tokio::test]
async fn expired_entries_call_the_agent_again() {
	let mut cfg = test_config();

	cfg.agents.rewrite.cache_ttl_secs = 0;

	let h = harness(cfg, healthy);

	h.service.search(search_request("runnig shoes")).await.expect("Search failed.");

	let second = h.service.search(search_request("runnig shoes")).await.expect("Search failed.");

	assert_eq!(second.decision, Decision::ServedByAgent);
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 2);
}

#[tokio::test]
async fn oversized_budgets_deadlines_and_ttls_do_not_overflow() {
	let mut cfg = test_config();

	cfg.orchestrator.request_budget_ms = u64::MAX;
	cfg.agents.rewrite.deadline_ms = Some(u64::MAX);
	cfg.agents.rewrite.cache_ttl_secs = u64::MAX;
	cfg.agents.explanation.deadline_ms = Some(u64::MAX);
	cfg.agents.explanation.cache_ttl_secs = u64::MAX;
	cfg.attachments.enabled = true;
	cfg.attachments.ttl_secs = u64::MAX;

	let h = harness(cfg, healthy);
	let mut req = search_request("runnig shoes");

	req.budget_ms = Some(u64::MAX);

	let first = h.service.search(req.clone()).await.expect("Search failed.");

	assert_eq!(first.decision, Decision::ServedByAgent);

	let again = h.service.search(req).await.expect("Search failed.");

	assert_eq!(again.decision, Decision::ServedFromCache);

	let done = settled(&h.service, first.request_id, 2).await;

	assert!(done.attachments.iter().all(|a| a.status == AttachmentStatus::Ready));
}
