use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use orca_domain::{AgentKind, CacheKey};
use orca_service::{AttachmentStatus, Decision};
use orca_storage::CacheStore;

use super::{Reply, harness, healthy, search_request, settled, test_config};

fn enrichment_config() -> orca_config::Config {
	let mut cfg = test_config();

	cfg.attachments.enabled = true;

	cfg
}

#[tokio::test(start_paused = true)]
async fn slow_enrichment_never_delays_the_response() {
	let h = harness(enrichment_config(), |request| match request.agent {
		AgentKind::Explanation => match healthy(request) {
			Reply::Json(value) => Reply::Slow(Duration::from_secs(30), value),
			other => other,
		},
		_ => healthy(request),
	});
	let started = Instant::now();
	let response = h.service.search(search_request("runnig shoes")).await.expect("Search failed.");

	assert!(started.elapsed() < Duration::from_millis(80), "Tier-2 must not hold the response.");
	assert_eq!(response.decision, Decision::ServedByAgent);
	assert_eq!(response.attachments, vec![AgentKind::Explanation, AgentKind::Composition]);

	let done = settled(&h.service, response.request_id, 2).await;
	let explanation = done
		.attachments
		.iter()
		.find(|a| a.kind == AgentKind::Explanation)
		.expect("Missing explanation slot.");
	let composition = done
		.attachments
		.iter()
		.find(|a| a.kind == AgentKind::Composition)
		.expect("Missing composition slot.");

	assert_eq!(explanation.status, AttachmentStatus::Failed);
	assert_eq!(explanation.reason.as_deref(), Some("timeout"));
	assert_eq!(composition.status, AttachmentStatus::Ready);
	assert_eq!(
		composition.payload.as_ref().and_then(|p| p.get("cited_ids")),
		Some(&json!(["sku-1"]))
	);
}

#[tokio::test(start_paused = true)]
async fn advertised_kinds_poll_as_pending_before_their_task_runs() {
	let h = harness(enrichment_config(), |request| match request.agent {
		AgentKind::Explanation | AgentKind::Composition => match healthy(request) {
			Reply::Json(value) => Reply::Slow(Duration::from_secs(1), value),
			other => other,
		},
		_ => healthy(request),
	});
	let response = h.service.search(search_request("runnig shoes")).await.expect("Search failed.");
	// No yield between the response and the poll, so the spawned tasks have not run yet.
	let polled = h.service.attachments(response.request_id).await.expect("Failed to poll.");

	assert_eq!(polled.attachments.len(), response.attachments.len());
	assert!(polled.attachments.iter().all(|a| a.status == AttachmentStatus::Pending));
	assert!(polled.attachments.iter().all(|a| response.attachments.contains(&a.kind)));

	let done = settled(&h.service, response.request_id, 2).await;

	assert!(done.attachments.iter().all(|a| a.status == AttachmentStatus::Ready));
}

#[tokio::test(start_paused = true)]
async fn enrichment_failure_leaves_the_response_untouched() {
	let h = harness(enrichment_config(), |request| match request.agent {
		AgentKind::Explanation | AgentKind::Composition => Reply::Fail,
		_ => healthy(request),
	});
	let response = h.service.search(search_request("runnig shoes")).await.expect("Search failed.");

	assert_eq!(response.decision, Decision::ServedByAgent);
	assert_eq!(response.items.len(), 3);

	let done = settled(&h.service, response.request_id, 2).await;

	assert!(done.attachments.iter().all(|a| a.status == AttachmentStatus::Failed));
	assert!(done.attachments.iter().all(|a| a.reason.as_deref() == Some("transport_error")));
}

#[tokio::test(start_paused = true)]
async fn explanations_citing_unknown_items_are_rejected() {
	let h = harness(enrichment_config(), |request| match request.agent {
		AgentKind::Explanation => Reply::Json(json!({
			"explanations": [ { "item_id": "sku-999", "reason": "Popular." } ],
			"confidence": 0.9,
		})),
		_ => healthy(request),
	});
	let response = h.service.search(search_request("runnig shoes")).await.expect("Search failed.");
	let done = settled(&h.service, response.request_id, 2).await;
	let explanation = done
		.attachments
		.iter()
		.find(|a| a.kind == AgentKind::Explanation)
		.expect("Missing explanation slot.");

	assert_eq!(explanation.status, AttachmentStatus::Failed);
	assert_eq!(explanation.reason.as_deref(), Some("schema_invalid"));
	assert!(explanation.payload.is_none());
}

#[tokio::test(start_paused = true)]
async fn saturated_enrichment_is_skipped() {
	let mut cfg = enrichment_config();

	cfg.attachments.max_in_flight = 1;

	let h = harness(cfg, |request| match request.agent {
		AgentKind::Explanation | AgentKind::Composition => match healthy(request) {
			Reply::Json(value) => Reply::Slow(Duration::from_secs(1), value),
			other => other,
		},
		_ => healthy(request),
	});
	let response = h.service.search(search_request("runnig shoes")).await.expect("Search failed.");

	assert_eq!(response.attachments, vec![AgentKind::Explanation]);
	assert_eq!(
		h.service.telemetry().counter("attachments_total", &["composition", "skipped"]),
		1
	);
}

#[tokio::test(start_paused = true)]
async fn results_for_a_removed_slot_are_discarded() {
	let mut cfg = enrichment_config();

	cfg.attachments.kinds = vec!["explanation".to_string()];

	let h = harness(cfg, |request| match request.agent {
		AgentKind::Explanation => match healthy(request) {
			Reply::Json(value) => Reply::Slow(Duration::from_secs(1), value),
			other => other,
		},
		_ => healthy(request),
	});
	let response = h.service.search(search_request("runnig shoes")).await.expect("Search failed.");
	let key = CacheKey::attachment(response.request_id, AgentKind::Explanation);

	// Let the task record its pending slot, then drop it before the agent answers.
	tokio::time::sleep(Duration::from_millis(100)).await;

	assert!(h.cache.remove(key.as_str()).await.expect("Failed to remove slot."));

	tokio::time::sleep(Duration::from_secs(2)).await;

	let polled = h.service.attachments(response.request_id).await.expect("Failed to poll.");

	assert!(polled.attachments.is_empty());
	assert_eq!(
		h.service.telemetry().counter("attachments_total", &["explanation", "discarded"]),
		1
	);
}

#[tokio::test]
async fn recommendations_are_enriched_too() {
	let h = harness(enrichment_config(), healthy);
	let response = h
		.service
		.recommend(orca_service::RecommendRequest {
			user_id: "shopper-1".to_string(),
			context: serde_json::Map::new(),
			k: Some(3),
		})
		.await
		.expect("Recommend failed.");

	assert_eq!(response.attachments.len(), 2);

	let done = settled(&h.service, response.request_id, 2).await;

	assert!(done.attachments.iter().all(|a| a.status == AttachmentStatus::Ready));
}
