use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use orca_domain::{AgentKind, TierMode};
use orca_service::{BreakerSnapshot, CircuitState, Decision, FallbackReason};

use super::{Harness, Reply, harness, healthy, search_request, test_config};

/// Rewrite answers normally while `healthy` is set and hangs past its deadline otherwise. The
/// first `warmup` rewrite calls always succeed.
fn flaky_rewrite(warmup: usize, healthy_flag: Arc<AtomicBool>) -> Harness {
	let served = AtomicUsize::new(0);

	harness(test_config(), move |request| {
		if request.agent != AgentKind::Rewrite {
			return healthy(request);
		}

		let call = served.fetch_add(1, Ordering::SeqCst);

		if call < warmup || healthy_flag.load(Ordering::SeqCst) {
			healthy(request)
		} else {
			match healthy(request) {
				Reply::Json(value) => Reply::Slow(Duration::from_secs(10), value),
				other => other,
			}
		}
	})
}

async fn trip(h: &Harness) {
	for i in 0..10 {
		let response =
			h.service.search(search_request(&format!("trail shoes {i}"))).await.expect("Search failed.");

		if i < 4 {
			assert_eq!(response.decision, Decision::ServedByAgent);
		} else {
			assert_eq!(
				response.decision,
				Decision::ServedByFallback { reason: FallbackReason::Timeout }
			);
		}
	}
}

fn rewrite_snapshot(h: &Harness) -> BreakerSnapshot {
	h.service
		.breakers()
		.into_iter()
		.find(|snapshot| snapshot.agent == AgentKind::Rewrite)
		.expect("Missing rewrite breaker.")
}

fn rewrite_state(h: &Harness) -> CircuitState {
	rewrite_snapshot(h).state
}

#[tokio::test(start_paused = true)]
async fn repeated_timeouts_open_the_breaker_and_skip_the_transport() {
	let h = flaky_rewrite(4, Arc::new(AtomicBool::new(false)));

	trip(&h).await;

	assert_eq!(rewrite_state(&h), CircuitState::Open);
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 10);

	let rejected =
		h.service.search(search_request("trail shoes 11")).await.expect("Search failed.");

	assert_eq!(rejected.decision, Decision::ServedByFallback { reason: FallbackReason::CircuitOpen });
	assert_eq!(rejected.query, "trail shoes 11");
	assert_eq!(rejected.items.len(), 3);
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 10, "Open breaker must not call out.");
	assert_eq!(
		h.service.telemetry().counter("breaker_transitions_total", &["rewrite", "closed", "open"]),
		1
	);
}

#[tokio::test(start_paused = true)]
async fn one_agent_tripping_leaves_the_others_closed() {
	let h = flaky_rewrite(4, Arc::new(AtomicBool::new(false)));

	trip(&h).await;

	let mut req = search_request("hiking boots");

	req.tier = Some(TierMode::Full);

	let response = h.service.search(req).await.expect("Search failed.");

	// Intent still runs; rewrite is short-circuited.
	assert_eq!(response.decision, Decision::ServedByFallback { reason: FallbackReason::CircuitOpen });
	assert_eq!(h.transport.calls(AgentKind::Intent), 1);

	for snapshot in h.service.breakers() {
		let expected =
			if snapshot.agent == AgentKind::Rewrite { CircuitState::Open } else { CircuitState::Closed };

		assert_eq!(snapshot.state, expected, "Unexpected state for {}.", snapshot.agent);
	}
}

#[tokio::test(start_paused = true)]
async fn half_open_probe_success_closes_the_breaker() {
	let flag = Arc::new(AtomicBool::new(false));
	let h = flaky_rewrite(4, flag.clone());

	trip(&h).await;
	flag.store(true, Ordering::SeqCst);
	tokio::time::advance(Duration::from_secs(31)).await;

	assert_eq!(rewrite_state(&h), CircuitState::HalfOpen);

	let probe = h.service.search(search_request("trail shoes probe")).await.expect("Search failed.");

	assert_eq!(probe.decision, Decision::ServedByAgent);
	assert_eq!(rewrite_state(&h), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn half_open_probe_failure_reopens_the_breaker() {
	let h = flaky_rewrite(4, Arc::new(AtomicBool::new(false)));

	trip(&h).await;
	tokio::time::advance(Duration::from_secs(31)).await;

	let probe = h.service.search(search_request("trail shoes probe")).await.expect("Search failed.");

	assert_eq!(probe.decision, Decision::ServedByFallback { reason: FallbackReason::Timeout });
	assert_eq!(rewrite_state(&h), CircuitState::Open);

	let after = h.service.search(search_request("trail shoes after")).await.expect("Search failed.");

	assert_eq!(after.decision, Decision::ServedByFallback { reason: FallbackReason::CircuitOpen });
}

#[tokio::test(start_paused = true)]
async fn abandoned_calls_count_as_failures() {
	let h = harness(test_config(), |request| match (request.agent, healthy(request)) {
		(AgentKind::Rewrite, Reply::Json(value)) => Reply::Slow(Duration::from_millis(50), value),
		(_, reply) => reply,
	});
	let abandoned =
		tokio::time::timeout(Duration::from_millis(10), h.service.search(search_request("boots")))
			.await;

	assert!(abandoned.is_err(), "The caller should give up before the agent answers.");

	let snapshot = rewrite_snapshot(&h);

	assert_eq!(h.transport.calls(AgentKind::Rewrite), 1);
	assert_eq!(snapshot.state, CircuitState::Closed);
	assert_eq!(snapshot.samples, 1);
	assert_eq!(snapshot.failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_are_all_counted() {
	let mut cfg = test_config();

	cfg.breaker.min_samples = 1_000;

	let h = Arc::new(harness(cfg, |request| match request.agent {
		AgentKind::Rewrite => Reply::Fail,
		_ => healthy(request),
	}));
	let mut searches = Vec::with_capacity(400);

	for i in 0..400 {
		let h = h.clone();

		searches.push(tokio::spawn(async move {
			h.service.search(search_request(&format!("boots {i}"))).await
		}));
	}
	for search in searches {
		let response = search.await.expect("Search task panicked.").expect("Search failed.");

		assert_eq!(
			response.decision,
			Decision::ServedByFallback { reason: FallbackReason::TransportError }
		);
	}

	let snapshot = rewrite_snapshot(&h);

	assert_eq!(snapshot.state, CircuitState::Closed);
	assert_eq!(snapshot.samples, 400);
	assert_eq!(snapshot.failures, 400);
	assert_eq!(h.transport.calls(AgentKind::Rewrite), 400);
}
