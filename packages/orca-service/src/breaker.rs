use std::{
	collections::VecDeque,
	sync::{Arc, Mutex, MutexGuard},
	time::Duration,
};

use serde::Serialize;
use tokio::time::Instant;

use orca_domain::AgentKind;

use crate::{profiles, telemetry::Telemetry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
	Closed,
	Open,
	HalfOpen,
}
impl CircuitState {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Closed => "closed",
			Self::Open => "open",
			Self::HalfOpen => "half_open",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
	Success,
	Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSettings {
	pub window: Duration,
	pub error_rate_threshold: f32,
	pub min_samples: u32,
	pub cooldown: Duration,
	/// Every n-th half-open call is admitted, starting with the first.
	pub probe_stride: u32,
}
impl BreakerSettings {
	pub fn from_config(cfg: &orca_config::Breaker) -> Self {
		let stride = (1.0 / cfg.half_open_probe_ratio).round();
		let probe_stride = if stride.is_finite() && stride >= 1.0 { stride as u32 } else { 1 };

		Self {
			window: Duration::from_secs(cfg.window_secs),
			error_rate_threshold: cfg.error_rate_threshold,
			min_samples: cfg.min_samples,
			cooldown: Duration::from_secs(cfg.cooldown_secs),
			probe_stride,
		}
	}
}

/// Admission ticket for one agent call. Results are only counted against the state that issued it.
#[derive(Debug)]
#[must_use]
pub struct Permit {
	generation: u64,
	probe: bool,
}
impl Permit {
	pub fn is_probe(&self) -> bool {
		self.probe
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
	pub state: CircuitState,
	pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
	pub agent: AgentKind,
	pub from: CircuitState,
	pub to: CircuitState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
	pub agent: AgentKind,
	pub state: CircuitState,
	pub samples: u32,
	pub failures: u32,
	pub error_rate: f32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retry_after_ms: Option<u64>,
}

struct Inner {
	state: CircuitState,
	generation: u64,
	samples: VecDeque<(Instant, bool)>,
	failures: u32,
	opened_at: Option<Instant>,
	half_open_calls: u32,
}
impl Inner {
	fn prune(&mut self, now: Instant, window: Duration) {
		while let Some(&(at, failed)) = self.samples.front() {
			if now.saturating_duration_since(at) < window {
				break;
			}

			self.samples.pop_front();

			if failed {
				self.failures -= 1;
			}
		}
	}

	fn error_rate(&self) -> f32 {
		if self.samples.is_empty() {
			0.0
		} else {
			self.failures as f32 / self.samples.len() as f32
		}
	}

	fn move_to(&mut self, to: CircuitState, now: Instant) -> (CircuitState, CircuitState) {
		let from = self.state;

		self.state = to;
		self.generation += 1;
		self.half_open_calls = 0;

		match to {
			CircuitState::Open => self.opened_at = Some(now),
			CircuitState::Closed => {
				self.opened_at = None;
				self.samples.clear();
				self.failures = 0;
			},
			CircuitState::HalfOpen => {},
		}

		(from, to)
	}
}

/// Failure-rate breaker for one agent.
///
/// Closed until the sliding window holds at least `min_samples` results with an error rate at or
/// above the threshold. Open rejects every call until the cool-down elapses, then half-open admits
/// a fraction of calls as probes. The first probe result closes or reopens the circuit.
pub struct CircuitBreaker {
	agent: AgentKind,
	settings: BreakerSettings,
	telemetry: Option<Telemetry>,
	inner: Mutex<Inner>,
}
impl CircuitBreaker {
	pub fn new(agent: AgentKind, settings: BreakerSettings) -> Self {
		Self {
			agent,
			settings,
			telemetry: None,
			inner: Mutex::new(Inner {
				state: CircuitState::Closed,
				generation: 0,
				samples: VecDeque::new(),
				failures: 0,
				opened_at: None,
				half_open_calls: 0,
			}),
		}
	}

	pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
		self.telemetry = Some(telemetry);

		self
	}

	pub fn agent(&self) -> AgentKind {
		self.agent
	}

	pub fn state(&self) -> CircuitState {
		let mut inner = self.lock();

		self.lazy_half_open(&mut inner, Instant::now());

		inner.state
	}

	pub fn try_acquire(&self) -> Result<Permit, Rejection> {
		let now = Instant::now();
		let mut inner = self.lock();

		self.lazy_half_open(&mut inner, now);

		match inner.state {
			CircuitState::Closed => Ok(Permit { generation: inner.generation, probe: false }),
			CircuitState::Open => Err(Rejection {
				state: CircuitState::Open,
				retry_after: self.retry_after(&inner, now),
			}),
			CircuitState::HalfOpen => {
				let call = inner.half_open_calls;

				inner.half_open_calls = call.saturating_add(1);

				if call % self.settings.probe_stride == 0 {
					Ok(Permit { generation: inner.generation, probe: true })
				} else {
					Err(Rejection { state: CircuitState::HalfOpen, retry_after: None })
				}
			},
		}
	}

	/// Counts a finished call. Returns the transition it caused, if any.
	pub fn record(&self, permit: Permit, outcome: CallOutcome) -> Option<Transition> {
		let now = Instant::now();
		let mut inner = self.lock();

		if permit.generation != inner.generation {
			return None;
		}

		let moved = match inner.state {
			CircuitState::Closed => {
				let failed = outcome == CallOutcome::Failure;

				inner.samples.push_back((now, failed));

				if failed {
					inner.failures += 1;
				}

				inner.prune(now, self.settings.window);

				let samples = inner.samples.len() as u32;

				if samples >= self.settings.min_samples
					&& inner.error_rate() >= self.settings.error_rate_threshold
				{
					Some(inner.move_to(CircuitState::Open, now))
				} else {
					None
				}
			},
			CircuitState::HalfOpen if permit.probe => match outcome {
				CallOutcome::Success => Some(inner.move_to(CircuitState::Closed, now)),
				CallOutcome::Failure => Some(inner.move_to(CircuitState::Open, now)),
			},
			CircuitState::HalfOpen | CircuitState::Open => None,
		};

		drop(inner);

		moved.map(|(from, to)| self.announce(from, to))
	}

	pub fn snapshot(&self) -> BreakerSnapshot {
		let now = Instant::now();
		let mut inner = self.lock();

		self.lazy_half_open(&mut inner, now);
		inner.prune(now, self.settings.window);

		BreakerSnapshot {
			agent: self.agent,
			state: inner.state,
			samples: inner.samples.len() as u32,
			failures: inner.failures,
			error_rate: inner.error_rate(),
			retry_after_ms: self.retry_after(&inner, now).map(|d| d.as_millis() as u64),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn lazy_half_open(&self, inner: &mut Inner, now: Instant) {
		if inner.state != CircuitState::Open {
			return;
		}
		if let Some(opened_at) = inner.opened_at
			&& now.saturating_duration_since(opened_at) >= self.settings.cooldown
		{
			let (from, to) = inner.move_to(CircuitState::HalfOpen, now);

			self.announce(from, to);
		}
	}

	fn retry_after(&self, inner: &Inner, now: Instant) -> Option<Duration> {
		if inner.state != CircuitState::Open {
			return None;
		}

		let opened_at = inner.opened_at?;

		Some(self.settings.cooldown.saturating_sub(now.saturating_duration_since(opened_at)))
	}

	fn announce(&self, from: CircuitState, to: CircuitState) -> Transition {
		if let Some(telemetry) = &self.telemetry {
			telemetry.record_transition(self.agent, from, to);
		}

		tracing::warn!(
			agent = self.agent.as_str(),
			from = from.as_str(),
			to = to.as_str(),
			"Circuit breaker state changed."
		);

		Transition { agent: self.agent, from, to }
	}
}

/// One breaker per agent identity, fixed at startup.
pub struct BreakerRegistry {
	breakers: [Arc<CircuitBreaker>; 5],
}
impl BreakerRegistry {
	pub fn new(settings: &BreakerSettings, telemetry: &Telemetry) -> Self {
		Self {
			breakers: AgentKind::ALL.map(|agent| {
				Arc::new(
					CircuitBreaker::new(agent, settings.clone()).with_telemetry(telemetry.clone()),
				)
			}),
		}
	}

	pub fn get(&self, agent: AgentKind) -> &Arc<CircuitBreaker> {
		&self.breakers[profiles::slot(agent)]
	}

	pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
		self.breakers.iter().map(|breaker| breaker.snapshot()).collect()
	}
}
