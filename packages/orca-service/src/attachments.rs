use std::{
	collections::HashSet,
	sync::{Arc, Mutex, MutexGuard},
	time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{sync::Semaphore, time::Instant};
use uuid::Uuid;

use orca_domain::{AgentKind, CacheKey, GroundingContext, RankedItem, Tier};
use orca_storage::CacheEntry;

use crate::{
	Result,
	dispatch::{Dispatcher, StageCall, StepOutcome},
	prompts,
};

const ATTACHMENT_OWNER: &str = "attachment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
	Pending,
	Ready,
	Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
	pub request_id: Uuid,
	pub kind: AgentKind,
	pub status: AttachmentStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payload: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentsResponse {
	pub request_id: Uuid,
	pub attachments: Vec<Attachment>,
}

/// What a Tier-2 agent needs from the already-sent response.
#[derive(Debug, Clone)]
pub(crate) struct EnrichmentContext {
	pub(crate) request_id: Uuid,
	pub(crate) query: String,
	pub(crate) items: Vec<RankedItem>,
}

#[derive(Debug, Clone)]
pub(crate) struct AttachmentSettings {
	pub(crate) enabled: bool,
	pub(crate) ttl: Duration,
	pub(crate) kinds: Vec<AgentKind>,
}
impl AttachmentSettings {
	pub(crate) fn from_config(cfg: &orca_config::Attachments) -> Self {
		Self {
			enabled: cfg.enabled,
			ttl: Duration::from_secs(cfg.ttl_secs),
			kinds: cfg
				.kinds
				.iter()
				.filter_map(|kind| AgentKind::parse(kind))
				.filter(|kind| kind.tier() == Tier::Two)
				.collect(),
		}
	}
}

type LaunchKey = (Uuid, AgentKind);

/// Fire-and-forget Tier-2 enrichment.
///
/// Each dispatched kind gets a slot keyed by request id. The slot starts pending and is written
/// once more, to ready or failed, unless it expired or was removed first. Failures stay inside the
/// task.
///
/// Kinds whose task has not yet written its pending slot are tracked in `launched`, so a poll
/// that races the spawn still reports them as pending on this replica.
#[derive(Clone)]
pub(crate) struct AttachmentManager {
	dispatcher: Dispatcher,
	settings: Arc<AttachmentSettings>,
	permits: Arc<Semaphore>,
	launched: Arc<Mutex<HashSet<LaunchKey>>>,
}
impl AttachmentManager {
	pub(crate) fn new(
		dispatcher: Dispatcher,
		settings: AttachmentSettings,
		max_in_flight: usize,
	) -> Self {
		Self {
			dispatcher,
			settings: Arc::new(settings),
			permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
			launched: Arc::new(Mutex::new(HashSet::new())),
		}
	}

	/// Spawns enrichment for each enabled kind and returns the kinds that were dispatched.
	pub(crate) fn dispatch(&self, context: EnrichmentContext) -> Vec<AgentKind> {
		if !self.settings.enabled || context.items.is_empty() {
			return Vec::new();
		}

		let context = Arc::new(context);
		let mut dispatched = Vec::new();

		for &kind in &self.settings.kinds {
			if !self.dispatcher.profiles.get(kind).enabled {
				continue;
			}

			let Ok(permit) = self.permits.clone().try_acquire_owned() else {
				self.dispatcher.telemetry.record_attachment(kind, "skipped");
				tracing::warn!(
					request_id = %context.request_id,
					kind = kind.as_str(),
					"Attachment capacity exhausted. Skipping enrichment."
				);

				continue;
			};
			let manager = self.clone();
			let context = context.clone();
			let launch = Launch::new(self.launched.clone(), (context.request_id, kind));

			tokio::spawn(async move {
				let _permit = permit;

				manager.enrich(kind, &context, launch).await;
			});
			dispatched.push(kind);
		}

		dispatched
	}

	pub(crate) async fn collect(&self, request_id: Uuid) -> Result<Vec<Attachment>> {
		let mut attachments = Vec::new();

		for kind in AgentKind::ALL.into_iter().filter(|kind| kind.tier() == Tier::Two) {
			// Checked before the slot read. A launch clears only after its pending write.
			if self.lock_launched().contains(&(request_id, kind)) {
				attachments.push(Attachment {
					request_id,
					kind,
					status: AttachmentStatus::Pending,
					payload: None,
					reason: None,
				});

				continue;
			}

			let key = CacheKey::attachment(request_id, kind);

			if let Some(attachment) = self.read_slot(&key).await? {
				attachments.push(attachment);
			}
		}

		Ok(attachments)
	}

	fn lock_launched(&self) -> MutexGuard<'_, HashSet<LaunchKey>> {
		self.launched.lock().unwrap_or_else(|err| err.into_inner())
	}

	async fn enrich(&self, kind: AgentKind, context: &EnrichmentContext, launch: Launch) {
		let key = CacheKey::attachment(context.request_id, kind);
		let pending = Attachment {
			request_id: context.request_id,
			kind,
			status: AttachmentStatus::Pending,
			payload: None,
			reason: None,
		};

		let recorded = self.write_slot(&key, &pending).await;

		drop(launch);

		if let Err(err) = recorded {
			self.dispatcher.telemetry.record_attachment(kind, "failed");
			tracing::warn!(
				request_id = %context.request_id,
				kind = kind.as_str(),
				error = %err,
				"Failed to record pending attachment."
			);

			return;
		}

		let profile = self.dispatcher.profiles.get(kind);
		let outcome = self
			.dispatcher
			.run(StageCall {
				request_id: context.request_id,
				agent: kind,
				key_input: stage_input(&context.query, &context.items),
				messages: match kind {
					AgentKind::Composition => prompts::composition(&context.query, &context.items),
					_ => prompts::explanation(&context.query, &context.items),
				},
				grounding: GroundingContext::default()
					.with_item_ids(context.items.iter().map(|item| item.item_id.as_str())),
				deadline: profile
					.deadline
					.and_then(|deadline| Instant::now().checked_add(deadline)),
			})
			.await;
		let finished = match outcome {
			StepOutcome::Cached(output) | StepOutcome::Accepted(output) => Attachment {
				status: AttachmentStatus::Ready,
				payload: Some(output.to_payload()),
				..pending
			},
			StepOutcome::LowConfidence(_) => Attachment {
				status: AttachmentStatus::Failed,
				reason: Some("low_confidence".to_string()),
				..pending
			},
			StepOutcome::Degraded(reason) => Attachment {
				status: AttachmentStatus::Failed,
				reason: Some(reason.as_str().to_string()),
				..pending
			},
		};

		match self.read_slot(&key).await {
			Ok(Some(slot)) if slot.status == AttachmentStatus::Pending => {},
			Ok(_) => {
				self.dispatcher.telemetry.record_attachment(kind, "discarded");
				tracing::info!(
					request_id = %context.request_id,
					kind = kind.as_str(),
					"Attachment slot is gone. Discarding result."
				);

				return;
			},
			Err(err) => {
				self.dispatcher.telemetry.record_attachment(kind, "failed");
				tracing::warn!(
					request_id = %context.request_id,
					kind = kind.as_str(),
					error = %err,
					"Failed to read attachment slot."
				);

				return;
			},
		}

		let result = match finished.status {
			AttachmentStatus::Ready => "ready",
			_ => "failed",
		};

		match self.write_slot(&key, &finished).await {
			Ok(()) => {
				self.dispatcher.telemetry.record_attachment(kind, result);
				tracing::info!(
					request_id = %context.request_id,
					kind = kind.as_str(),
					result,
					"Attachment finished."
				);
			},
			Err(err) => {
				self.dispatcher.telemetry.record_attachment(kind, "failed");
				tracing::warn!(
					request_id = %context.request_id,
					kind = kind.as_str(),
					error = %err,
					"Failed to record attachment result."
				);
			},
		}
	}

	async fn read_slot(&self, key: &CacheKey) -> Result<Option<Attachment>> {
		let Some(entry) = self.dispatcher.cache.get(key.as_str()).await? else {
			return Ok(None);
		};

		match serde_json::from_value(entry.value) {
			Ok(attachment) => Ok(Some(attachment)),
			Err(err) => {
				tracing::warn!(
					cache_key_prefix = key.prefix(),
					error = %err,
					"Attachment slot is unreadable. Ignoring it."
				);

				Ok(None)
			},
		}
	}

	async fn write_slot(&self, key: &CacheKey, attachment: &Attachment) -> Result<()> {
		let value = serde_json::to_value(attachment)
			.map_err(|err| crate::Error::Storage { message: err.to_string() })?;

		self.dispatcher
			.cache
			.set(key.as_str(), CacheEntry::new(ATTACHMENT_OWNER, value, self.settings.ttl))
			.await?;

		Ok(())
	}
}

/// Marks a dispatched kind until its task records the pending slot or goes away.
struct Launch {
	launched: Arc<Mutex<HashSet<LaunchKey>>>,
	key: LaunchKey,
}
impl Launch {
	fn new(launched: Arc<Mutex<HashSet<LaunchKey>>>, key: LaunchKey) -> Self {
		launched.lock().unwrap_or_else(|err| err.into_inner()).insert(key);

		Self { launched, key }
	}
}
impl Drop for Launch {
	fn drop(&mut self) {
		self.launched.lock().unwrap_or_else(|err| err.into_inner()).remove(&self.key);
	}
}

/// Cache identity for Tier-2 stages: the query plus the ordered result ids.
pub(crate) fn stage_input(query: &str, items: &[RankedItem]) -> Value {
	let ids: Vec<&str> = items.iter().map(|item| item.item_id.as_str()).collect();

	json!({ "query": orca_domain::normalize_query(query), "items": ids })
}
