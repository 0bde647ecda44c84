use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use uuid::Uuid;

use orca_config::Config;
use orca_domain::TierMode;

use crate::{Error, Result};

const MAX_QUERY_CHARS: usize = 1_024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	pub user_id: Option<String>,
	#[serde(default)]
	pub filters: Map<String, Value>,
	pub k: Option<u32>,
	/// Overrides `orchestrator.default_tier` for this request.
	pub tier: Option<TierMode>,
	/// Can only shorten the configured request budget.
	pub budget_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendRequest {
	pub user_id: String,
	#[serde(default)]
	pub context: Map<String, Value>,
	pub k: Option<u32>,
}

/// A validated search, pinned to its deadline at admission.
#[derive(Debug, Clone)]
pub struct Request {
	pub request_id: Uuid,
	pub query: String,
	pub normalized_query: String,
	pub user_id: Option<String>,
	pub filters: Map<String, Value>,
	pub k: u32,
	pub tier: TierMode,
	pub deadline: Instant,
}
impl Request {
	pub fn from_search(req: SearchRequest, cfg: &Config) -> Result<Self> {
		let query = req.query.trim().to_string();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
		}
		if query.chars().count() > MAX_QUERY_CHARS {
			return Err(Error::InvalidRequest {
				message: format!("query must be at most {MAX_QUERY_CHARS} characters."),
			});
		}

		let normalized_query = orca_domain::normalize_query(&query);

		if normalized_query.is_empty() {
			return Err(Error::InvalidRequest {
				message: "query must contain visible characters.".to_string(),
			});
		}

		let tier = match req.tier {
			Some(tier) => tier,
			None => TierMode::parse(&cfg.orchestrator.default_tier).ok_or_else(|| {
				Error::InvalidRequest { message: "orchestrator.default_tier is unknown.".to_string() }
			})?,
		};
		let budget_ms = match req.budget_ms {
			Some(0) =>
				return Err(Error::InvalidRequest {
					message: "budget_ms must be greater than zero.".to_string(),
				}),
			Some(budget) => budget.min(cfg.orchestrator.request_budget_ms),
			None => cfg.orchestrator.request_budget_ms,
		}
		.min(orca_config::MAX_REQUEST_BUDGET_MS);

		Ok(Self {
			request_id: Uuid::new_v4(),
			query,
			normalized_query,
			user_id: clean_user_id(req.user_id),
			filters: req.filters,
			k: resolve_k(req.k, cfg)?,
			tier,
			deadline: Instant::now() + Duration::from_millis(budget_ms),
		})
	}

	pub fn remaining(&self) -> Duration {
		self.deadline.saturating_duration_since(Instant::now())
	}
}

pub(crate) fn resolve_k(k: Option<u32>, cfg: &Config) -> Result<u32> {
	match k {
		Some(0) => Err(Error::InvalidRequest { message: "k must be greater than zero.".to_string() }),
		Some(k) => Ok(k.min(cfg.orchestrator.max_k)),
		None => Ok(cfg.orchestrator.default_k.min(cfg.orchestrator.max_k)),
	}
}

fn clean_user_id(user_id: Option<String>) -> Option<String> {
	user_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
}
