use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AgentKind, IntentLabel};

/// How much Tier-1 reasoning a search may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierMode {
	Deterministic,
	Rewrite,
	Full,
}
impl TierMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Deterministic => "deterministic",
			Self::Rewrite => "rewrite",
			Self::Full => "full",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"deterministic" => Some(Self::Deterministic),
			"rewrite" => Some(Self::Rewrite),
			"full" => Some(Self::Full),
			_ => None,
		}
	}

	/// Tier-1 agents consulted before the pipeline, in order.
	pub fn plan(self) -> &'static [AgentKind] {
		match self {
			Self::Deterministic => &[],
			Self::Rewrite => &[AgentKind::Rewrite],
			Self::Full => &[AgentKind::Intent, AgentKind::Rewrite],
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineQuery {
	pub query: String,
	#[serde(default)]
	pub filters: Map<String, Value>,
	#[serde(default)]
	pub boosts: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub intent: Option<IntentLabel>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub language: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	pub k: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendQuery {
	pub user_id: String,
	#[serde(default)]
	pub context: Map<String, Value>,
	pub k: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
	pub item_id: String,
	pub score: f32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}
