use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
	Intent,
	Rewrite,
	Clarification,
	Composition,
	Explanation,
}
impl AgentKind {
	pub const ALL: [Self; 5] =
		[Self::Intent, Self::Rewrite, Self::Clarification, Self::Composition, Self::Explanation];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Intent => "intent",
			Self::Rewrite => "rewrite",
			Self::Clarification => "clarification",
			Self::Composition => "composition",
			Self::Explanation => "explanation",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.as_str() == raw.trim())
	}

	pub fn tier(self) -> Tier {
		match self {
			Self::Intent | Self::Rewrite | Self::Clarification => Tier::One,
			Self::Composition | Self::Explanation => Tier::Two,
		}
	}

	/// Bumped whenever the output schema of this agent changes so stale cache entries stop
	/// matching.
	pub fn schema_version(self) -> u32 {
		1
	}
}
impl fmt::Display for AgentKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
	/// Synchronous, on the request path, deadline-bound.
	One,
	/// Detached and best-effort.
	Two,
}
impl Tier {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::One => "tier_1",
			Self::Two => "tier_2",
		}
	}
}

/// Per-agent budget, cache lifetime, and acceptance bar.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
	pub kind: AgentKind,
	pub enabled: bool,
	/// `None` means unbounded, which only Tier-2 agents allow.
	pub deadline: Option<Duration>,
	pub cache_ttl: Duration,
	pub max_tokens: u32,
	pub min_confidence: f32,
}
