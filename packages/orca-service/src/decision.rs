use serde::{Deserialize, Serialize};

/// Why a request was served by the deterministic path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
	CircuitOpen,
	Timeout,
	TransportError,
	SchemaInvalid,
	AgentDisabled,
	TierNotRequired,
}
impl FallbackReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::CircuitOpen => "circuit_open",
			Self::Timeout => "timeout",
			Self::TransportError => "transport_error",
			Self::SchemaInvalid => "schema_invalid",
			Self::AgentDisabled => "agent_disabled",
			Self::TierNotRequired => "tier_not_required",
		}
	}
}

/// The single outcome every request ends in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
	ServedFromCache,
	ServedByAgent,
	ServedByFallback { reason: FallbackReason },
	AwaitingClarification { prompt: String },
}
impl Decision {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::ServedFromCache => "served_from_cache",
			Self::ServedByAgent => "served_by_agent",
			Self::ServedByFallback { .. } => "served_by_fallback",
			Self::AwaitingClarification { .. } => "awaiting_clarification",
		}
	}

	pub fn fallback_reason(&self) -> Option<FallbackReason> {
		match self {
			Self::ServedByFallback { reason } => Some(*reason),
			_ => None,
		}
	}
}
