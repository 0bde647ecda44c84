use std::fmt;

use serde_json::Value;
use uuid::Uuid;

use crate::AgentKind;

/// Store key for agent outputs and attachments.
///
/// Agent keys are `<agent>:<blake3 hex>` over the agent identity, its schema version, and the
/// stage input. Identical logical inputs always produce identical keys because `serde_json`
/// objects serialize with sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);
impl CacheKey {
	pub fn for_stage(agent: AgentKind, input: &Value) -> Self {
		let payload = serde_json::json!({
			"agent": agent.as_str(),
			"schema_version": agent.schema_version(),
			"input": input,
		});
		let digest = blake3::hash(payload.to_string().as_bytes());

		Self(format!("{}:{}", agent.as_str(), digest.to_hex()))
	}

	pub fn attachment(request_id: Uuid, agent: AgentKind) -> Self {
		Self(format!("attachment:{}:{}", agent.as_str(), request_id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn prefix(&self) -> &str {
		cache_key_prefix(&self.0)
	}
}
impl fmt::Display for CacheKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Namespace plus the first 12 characters of the digest, for logs.
pub fn cache_key_prefix(key: &str) -> &str {
	let start = key.rfind(':').map(|idx| idx + 1).unwrap_or(0);
	let end = key.len().min(start + 12);

	&key[..end]
}
