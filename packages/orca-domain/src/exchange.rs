use serde_json::Value;
use uuid::Uuid;

use crate::{
	AgentKind,
	schema::{self, AgentOutput, GroundingContext, SchemaViolation},
};

/// One call to one agent. `grounding` lists everything the messages expose to it.
#[derive(Debug, Clone)]
pub struct AgentRequest {
	pub request_id: Uuid,
	pub agent: AgentKind,
	pub messages: Vec<Value>,
	pub max_tokens: u32,
	pub grounding: GroundingContext,
}

/// Token counts a provider reported for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
	pub prompt_tokens: u64,
	pub completion_tokens: u64,
}
impl TokenUsage {
	pub fn total(&self) -> u64 {
		self.prompt_tokens.saturating_add(self.completion_tokens)
	}
}

/// The JSON object a transport got back, plus usage when the provider reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
	pub payload: Value,
	pub usage: Option<TokenUsage>,
}
impl From<Value> for AgentReply {
	fn from(payload: Value) -> Self {
		Self { payload, usage: None }
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
	Valid(AgentOutput),
	Invalid(SchemaViolation),
}

/// Untrusted until `validation` says otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
	pub agent: AgentKind,
	pub payload: Value,
	pub validation: Validation,
	pub usage: Option<TokenUsage>,
}
impl AgentResponse {
	pub fn from_payload(agent: AgentKind, payload: Value, grounding: &GroundingContext) -> Self {
		Self::from_reply(agent, AgentReply::from(payload), grounding)
	}

	pub fn from_reply(agent: AgentKind, reply: AgentReply, grounding: &GroundingContext) -> Self {
		let AgentReply { payload, usage } = reply;
		let validation = match schema::validate(agent, &payload, grounding) {
			Ok(output) => Validation::Valid(output),
			Err(violation) => Validation::Invalid(violation),
		};

		Self { agent, payload, validation, usage }
	}

	pub fn into_output(self) -> Option<AgentOutput> {
		match self.validation {
			Validation::Valid(output) => Some(output),
			Validation::Invalid(_) => None,
		}
	}

	/// The validated score, or whatever number the agent reported when validation failed.
	pub fn confidence(&self) -> Option<f32> {
		match &self.validation {
			Validation::Valid(output) => Some(output.confidence()),
			Validation::Invalid(_) =>
				self.payload.get("confidence").and_then(Value::as_f64).map(|value| value as f32),
		}
	}
}
