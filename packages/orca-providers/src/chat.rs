use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use orca_domain::{AgentReply, TokenUsage};

use crate::{Error, Result};

/// OpenAI-compatible chat completion client that expects a JSON object back.
#[derive(Clone)]
pub struct ChatClient {
	client: Client,
	cfg: orca_config::TransportConfig,
	url: String,
}
impl ChatClient {
	pub fn new(cfg: &orca_config::TransportConfig) -> Result<Self> {
		let client = Client::builder()
			.default_headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.build()?;
		let url = format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path);

		Ok(Self { client, cfg: cfg.clone(), url })
	}

	/// `timeout` bounds the HTTP exchange only. Callers enforce their own deadline on top.
	pub async fn complete_json(
		&self,
		messages: &[Value],
		max_tokens: u32,
		timeout: Option<Duration>,
	) -> Result<AgentReply> {
		let body = serde_json::json!({
			"model": self.cfg.model,
			"temperature": self.cfg.temperature,
			"max_tokens": max_tokens,
			"response_format": { "type": "json_object" },
			"messages": messages,
		});
		let mut request = self.client.post(&self.url).json(&body);

		if let Some(timeout) = timeout {
			request = request.timeout(timeout);
		}

		let res = request.send().await?;
		let json: Value = res.error_for_status()?.json().await?;
		let usage = parse_usage(&json);

		Ok(AgentReply { payload: parse_chat_json(json)?, usage })
	}
}

/// Missing counters read as zero. A response without a `usage` block reports nothing.
fn parse_usage(json: &Value) -> Option<TokenUsage> {
	let usage = json.get("usage")?.as_object()?;
	let count = |field: &str| usage.get(field).and_then(Value::as_u64).unwrap_or(0);

	Some(TokenUsage {
		prompt_tokens: count("prompt_tokens"),
		completion_tokens: count("completion_tokens"),
	})
}

fn parse_chat_json(json: Value) -> Result<Value> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		let parsed: Value = serde_json::from_str(strip_code_fence(content)).map_err(|_| {
			Error::InvalidResponse { message: "Chat content is not valid JSON.".to_string() }
		})?;

		if !parsed.is_object() {
			return Err(Error::InvalidResponse {
				message: "Chat content must be a JSON object.".to_string(),
			});
		}

		return Ok(parsed);
	}

	if json.is_object() && json.get("choices").is_none() {
		return Ok(json);
	}

	Err(Error::InvalidResponse { message: "Chat response is missing JSON content.".to_string() })
}

fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(inner) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let inner = inner.strip_prefix("json").unwrap_or(inner);

	inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_choice_content_json() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "{\"normalized_query\": \"running shoes\", \"confidence\": 0.9}" } }
			]
		});
		let parsed = parse_chat_json(json).expect("parse failed");

		assert_eq!(parsed["normalized_query"], "running shoes");
	}

	#[test]
	fn strips_markdown_fences() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "```json\n{\"question\": \"Which size?\", \"confidence\": 0.8}\n```" } }
			]
		});
		let parsed = parse_chat_json(json).expect("parse failed");

		assert_eq!(parsed["question"], "Which size?");
	}

	#[test]
	fn rejects_non_object_content() {
		let json = serde_json::json!({
			"choices": [ { "message": { "content": "[1, 2, 3]" } } ]
		});

		assert!(matches!(parse_chat_json(json), Err(Error::InvalidResponse { .. })));
	}

	#[test]
	fn reads_usage_counters() {
		let json = serde_json::json!({
			"choices": [],
			"usage": { "prompt_tokens": 42, "total_tokens": 42 }
		});

		assert_eq!(parse_usage(&json), Some(TokenUsage { prompt_tokens: 42, completion_tokens: 0 }));
		assert_eq!(parse_usage(&serde_json::json!({ "choices": [] })), None);
	}

	#[test]
	fn rejects_empty_choices() {
		let json = serde_json::json!({ "choices": [] });

		assert!(parse_chat_json(json).is_err());
	}
}
