use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::AgentKind;

const MAX_QUERY_CHARS: usize = 512;
const MAX_TEXT_CHARS: usize = 2_000;
const MAX_BOOSTS: usize = 16;
const MAX_FILTERS: usize = 16;
const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{agent} output violates its schema: {message}")]
pub struct SchemaViolation {
	pub agent: AgentKind,
	pub message: String,
}

/// Everything the agent was shown in the same call. Output may reference nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingContext {
	pub item_ids: BTreeSet<String>,
	pub filter_fields: BTreeSet<String>,
}
impl GroundingContext {
	pub fn with_item_ids<I, S>(mut self, ids: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.item_ids.extend(ids.into_iter().map(Into::into));

		self
	}

	pub fn with_filter_fields<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.filter_fields.extend(fields.into_iter().map(Into::into));

		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
	Search,
	Recommend,
	Question,
	Clarify,
}
impl IntentLabel {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Search => "search",
			Self::Recommend => "recommend",
			Self::Question => "question",
			Self::Clarify => "clarify",
		}
	}

	fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"search" => Some(Self::Search),
			"recommend" => Some(Self::Recommend),
			"question" => Some(Self::Question),
			"clarify" => Some(Self::Clarify),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentOutput {
	pub intent: IntentLabel,
	pub confidence: f32,
	pub needs_clarification: bool,
	pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteOutput {
	pub normalized_query: String,
	pub filters: Map<String, Value>,
	pub boosts: Vec<String>,
	pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationOutput {
	pub question: String,
	pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionOutput {
	pub summary: String,
	pub cited_ids: Vec<String>,
	pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemExplanation {
	pub item_id: String,
	pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationOutput {
	pub explanations: Vec<ItemExplanation>,
	pub confidence: f32,
}

/// A payload that passed structural and grounding checks.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
	Intent(IntentOutput),
	Rewrite(RewriteOutput),
	Clarification(ClarificationOutput),
	Composition(CompositionOutput),
	Explanation(ExplanationOutput),
}
impl AgentOutput {
	pub fn kind(&self) -> AgentKind {
		match self {
			Self::Intent(_) => AgentKind::Intent,
			Self::Rewrite(_) => AgentKind::Rewrite,
			Self::Clarification(_) => AgentKind::Clarification,
			Self::Composition(_) => AgentKind::Composition,
			Self::Explanation(_) => AgentKind::Explanation,
		}
	}

	pub fn confidence(&self) -> f32 {
		match self {
			Self::Intent(output) => output.confidence,
			Self::Rewrite(output) => output.confidence,
			Self::Clarification(output) => output.confidence,
			Self::Composition(output) => output.confidence,
			Self::Explanation(output) => output.confidence,
		}
	}

	/// Canonical JSON form, which is what gets cached.
	pub fn to_payload(&self) -> Value {
		let encoded = match self {
			Self::Intent(output) => serde_json::to_value(output),
			Self::Rewrite(output) => serde_json::to_value(output),
			Self::Clarification(output) => serde_json::to_value(output),
			Self::Composition(output) => serde_json::to_value(output),
			Self::Explanation(output) => serde_json::to_value(output),
		};

		encoded.unwrap_or(Value::Null)
	}
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIntent {
	intent: String,
	confidence: f64,
	#[serde(default)]
	needs_clarification: bool,
	#[serde(default)]
	language: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRewrite {
	normalized_query: String,
	#[serde(default)]
	filters: Map<String, Value>,
	#[serde(default)]
	boosts: Vec<String>,
	confidence: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClarification {
	question: String,
	confidence: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawComposition {
	summary: String,
	#[serde(default)]
	cited_ids: Vec<String>,
	confidence: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExplanation {
	explanations: Vec<RawItemExplanation>,
	confidence: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawItemExplanation {
	item_id: String,
	reason: String,
}

/// Structural conformance first, then grounding against `grounding`.
pub fn validate(
	agent: AgentKind,
	payload: &Value,
	grounding: &GroundingContext,
) -> Result<AgentOutput, SchemaViolation> {
	let violation = |message: String| SchemaViolation { agent, message };

	match agent {
		AgentKind::Intent => {
			let raw: RawIntent = decode(agent, payload)?;
			let intent = IntentLabel::parse(&raw.intent).ok_or_else(|| {
				violation(format!(
					"intent {:?} must be one of search, recommend, question, or clarify.",
					raw.intent
				))
			})?;
			let language = match raw.language.as_deref().map(str::trim) {
				None | Some("") => DEFAULT_LANGUAGE.to_string(),
				Some(tag) if is_language_tag(tag) => tag.to_ascii_lowercase(),
				Some(tag) => {
					return Err(violation(format!("language {tag:?} is not a language tag.")));
				},
			};

			Ok(AgentOutput::Intent(IntentOutput {
				intent,
				confidence: confidence(agent, raw.confidence)?,
				needs_clarification: raw.needs_clarification,
				language,
			}))
		},
		AgentKind::Rewrite => {
			let raw: RawRewrite = decode(agent, payload)?;
			let normalized_query =
				bounded_text(agent, "normalized_query", &raw.normalized_query, MAX_QUERY_CHARS)?;

			if raw.filters.len() > MAX_FILTERS {
				return Err(violation(format!("filters must hold at most {MAX_FILTERS} entries.")));
			}

			for (field, value) in &raw.filters {
				if !grounding.filter_fields.contains(field) {
					return Err(violation(format!("filter field {field:?} was not offered.")));
				}
				if !is_filter_value(value) {
					return Err(violation(format!(
						"filter {field:?} must be a scalar or an array of scalars."
					)));
				}
			}

			if raw.boosts.len() > MAX_BOOSTS {
				return Err(violation(format!("boosts must hold at most {MAX_BOOSTS} terms.")));
			}

			let mut boosts = Vec::with_capacity(raw.boosts.len());

			for boost in &raw.boosts {
				boosts.push(bounded_text(agent, "boosts", boost, MAX_QUERY_CHARS)?);
			}

			Ok(AgentOutput::Rewrite(RewriteOutput {
				normalized_query,
				filters: raw.filters,
				boosts,
				confidence: confidence(agent, raw.confidence)?,
			}))
		},
		AgentKind::Clarification => {
			let raw: RawClarification = decode(agent, payload)?;

			Ok(AgentOutput::Clarification(ClarificationOutput {
				question: bounded_text(agent, "question", &raw.question, MAX_TEXT_CHARS)?,
				confidence: confidence(agent, raw.confidence)?,
			}))
		},
		AgentKind::Composition => {
			let raw: RawComposition = decode(agent, payload)?;

			for id in &raw.cited_ids {
				if !grounding.item_ids.contains(id) {
					return Err(violation(format!("cited id {id:?} was not supplied.")));
				}
			}

			Ok(AgentOutput::Composition(CompositionOutput {
				summary: bounded_text(agent, "summary", &raw.summary, MAX_TEXT_CHARS)?,
				cited_ids: raw.cited_ids,
				confidence: confidence(agent, raw.confidence)?,
			}))
		},
		AgentKind::Explanation => {
			let raw: RawExplanation = decode(agent, payload)?;

			if raw.explanations.is_empty() {
				return Err(violation("explanations must be non-empty.".to_string()));
			}

			let mut seen = BTreeSet::new();
			let mut explanations = Vec::with_capacity(raw.explanations.len());

			for item in raw.explanations {
				if !grounding.item_ids.contains(&item.item_id) {
					return Err(violation(format!("item id {:?} was not supplied.", item.item_id)));
				}
				if !seen.insert(item.item_id.clone()) {
					return Err(violation(format!("item id {:?} is explained twice.", item.item_id)));
				}

				explanations.push(ItemExplanation {
					reason: bounded_text(agent, "reason", &item.reason, MAX_TEXT_CHARS)?,
					item_id: item.item_id,
				});
			}

			Ok(AgentOutput::Explanation(ExplanationOutput {
				explanations,
				confidence: confidence(agent, raw.confidence)?,
			}))
		},
	}
}

fn decode<T>(agent: AgentKind, payload: &Value) -> Result<T, SchemaViolation>
where
	T: DeserializeOwned,
{
	serde_json::from_value(payload.clone()).map_err(|err| SchemaViolation {
		agent,
		message: format!("payload does not match the {agent} schema: {err}."),
	})
}

fn confidence(agent: AgentKind, raw: f64) -> Result<f32, SchemaViolation> {
	if !raw.is_finite() || !(0.0..=1.0).contains(&raw) {
		return Err(SchemaViolation {
			agent,
			message: "confidence must be a finite number in the range 0.0-1.0.".to_string(),
		});
	}

	Ok(raw as f32)
}

fn bounded_text(
	agent: AgentKind,
	field: &str,
	raw: &str,
	max_chars: usize,
) -> Result<String, SchemaViolation> {
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return Err(SchemaViolation { agent, message: format!("{field} must be non-empty.") });
	}
	if trimmed.chars().count() > max_chars {
		return Err(SchemaViolation {
			agent,
			message: format!("{field} must be at most {max_chars} characters."),
		});
	}

	Ok(trimmed.to_string())
}

fn is_filter_value(value: &Value) -> bool {
	match value {
		Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
		Value::Array(items) => items
			.iter()
			.all(|item| matches!(item, Value::String(_) | Value::Number(_) | Value::Bool(_))),
		Value::Null | Value::Object(_) => false,
	}
}

fn is_language_tag(tag: &str) -> bool {
	Regex::new(r"^(?i)[a-z]{2,3}(-[a-z0-9]{2,8})*$").map(|re| re.is_match(tag)).unwrap_or(false)
}
