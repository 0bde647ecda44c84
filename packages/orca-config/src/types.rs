use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub transport: TransportConfig,
	pub pipeline: PipelineConfig,
	pub agents: Agents,
	#[serde(default)]
	pub breaker: Breaker,
	#[serde(default)]
	pub confidence: Confidence,
	pub orchestrator: Orchestrator,
	#[serde(default)]
	pub attachments: Attachments,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	/// One of "memory" or "postgres".
	pub backend: String,
	#[serde(default = "default_max_entries")]
	pub max_entries: usize,
	#[serde(default = "default_purge_interval_secs")]
	pub purge_interval_secs: u64,
	/// Required when `backend = "postgres"`.
	pub postgres: Option<Postgres>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

/// OpenAI-compatible chat completion endpoint shared by every agent.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	/// USD per 1,000 prompt plus completion tokens. Unset disables cost accounting.
	#[serde(default)]
	pub cost_per_1k_tokens: Option<f64>,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
	pub api_base: String,
	pub search_path: String,
	pub recommend_path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Agents {
	pub intent: AgentConfig,
	pub rewrite: AgentConfig,
	pub clarification: AgentConfig,
	pub composition: AgentConfig,
	pub explanation: AgentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Required for Tier-1 agents. Tier-2 agents run unbounded when absent.
	pub deadline_ms: Option<u64>,
	pub max_tokens: u32,
	pub cache_ttl_secs: u64,
	/// Overrides `confidence.threshold` for this agent.
	pub min_confidence: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Breaker {
	pub window_secs: u64,
	pub error_rate_threshold: f32,
	pub min_samples: u32,
	pub cooldown_secs: u64,
	pub half_open_probe_ratio: f32,
}
impl Default for Breaker {
	fn default() -> Self {
		Self {
			window_secs: 60,
			error_rate_threshold: 0.5,
			min_samples: 10,
			cooldown_secs: 30,
			half_open_probe_ratio: 0.1,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Confidence {
	pub threshold: f32,
}
impl Default for Confidence {
	fn default() -> Self {
		Self { threshold: 0.7 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Orchestrator {
	pub request_budget_ms: u64,
	/// One of "deterministic", "rewrite", or "full".
	pub default_tier: String,
	pub default_k: u32,
	pub max_k: u32,
	/// Filter keys a rewrite is allowed to emit.
	#[serde(default)]
	pub filter_fields: Vec<String>,
	#[serde(default = "default_clarification_prompt")]
	pub clarification_fallback_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Attachments {
	pub enabled: bool,
	pub ttl_secs: u64,
	pub max_in_flight: usize,
	pub kinds: Vec<String>,
}
impl Default for Attachments {
	fn default() -> Self {
		Self {
			enabled: true,
			ttl_secs: 300,
			max_in_flight: 64,
			kinds: vec!["explanation".to_string(), "composition".to_string()],
		}
	}
}

fn default_true() -> bool {
	true
}

fn default_max_entries() -> usize {
	100_000
}

fn default_purge_interval_secs() -> u64 {
	300
}

fn default_clarification_prompt() -> String {
	"Could you tell me a bit more about what you are looking for?".to_string()
}
