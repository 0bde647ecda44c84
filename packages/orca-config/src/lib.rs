mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	AgentConfig, Agents, Attachments, Breaker, Confidence, Config, Orchestrator, PipelineConfig,
	Postgres, Service, Storage, TransportConfig,
};

use std::{fs, path::Path};

/// Upper bound for `orchestrator.request_budget_ms` and per-request budgets.
pub const MAX_REQUEST_BUDGET_MS: u64 = 60_000;
/// Upper bound for `agents.*.deadline_ms`.
pub const MAX_DEADLINE_MS: u64 = 600_000;
/// Upper bound for `agents.*.cache_ttl_secs` and `attachments.ttl_secs`. Thirty days.
pub const MAX_TTL_SECS: u64 = 2_592_000;

const TIER_MODES: [&str; 3] = ["deterministic", "rewrite", "full"];
const ATTACHMENT_KINDS: [&str; 2] = ["explanation", "composition"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("transport.api_base", &cfg.transport.api_base),
		("transport.model", &cfg.transport.model),
		("pipeline.api_base", &cfg.pipeline.api_base),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	validate_storage(cfg)?;

	if !cfg.transport.temperature.is_finite() || cfg.transport.temperature < 0.0 {
		return Err(Error::Validation {
			message: "transport.temperature must be a finite number, zero or greater.".to_string(),
		});
	}
	if let Some(rate) = cfg.transport.cost_per_1k_tokens
		&& !(rate.is_finite() && rate >= 0.0)
	{
		return Err(Error::Validation {
			message: "transport.cost_per_1k_tokens must be a finite number, zero or greater."
				.to_string(),
		});
	}
	if cfg.pipeline.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "pipeline.timeout_ms must be greater than zero.".to_string(),
		});
	}

	validate_orchestrator(cfg)?;

	for (name, agent) in [
		("intent", &cfg.agents.intent),
		("rewrite", &cfg.agents.rewrite),
		("clarification", &cfg.agents.clarification),
	] {
		validate_agent(name, agent)?;

		let Some(deadline_ms) = agent.deadline_ms else {
			return Err(Error::Validation {
				message: format!("agents.{name}.deadline_ms is required for Tier-1 agents."),
			});
		};

		if deadline_ms > cfg.orchestrator.request_budget_ms {
			return Err(Error::Validation {
				message: format!(
					"agents.{name}.deadline_ms must not exceed orchestrator.request_budget_ms."
				),
			});
		}
	}
	for (name, agent) in
		[("composition", &cfg.agents.composition), ("explanation", &cfg.agents.explanation)]
	{
		validate_agent(name, agent)?;
	}

	validate_breaker(cfg)?;

	if !(0.0..=1.0).contains(&cfg.confidence.threshold) {
		return Err(Error::Validation {
			message: "confidence.threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.attachments.ttl_secs == 0 {
		return Err(Error::Validation {
			message: "attachments.ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.attachments.ttl_secs > MAX_TTL_SECS {
		return Err(Error::Validation {
			message: format!("attachments.ttl_secs must not exceed {MAX_TTL_SECS}."),
		});
	}
	if cfg.attachments.max_in_flight == 0 {
		return Err(Error::Validation {
			message: "attachments.max_in_flight must be greater than zero.".to_string(),
		});
	}

	for kind in &cfg.attachments.kinds {
		if !ATTACHMENT_KINDS.contains(&kind.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"attachments.kinds contains {kind:?}; expected explanation or composition."
				),
			});
		}
	}

	Ok(())
}

fn validate_storage(cfg: &Config) -> Result<()> {
	match cfg.storage.backend.as_str() {
		"memory" => {},
		"postgres" => {
			let Some(postgres) = cfg.storage.postgres.as_ref() else {
				return Err(Error::MissingSection { section: "storage.postgres" });
			};

			if postgres.dsn.trim().is_empty() {
				return Err(Error::Validation {
					message: "storage.postgres.dsn must be non-empty.".to_string(),
				});
			}
			if postgres.pool_max_conns == 0 {
				return Err(Error::Validation {
					message: "storage.postgres.pool_max_conns must be greater than zero."
						.to_string(),
				});
			}
		},
		_ => {
			return Err(Error::Validation {
				message: "storage.backend must be one of memory or postgres.".to_string(),
			});
		},
	}

	if cfg.storage.max_entries == 0 {
		return Err(Error::Validation {
			message: "storage.max_entries must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.purge_interval_secs == 0 {
		return Err(Error::Validation {
			message: "storage.purge_interval_secs must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_orchestrator(cfg: &Config) -> Result<()> {
	let orchestrator = &cfg.orchestrator;

	if orchestrator.request_budget_ms == 0 {
		return Err(Error::Validation {
			message: "orchestrator.request_budget_ms must be greater than zero.".to_string(),
		});
	}
	if orchestrator.request_budget_ms > MAX_REQUEST_BUDGET_MS {
		return Err(Error::Validation {
			message: format!(
				"orchestrator.request_budget_ms must not exceed {MAX_REQUEST_BUDGET_MS}."
			),
		});
	}
	if !TIER_MODES.contains(&orchestrator.default_tier.as_str()) {
		return Err(Error::Validation {
			message: "orchestrator.default_tier must be one of deterministic, rewrite, or full."
				.to_string(),
		});
	}
	if orchestrator.default_k == 0 {
		return Err(Error::Validation {
			message: "orchestrator.default_k must be greater than zero.".to_string(),
		});
	}
	if orchestrator.max_k < orchestrator.default_k {
		return Err(Error::Validation {
			message: "orchestrator.max_k must be at least orchestrator.default_k.".to_string(),
		});
	}
	if orchestrator.clarification_fallback_prompt.trim().is_empty() {
		return Err(Error::Validation {
			message: "orchestrator.clarification_fallback_prompt must be non-empty.".to_string(),
		});
	}

	Ok(())
}

fn validate_agent(name: &str, agent: &AgentConfig) -> Result<()> {
	if let Some(deadline_ms) = agent.deadline_ms {
		if deadline_ms == 0 {
			return Err(Error::Validation {
				message: format!("agents.{name}.deadline_ms must be greater than zero."),
			});
		}
		if deadline_ms > MAX_DEADLINE_MS {
			return Err(Error::Validation {
				message: format!("agents.{name}.deadline_ms must not exceed {MAX_DEADLINE_MS}."),
			});
		}
	}
	if agent.max_tokens == 0 {
		return Err(Error::Validation {
			message: format!("agents.{name}.max_tokens must be greater than zero."),
		});
	}
	if agent.cache_ttl_secs == 0 {
		return Err(Error::Validation {
			message: format!("agents.{name}.cache_ttl_secs must be greater than zero."),
		});
	}
	if agent.cache_ttl_secs > MAX_TTL_SECS {
		return Err(Error::Validation {
			message: format!("agents.{name}.cache_ttl_secs must not exceed {MAX_TTL_SECS}."),
		});
	}
	if let Some(min_confidence) = agent.min_confidence
		&& !(0.0..=1.0).contains(&min_confidence)
	{
		return Err(Error::Validation {
			message: format!("agents.{name}.min_confidence must be in the range 0.0-1.0."),
		});
	}

	Ok(())
}

fn validate_breaker(cfg: &Config) -> Result<()> {
	let breaker = &cfg.breaker;

	if breaker.window_secs == 0 {
		return Err(Error::Validation {
			message: "breaker.window_secs must be greater than zero.".to_string(),
		});
	}
	if !(breaker.error_rate_threshold > 0.0 && breaker.error_rate_threshold <= 1.0) {
		return Err(Error::Validation {
			message: "breaker.error_rate_threshold must be in the range (0.0, 1.0].".to_string(),
		});
	}
	if breaker.min_samples == 0 {
		return Err(Error::Validation {
			message: "breaker.min_samples must be greater than zero.".to_string(),
		});
	}
	if breaker.cooldown_secs == 0 {
		return Err(Error::Validation {
			message: "breaker.cooldown_secs must be greater than zero.".to_string(),
		});
	}
	if !(breaker.half_open_probe_ratio > 0.0 && breaker.half_open_probe_ratio <= 1.0) {
		return Err(Error::Validation {
			message: "breaker.half_open_probe_ratio must be in the range (0.0, 1.0].".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.storage.backend = cfg.storage.backend.trim().to_ascii_lowercase();
	cfg.orchestrator.default_tier = cfg.orchestrator.default_tier.trim().to_ascii_lowercase();

	let mut fields = Vec::with_capacity(cfg.orchestrator.filter_fields.len());

	for field in cfg.orchestrator.filter_fields.drain(..) {
		let field = field.trim().to_string();

		if !field.is_empty() && !fields.contains(&field) {
			fields.push(field);
		}
	}

	cfg.orchestrator.filter_fields = fields;

	for kind in &mut cfg.attachments.kinds {
		*kind = kind.trim().to_ascii_lowercase();
	}

	if cfg.storage.postgres.as_ref().map(|pg| pg.dsn.trim().is_empty()).unwrap_or(false)
		&& cfg.storage.backend == "memory"
	{
		cfg.storage.postgres = None;
	}
}
