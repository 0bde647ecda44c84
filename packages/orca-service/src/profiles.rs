use std::time::Duration;

use orca_config::{AgentConfig, Config};
use orca_domain::{AgentKind, AgentProfile};

/// Stable array index for per-agent tables.
pub(crate) fn slot(agent: AgentKind) -> usize {
	match agent {
		AgentKind::Intent => 0,
		AgentKind::Rewrite => 1,
		AgentKind::Clarification => 2,
		AgentKind::Composition => 3,
		AgentKind::Explanation => 4,
	}
}

#[derive(Debug, Clone)]
pub struct AgentProfiles {
	profiles: [AgentProfile; 5],
}
impl AgentProfiles {
	pub fn from_config(cfg: &Config) -> Self {
		let threshold = cfg.confidence.threshold;

		Self {
			profiles: AgentKind::ALL
				.map(|kind| profile(kind, agent_config(cfg, kind), threshold)),
		}
	}

	pub fn get(&self, agent: AgentKind) -> &AgentProfile {
		&self.profiles[slot(agent)]
	}
}

fn agent_config(cfg: &Config, kind: AgentKind) -> &AgentConfig {
	match kind {
		AgentKind::Intent => &cfg.agents.intent,
		AgentKind::Rewrite => &cfg.agents.rewrite,
		AgentKind::Clarification => &cfg.agents.clarification,
		AgentKind::Composition => &cfg.agents.composition,
		AgentKind::Explanation => &cfg.agents.explanation,
	}
}

fn profile(kind: AgentKind, agent: &AgentConfig, threshold: f32) -> AgentProfile {
	AgentProfile {
		kind,
		enabled: agent.enabled,
		deadline: agent.deadline_ms.map(Duration::from_millis),
		cache_ttl: Duration::from_secs(agent.cache_ttl_secs),
		max_tokens: agent.max_tokens,
		min_confidence: agent.min_confidence.unwrap_or(threshold),
	}
}
