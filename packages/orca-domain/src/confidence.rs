use serde::Serialize;

use crate::exchange::{AgentResponse, Validation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
	Accept,
	LowConfidence,
	Invalid,
}
impl Verdict {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Accept => "accept",
			Self::LowConfidence => "low_confidence",
			Self::Invalid => "invalid",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceEvaluator {
	threshold: f32,
}
impl ConfidenceEvaluator {
	pub fn new(threshold: f32) -> Self {
		Self { threshold }
	}

	pub fn evaluate(&self, response: &AgentResponse) -> Verdict {
		match &response.validation {
			Validation::Invalid(_) => Verdict::Invalid,
			Validation::Valid(output) if output.confidence() < self.threshold =>
				Verdict::LowConfidence,
			Validation::Valid(_) => Verdict::Accept,
		}
	}
}
