pub mod agent;
pub mod cache_key;
pub mod confidence;
pub mod exchange;
pub mod normalize;
pub mod pipeline;
pub mod schema;

pub use agent::{AgentKind, AgentProfile, Tier};
pub use cache_key::{CacheKey, cache_key_prefix};
pub use confidence::{ConfidenceEvaluator, Verdict};
pub use exchange::{AgentReply, AgentRequest, AgentResponse, TokenUsage, Validation};
pub use normalize::normalize_query;
pub use pipeline::{PipelineQuery, RankedItem, RecommendQuery, TierMode};
pub use schema::{
	AgentOutput, ClarificationOutput, CompositionOutput, ExplanationOutput, GroundingContext,
	IntentLabel, IntentOutput, ItemExplanation, RewriteOutput, SchemaViolation,
};
