use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orca_domain::{AgentKind, RankedItem, RecommendQuery};

use crate::{
	Decision, Error, FallbackReason, OrcaService, RecommendRequest, Result,
	attachments::EnrichmentContext, request,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
	pub request_id: Uuid,
	#[serde(flatten)]
	pub decision: Decision,
	pub items: Vec<RankedItem>,
	pub attachments: Vec<AgentKind>,
}

impl OrcaService {
	/// Recommendations never need Tier-1. Ranking comes straight from the pipeline and Tier-2 may
	/// explain it afterwards.
	pub async fn recommend(&self, req: RecommendRequest) -> Result<RecommendResponse> {
		let user_id = req.user_id.trim().to_string();

		if user_id.is_empty() {
			return Err(Error::InvalidRequest { message: "user_id must not be empty.".to_string() });
		}

		let request_id = Uuid::new_v4();
		let k = request::resolve_k(req.k, &self.cfg)?;
		let query = RecommendQuery { user_id, context: req.context, k };
		let items = match self.pipeline.recommend(&query).await {
			Ok(items) => items,
			Err(err) => {
				self.telemetry.record_pipeline_failure("recommend");
				self.telemetry.record_request("recommend", "failed");
				tracing::error!(%request_id, error = %err, "Recommend pipeline failed.");

				return Err(err);
			},
		};
		let decision = Decision::ServedByFallback { reason: FallbackReason::TierNotRequired };
		let attachments = self.attachments.dispatch(EnrichmentContext {
			request_id,
			query: enrichment_query(&query),
			items: items.clone(),
		});

		self.telemetry.record_request("recommend", decision.as_str());
		tracing::info!(%request_id, items = items.len(), "Recommendations served.");

		Ok(RecommendResponse { request_id, decision, items, attachments })
	}
}

/// Tier-2 prompts need a query. Use the caller's context query when there is one.
fn enrichment_query(query: &RecommendQuery) -> String {
	query
		.context
		.get("query")
		.and_then(|value| value.as_str())
		.map(str::trim)
		.filter(|text| !text.is_empty())
		.map(str::to_string)
		.unwrap_or_else(|| "recommended for you".to_string())
}
