use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use orca_domain::{PipelineQuery, RankedItem, RecommendQuery};

use crate::{Error, Result};

/// HTTP client for the deterministic retrieval and ranking service.
#[derive(Clone)]
pub struct PipelineClient {
	client: Client,
	search_url: String,
	recommend_url: String,
}
impl PipelineClient {
	pub fn new(cfg: &orca_config::PipelineConfig) -> Result<Self> {
		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.default_headers(crate::extra_headers(&cfg.default_headers)?)
			.build()?;
		let base = cfg.api_base.trim_end_matches('/');

		Ok(Self {
			client,
			search_url: format!("{base}{}", cfg.search_path),
			recommend_url: format!("{base}{}", cfg.recommend_path),
		})
	}

	pub async fn search(&self, query: &PipelineQuery) -> Result<Vec<RankedItem>> {
		let res = self.client.post(&self.search_url).json(query).send().await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_ranked_response(json)
	}

	pub async fn recommend(&self, query: &RecommendQuery) -> Result<Vec<RankedItem>> {
		let res = self.client.post(&self.recommend_url).json(query).send().await?;
		let json: Value = res.error_for_status()?.json().await?;

		parse_ranked_response(json)
	}
}

fn parse_ranked_response(json: Value) -> Result<Vec<RankedItem>> {
	let results = json
		.get("items")
		.or_else(|| json.get("results"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Pipeline response is missing an items array.".to_string(),
		})?;
	let mut items = Vec::with_capacity(results.len());

	for entry in results {
		let item_id = entry
			.get("item_id")
			.or_else(|| entry.get("product_id"))
			.and_then(|v| match v {
				Value::String(id) => Some(id.clone()),
				Value::Number(id) => Some(id.to_string()),
				_ => None,
			})
			.ok_or_else(|| Error::InvalidResponse {
				message: "Pipeline item is missing item_id.".to_string(),
			})?;
		let score = entry.get("score").and_then(|v| v.as_f64()).ok_or_else(|| {
			Error::InvalidResponse { message: "Pipeline item is missing score.".to_string() }
		})? as f32;
		let reason = entry.get("reason").and_then(|v| v.as_str()).map(str::to_string);

		items.push(RankedItem { item_id, score, reason });
	}

	Ok(items)
}
