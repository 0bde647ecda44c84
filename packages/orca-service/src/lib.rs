pub mod agent;
pub mod attachments;
pub mod breaker;
pub mod decision;
pub mod error;
pub mod profiles;
pub mod recommend;
pub mod request;
pub mod search;
pub mod telemetry;

mod dispatch;
mod prompts;

use std::{sync::Arc, time::Duration};

use uuid::Uuid;

pub use agent::{AgentClient, AgentError};
pub use attachments::{Attachment, AttachmentStatus, AttachmentsResponse};
pub use breaker::{BreakerSettings, BreakerSnapshot, CircuitState};
pub use decision::{Decision, FallbackReason};
pub use error::{Error, Result};
use orca_config::Config;
use orca_domain::{AgentReply, AgentRequest, PipelineQuery, RankedItem, RecommendQuery};
use orca_providers::{chat::ChatClient, pipeline::PipelineClient};
pub use orca_storage::BoxFuture;
use orca_storage::CacheStore;
pub use profiles::AgentProfiles;
pub use recommend::RecommendResponse;
pub use request::{RecommendRequest, SearchRequest};
pub use search::SearchResponse;
pub use telemetry::Telemetry;

use crate::{
	attachments::{AttachmentManager, AttachmentSettings},
	breaker::BreakerRegistry,
	dispatch::Dispatcher,
};

/// Sends one agent request and returns the raw JSON object the model produced, with token usage
/// when the provider reports it.
///
/// `timeout` is the time left before the caller's deadline. Implementations may use it to bound
/// their own I/O. The caller enforces the deadline regardless.
pub trait AgentTransport
where
	Self: Send + Sync,
{
	fn invoke<'a>(
		&'a self,
		request: &'a AgentRequest,
		timeout: Option<Duration>,
	) -> BoxFuture<'a, Result<AgentReply, AgentError>>;
}

/// The retrieval and ranking path that serves every request with or without agents.
pub trait DeterministicPipeline
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, query: &'a PipelineQuery) -> BoxFuture<'a, Result<Vec<RankedItem>>>;

	fn recommend<'a>(
		&'a self,
		query: &'a RecommendQuery,
	) -> BoxFuture<'a, Result<Vec<RankedItem>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub transport: Arc<dyn AgentTransport>,
	pub pipeline: Arc<dyn DeterministicPipeline>,
}
impl Providers {
	/// HTTP clients for the configured chat endpoint and pipeline service.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		Ok(Self {
			transport: Arc::new(ChatClient::new(&cfg.transport)?),
			pipeline: Arc::new(PipelineClient::new(&cfg.pipeline)?),
		})
	}
}

pub struct OrcaService {
	pub cfg: Config,
	pub(crate) pipeline: Arc<dyn DeterministicPipeline>,
	pub(crate) dispatcher: Dispatcher,
	pub(crate) attachments: AttachmentManager,
	pub(crate) breakers: Arc<BreakerRegistry>,
	pub(crate) telemetry: Telemetry,
}
impl OrcaService {
	pub fn new(cfg: Config, cache: Arc<dyn CacheStore>) -> Result<Self> {
		let providers = Providers::from_config(&cfg)?;

		Self::with_providers(cfg, cache, providers)
	}

	pub fn with_providers(
		cfg: Config,
		cache: Arc<dyn CacheStore>,
		providers: Providers,
	) -> Result<Self> {
		let telemetry = Telemetry::new()?;
		let breakers =
			Arc::new(BreakerRegistry::new(&BreakerSettings::from_config(&cfg.breaker), &telemetry));
		let dispatcher = Dispatcher {
			cache,
			client: AgentClient::new(providers.transport),
			breakers: breakers.clone(),
			profiles: Arc::new(AgentProfiles::from_config(&cfg)),
			telemetry: telemetry.clone(),
			cost_per_1k: cfg.transport.cost_per_1k_tokens,
		};
		let attachments = AttachmentManager::new(
			dispatcher.clone(),
			AttachmentSettings::from_config(&cfg.attachments),
			cfg.attachments.max_in_flight,
		);

		Ok(Self {
			cfg,
			pipeline: providers.pipeline,
			dispatcher,
			attachments,
			breakers,
			telemetry,
		})
	}

	pub async fn attachments(&self, request_id: Uuid) -> Result<AttachmentsResponse> {
		let attachments = self.attachments.collect(request_id).await?;

		Ok(AttachmentsResponse { request_id, attachments })
	}

	pub fn breakers(&self) -> Vec<BreakerSnapshot> {
		self.breakers.snapshot()
	}

	pub fn telemetry(&self) -> &Telemetry {
		&self.telemetry
	}
}

impl AgentTransport for ChatClient {
	fn invoke<'a>(
		&'a self,
		request: &'a AgentRequest,
		timeout: Option<Duration>,
	) -> BoxFuture<'a, Result<AgentReply, AgentError>> {
		Box::pin(async move {
			self.complete_json(&request.messages, request.max_tokens, timeout)
				.await
				.map_err(agent_error)
		})
	}
}

fn agent_error(err: orca_providers::Error) -> AgentError {
	match err {
		err if err.is_timeout() => AgentError::Timeout,
		orca_providers::Error::InvalidResponse { message } =>
			AgentError::InvalidResponse { message },
		err => AgentError::Transport { message: err.to_string() },
	}
}

impl DeterministicPipeline for PipelineClient {
	fn search<'a>(&'a self, query: &'a PipelineQuery) -> BoxFuture<'a, Result<Vec<RankedItem>>> {
		Box::pin(async move {
			PipelineClient::search(self, query)
				.await
				.map_err(|err| Error::Pipeline { message: err.to_string() })
		})
	}

	fn recommend<'a>(
		&'a self,
		query: &'a RecommendQuery,
	) -> BoxFuture<'a, Result<Vec<RankedItem>>> {
		Box::pin(async move {
			PipelineClient::recommend(self, query)
				.await
				.map_err(|err| Error::Pipeline { message: err.to_string() })
		})
	}
}
