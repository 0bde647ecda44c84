use std::sync::Arc;

use tokio::time::Instant;

use orca_domain::{AgentRequest, AgentResponse};

use crate::AgentTransport;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
	#[error("Agent call exceeded its deadline.")]
	Timeout,
	#[error("Agent transport failed: {message}")]
	Transport { message: String },
	/// The provider answered, but not with a JSON object.
	#[error("Agent returned an unusable response: {message}")]
	InvalidResponse { message: String },
}

/// Wraps a transport with deadline enforcement and schema/grounding validation.
#[derive(Clone)]
pub struct AgentClient {
	transport: Arc<dyn AgentTransport>,
}
impl AgentClient {
	pub fn new(transport: Arc<dyn AgentTransport>) -> Self {
		Self { transport }
	}

	/// Returns `Timeout` without touching the transport when `deadline` has already passed. A call
	/// that outlives the deadline is dropped, and its late result never reaches the caller.
	pub async fn invoke(
		&self,
		request: &AgentRequest,
		deadline: Option<Instant>,
	) -> Result<AgentResponse, AgentError> {
		let reply = match deadline {
			Some(deadline) => {
				let remaining = deadline.saturating_duration_since(Instant::now());

				if remaining.is_zero() {
					return Err(AgentError::Timeout);
				}

				tokio::time::timeout_at(deadline, self.transport.invoke(request, Some(remaining)))
					.await
					.map_err(|_| AgentError::Timeout)??
			},
			None => self.transport.invoke(request, None).await?,
		};

		Ok(AgentResponse::from_reply(request.agent, reply, &request.grounding))
	}
}
