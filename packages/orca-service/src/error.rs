pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Caller-visible failures. Agent trouble never shows up here; it becomes a fallback decision.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Deterministic pipeline failed: {message}")]
	Pipeline { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Telemetry error: {message}")]
	Telemetry { message: String },
}
impl From<orca_storage::Error> for Error {
	fn from(err: orca_storage::Error) -> Self {
		match err {
			orca_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			orca_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
		}
	}
}

impl From<orca_providers::Error> for Error {
	fn from(err: orca_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<prometheus::Error> for Error {
	fn from(err: prometheus::Error) -> Self {
		Self::Telemetry { message: err.to_string() }
	}
}
