use axum::{
	Json, Router,
	extract::{Path, State},
	http::{StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;
use uuid::Uuid;

use orca_service::{
	AttachmentsResponse, BreakerSnapshot, Error, RecommendRequest, RecommendResponse,
	SearchRequest, SearchResponse,
};

use crate::state::AppState;

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.route("/v1/recommend", post(recommend))
		.route("/v1/attachments/{request_id}", get(attachments))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/admin/breakers", get(breakers))
		.route("/metrics", get(metrics))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state.service.search(payload).await?;

	Ok(Json(response))
}

async fn recommend(
	State(state): State<AppState>,
	Json(payload): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>, ApiError> {
	let response = state.service.recommend(payload).await?;

	Ok(Json(response))
}

async fn attachments(
	State(state): State<AppState>,
	Path(request_id): Path<Uuid>,
) -> Result<Json<AttachmentsResponse>, ApiError> {
	let response = state.service.attachments(request_id).await?;

	Ok(Json(response))
}

async fn breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
	Json(state.service.breakers())
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
	let body = state.service.telemetry().render()?;

	Ok(([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			Error::Pipeline { message } =>
				ApiError::new(StatusCode::BAD_GATEWAY, "PIPELINE_UNAVAILABLE", message, None),
			Error::Provider { message } =>
				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "PROVIDER_ERROR", message, None),
			Error::Storage { message } =>
				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message, None),
			Error::Telemetry { message } =>
				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "TELEMETRY_ERROR", message, None),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		if self.status.is_server_error() {
			tracing::error!(error_code = %self.error_code, message = %self.message, "Request failed.");
		}

		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}
