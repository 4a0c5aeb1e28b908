use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{Job, OutputFormat};
use crate::services::result_writer::error_document;

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(state.jobs().get(&id).await?))
}

pub async fn get_phase(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<String, AppError> {
    Ok(state.jobs().phase(&id).await?.to_string())
}

/// The query text as it was submitted.
pub async fn get_parameters(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<String, AppError> {
    Ok(state.jobs().get(&id).await?.parameters)
}

/// The structured error of a failed job, or 204 when the job has none.
pub async fn get_error(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let format = state.jobs().get(&id).await?.format;
    match state.jobs().error(&id).await? {
        Some(error) => Ok(document(StatusCode::OK, format, error_document(format, &error)?)),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Block until the job is finished, then return its result or its error.
///
/// Jobs no longer in memory are still served from their artifacts.
pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let format = match state.jobs().wait_for_completion(&id).await {
        Ok(job) => Some(job.format),
        Err(AppError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    let artifacts = state.jobs().artifacts(&id);
    if let Some(body) = artifacts.read_result().await? {
        let format = format.unwrap_or_else(|| sniff_format(&body));
        return Ok(document(StatusCode::OK, format, body));
    }
    if let Some(error) = artifacts.read_error().await? {
        let format = format.unwrap_or(OutputFormat::Json);
        return Ok(document(StatusCode::BAD_REQUEST, format, error_document(format, &error)?));
    }

    tracing::debug!("No artifacts for query {}", id);
    Err(AppError::NotFound(format!("Query {} not found", id)))
}

fn sniff_format(body: &[u8]) -> OutputFormat {
    if body.starts_with(b"<?xml") {
        OutputFormat::VoTable
    } else {
        OutputFormat::Json
    }
}

fn document(status: StatusCode, format: OutputFormat, body: impl Into<axum::body::Body>) -> Response {
    (status, [(header::CONTENT_TYPE, format.content_type())], body.into()).into_response()
}
