use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::Redirect,
};
use serde::Deserialize;

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::OutputFormat;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitParams {
    pub query: Option<String>,
}

/// Submit a query and redirect to the job.
pub async fn create_async_query(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    headers: HeaderMap,
    body: String,
) -> Result<Redirect, AppError> {
    let query = query_text(params, &headers, &body)?;
    let job = state.query_service.submit(&query, format(&headers)).await?;
    Ok(Redirect::to(&format!("/async/{}", job.id)))
}

/// Submit a query and redirect straight to its result, which blocks until the
/// job finishes.
pub async fn create_sync_query(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    headers: HeaderMap,
    body: String,
) -> Result<Redirect, AppError> {
    let query = query_text(params, &headers, &body)?;
    let job = state.query_service.submit(&query, format(&headers)).await?;
    Ok(Redirect::to(&format!("/async/{}/results/result", job.id)))
}

fn format(headers: &HeaderMap) -> OutputFormat {
    OutputFormat::from_accept(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()))
}

/// The `query` parameter from the URL or a form body, otherwise the raw body.
fn query_text(params: SubmitParams, headers: &HeaderMap, body: &str) -> Result<String, AppError> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    let query = params.query.or_else(|| {
        if is_form {
            url::form_urlencoded::parse(body.as_bytes())
                .find(|(key, _)| key == "query")
                .map(|(_, value)| value.into_owned())
        } else {
            Some(body.to_string())
        }
    });

    match query {
        Some(query) if !query.trim().is_empty() => Ok(query),
        _ => Err(AppError::InvalidSql("SQL query cannot be empty".to_string())),
    }
}
