use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use task_queue_core::{TaskError, TaskRequest, TaskType};

use crate::broker::Broker;

/// Every error this surface can produce renders the same way: HTTP 403
/// with the message as a bare JSON string. This is a design choice, not
/// per-error discrimination — see `DESIGN.md`.
struct ApiError(TaskError);

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, Json(self.0.to_string())).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitScriptRequest {
    pub bin_name: String,
    pub args: String,
    pub start_time: String,
    pub time_interval: String,
    pub max_run_time: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRpcRequest {
    pub method: String,
    pub url: String,
    pub args: String,
    pub start_time: String,
    pub time_interval: String,
    pub max_run_time: String,
}

fn parse_numeric<T: std::str::FromStr>(raw: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| ApiError(TaskError::InvalidArgument))
}

async fn submit_script(
    State(broker): State<Arc<Broker>>,
    Json(body): Json<SubmitScriptRequest>,
) -> Result<Json<String>, ApiError> {
    if body.bin_name.is_empty() {
        return Err(ApiError(TaskError::InvalidArgument));
    }

    let request = TaskRequest {
        uuid: TaskRequest::new_uuid(),
        bin_name: body.bin_name,
        args: body.args,
        start_time: parse_numeric(&body.start_time)?,
        time_interval: body.time_interval,
        index: 0,
        max_run_time: parse_numeric(&body.max_run_time)?,
        task_type: TaskType::Script,
    };

    let uuid = request.uuid.clone();
    broker.submit(request).await?;
    Ok(Json(uuid))
}

async fn submit_rpc(
    State(broker): State<Arc<Broker>>,
    Json(body): Json<SubmitRpcRequest>,
) -> Result<Json<String>, ApiError> {
    if body.url.is_empty() {
        return Err(ApiError(TaskError::InvalidArgument));
    }

    let task_type = TaskType::from_http_method(&body.method)
        .ok_or(ApiError(TaskError::InvalidArgument))?;

    let request = TaskRequest {
        uuid: TaskRequest::new_uuid(),
        bin_name: body.url,
        args: body.args,
        start_time: parse_numeric(&body.start_time)?,
        time_interval: body.time_interval,
        index: 0,
        max_run_time: parse_numeric(&body.max_run_time)?,
        task_type,
    };

    let uuid = request.uuid.clone();
    broker.submit(request).await?;
    Ok(Json(uuid))
}

async fn query_result(
    State(broker): State<Arc<Broker>>,
    Path(uuid): Path<String>,
) -> Result<Json<task_queue_core::Reply>, ApiError> {
    Ok(Json(broker.query_result(&uuid).await?))
}

async fn undo_count(State(broker): State<Arc<Broker>>) -> Result<Json<u64>, ApiError> {
    Ok(Json(broker.undo_task_count().await?))
}

async fn failure_count(
    State(broker): State<Arc<Broker>>,
    Path(date): Path<String>,
) -> Result<Json<i64>, ApiError> {
    Ok(Json(broker.fail_task_count(&date).await?))
}

async fn success_count(
    State(broker): State<Arc<Broker>>,
    Path(date): Path<String>,
) -> Result<Json<i64>, ApiError> {
    Ok(Json(broker.success_task_count(&date).await?))
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/api/v1/task/script", post(submit_script))
        .route("/api/v1/task/rpc", post(submit_rpc))
        .route("/api/v1/task/result/:uuid", get(query_result))
        .route("/api/v1/task/count/undo", get(undo_count))
        .route("/api/v1/task/result/failure/:date", get(failure_count))
        .route("/api/v1/task/result/success/:date", get(success_count))
        .route("/health", get(health))
        .with_state(broker)
}
