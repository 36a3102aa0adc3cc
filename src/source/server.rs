use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{Result, WorkerError};
use crate::ledger::Task;
use crate::source::TaskSource;
use crate::worker::{Outcome, Pipeline};

#[derive(Clone)]
pub struct ServerState {
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTaskRequest {
    pub task_id: u64,
    pub image: String,
    #[serde(default)]
    pub input_data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTaskResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessTaskResponse {
    fn success(tx_hash: String) -> Self {
        Self {
            status: "success".to_string(),
            tx_hash: Some(tx_hash),
            error: None,
        }
    }

    fn error(error: impl ToString, tx_hash: Option<String>) -> Self {
        Self {
            status: "error".to_string(),
            tx_hash,
            error: Some(error.to_string()),
        }
    }
}

/// Build the HTTP surface of the on-demand worker.
///
/// - `POST /process_task`: run one task to completion and submit it
/// - `GET /api/submissions`: receipts recorded by this process
/// - `GET /health`: liveness
///
/// Cross-origin preflight requests are answered by the CORS layer.
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/process_task", post(process_task_handler))
        .route("/api/submissions", get(list_submissions_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_submissions_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.pipeline.submissions())
}

async fn process_task_handler(
    State(state): State<ServerState>,
    payload: std::result::Result<Json<ProcessTaskRequest>, JsonRejection>,
) -> (StatusCode, Json<ProcessTaskResponse>) {
    let task = match payload
        .map_err(|e| WorkerError::MalformedRequest(e.body_text()))
        .and_then(|Json(req)| to_task(req))
    {
        Ok(task) => task,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected task request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ProcessTaskResponse::error(e, None)),
            );
        }
    };

    tracing::info!(task_id = task.id, image = %task.image, "Received task request");

    match state.pipeline.process(&task).await {
        Ok(Outcome::Submitted(record)) => (
            StatusCode::OK,
            Json(ProcessTaskResponse::success(record.tx_hash)),
        ),
        Ok(Outcome::AlreadySubmitted(record)) => (
            StatusCode::CONFLICT,
            Json(ProcessTaskResponse::error(
                format!("Task {} already submitted", task.id),
                Some(record.tx_hash),
            )),
        ),
        Err(e) => {
            tracing::error!(task_id = task.id, error = %e, "Task processing failed");
            (status_for(&e), Json(ProcessTaskResponse::error(e, None)))
        }
    }
}

fn to_task(req: ProcessTaskRequest) -> Result<Task> {
    if req.image.trim().is_empty() {
        return Err(WorkerError::MalformedRequest("image must not be empty".into()));
    }
    Ok(Task::new(
        req.task_id,
        req.image,
        req.input_data.unwrap_or_default(),
    ))
}

fn status_for(error: &WorkerError) -> StatusCode {
    match error {
        WorkerError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        WorkerError::TaskInFlight(_) => StatusCode::CONFLICT,
        WorkerError::ExecutorUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        WorkerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serves task requests until shutdown.
pub struct RequestServer {
    addr: SocketAddr,
    state: ServerState,
}

impl RequestServer {
    pub fn new(addr: SocketAddr, pipeline: Arc<Pipeline>) -> Self {
        Self {
            addr,
            state: ServerState { pipeline },
        }
    }
}

#[async_trait]
impl TaskSource for RequestServer {
    async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let app = router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(self.addr).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to bind worker server");
            WorkerError::Io(e)
        })?;
        tracing::info!(addr = %self.addr, "Worker server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        tracing::info!("Worker server stopped");
        Ok(())
    }
}
