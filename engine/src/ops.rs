// Operational HTTP surface
//
// Not the tenant-facing CRUD API (that lives in the platform services):
// this router exposes health, the failed-execution view, authoring-time
// action validation, the manual retention trigger, and the realtime
// socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::jobs::{JobScheduler, RetentionOverride, RetentionSweepResult};
use crate::workflows::model::{ExecutionStatus, WorkflowExecution};
use crate::workflows::{ActionDispatcher, EngineDeps, ValidationOutcome};

pub struct AppState {
    pub pool: PgPool,
    pub deps: Arc<EngineDeps>,
    pub dispatcher: Arc<ActionDispatcher>,
    pub scheduler: Arc<JobScheduler>,
}

pub fn ops_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/executions", get(list_executions))
        .route("/api/v1/actions/validate", post(validate_action))
        .route("/api/v1/jobs/retention/run", post(run_retention))
        .route("/ws", get(websocket_handler))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    let database = crate::database::health_check(&state.pool).await;

    Json(serde_json::json!({
        "status": if database { "ok" } else { "degraded" },
        "database": database,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListExecutionsQuery {
    pub status: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub limit: Option<i64>,
}

async fn list_executions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListExecutionsQuery>,
) -> ApiResult<Json<Vec<WorkflowExecution>>> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            serde_json::from_value::<ExecutionStatus>(serde_json::json!(raw))
                .map_err(|_| AppError::BadRequest(format!("unknown status '{}'", raw)))?,
        ),
    };
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let executions = state
        .deps
        .executions
        .list(query.tenant_id, status, limit)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    Ok(Json(executions))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateActionRequest {
    pub action_type: String,
    #[serde(default)]
    pub config: JsonValue,
}

async fn validate_action(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidateActionRequest>,
) -> Json<ValidationOutcome> {
    Json(state.dispatcher.validate(&request.action_type, &request.config))
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRetentionRequest {
    pub tenant_id: Option<Uuid>,
    pub log_retention_days: Option<i64>,
    pub execution_retention_days: Option<i64>,
}

async fn run_retention(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRetentionRequest>,
) -> ApiResult<Json<RetentionSweepResult>> {
    let result = state
        .scheduler
        .run_retention_now(Some(RetentionOverride {
            tenant_id: request.tenant_id,
            log_retention_days: request.log_retention_days,
            execution_retention_days: request.execution_retention_days,
        }))
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(Json(result))
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.deps.realtime.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // Lagged subscriber: drop missed events and continue.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }
}
