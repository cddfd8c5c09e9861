use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::models::*;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
/// The full error is logged server-side for debugging, but clients only
/// see a generic message to avoid leaking internal details.
///
/// Some errors are validation errors that should be exposed to the client
/// (e.g., the subtask completion guard). These are returned as-is with a
/// BAD_REQUEST status.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    let msg = e.to_string();

    // Known validation errors that are safe to expose
    if msg.contains("subtask") || msg.contains("not found") {
        tracing::warn!("Validation error: {}", msg);
        return (StatusCode::BAD_REQUEST, msg);
    }

    tracing::error!("Internal error: {}", msg);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Tasks
// ============================================================

pub async fn list_tasks(
    State(db): State<Database>,
    Path(user_id): Path<Uuid>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    let today = Utc::now().date_naive();
    db.list_tasks(user_id, &filter, today)
        .map(Json)
        .map_err(internal_error)
}

pub async fn todays_tasks(
    State(db): State<Database>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    let today = Utc::now().date_naive();
    db.tasks_due_on(user_id, today)
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_task(
    State(db): State<Database>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<CreateTaskInput>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, String)> {
    db.create_task(user_id, input)
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(internal_error)
}

pub async fn get_task(
    State(db): State<Database>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Task>, (StatusCode, String)> {
    db.get_task(user_id, id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))
}

pub async fn update_task(
    State(db): State<Database>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateTaskInput>,
) -> Result<Json<Task>, (StatusCode, String)> {
    db.update_task(user_id, id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))
}

pub async fn toggle_complete(
    State(db): State<Database>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Task>, (StatusCode, String)> {
    db.toggle_complete(user_id, id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))
}

pub async fn delete_task(
    State(db): State<Database>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    if db.delete_task(user_id, id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Task not found".to_string()))
    }
}

pub async fn clear_completed(
    State(db): State<Database>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let cleared = db.clear_completed(user_id).map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}

pub async fn reorder_tasks(
    State(db): State<Database>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<ReorderInput>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if input.order.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Order array must not be empty".to_string(),
        ));
    }

    let updated = db
        .reorder_tasks(user_id, &input.order)
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
