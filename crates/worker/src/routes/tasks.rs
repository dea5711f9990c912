//! Task inspection.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Task, TaskId};

use crate::AppState;
use crate::error::ApiError;

/// GET /tasks/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id: TaskId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid task id: {e}")))?;
    let task = state.repositories.tasks.find_by_id(id).await?;
    Ok(Json(task))
}
