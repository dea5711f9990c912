//! Transaction inspection.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Transaction, TransactionId, TransactionType};

use crate::AppState;
use crate::error::ApiError;

/// GET /transactions/{type}/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path((type_of, id)): Path<(String, String)>,
) -> Result<Json<Transaction>, ApiError> {
    let type_of: TransactionType = type_of
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let id: TransactionId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid transaction id: {e}")))?;

    let transaction = state
        .repositories
        .transactions
        .find_by_id(type_of, id)
        .await?;
    Ok(Json(transaction))
}
