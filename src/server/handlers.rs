//! Registry API handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::registry::store::{CodeStore, StoreError};
use crate::registry::types::{CodeId, ErrorBody};

#[derive(Debug, Deserialize)]
pub(super) struct AddCodeBody {
    text: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ConfirmBody {
    id: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn store_error_response(error: StoreError) -> Response {
    let status = match &error {
        StoreError::DuplicateText { .. } => StatusCode::CONFLICT,
        StoreError::ConfirmedImmutable { .. } => StatusCode::CONFLICT,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::EmptyText => StatusCode::UNPROCESSABLE_ENTITY,
    };
    error_response(status, error.to_string())
}

/// `POST /codes`: issue a new code
pub(super) async fn add_code(
    State(store): State<Arc<CodeStore>>,
    Json(body): Json<AddCodeBody>,
) -> Response {
    match store.add(&body.text).await {
        Ok(record) => {
            info!(id = %record.id, text = %record.text, "code issued");
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(error) => store_error_response(error),
    }
}

/// `GET /codes`: all records in insertion order
pub(super) async fn list_codes(State(store): State<Arc<CodeStore>>) -> Response {
    Json(store.list().await).into_response()
}

/// `PUT /codes/confirm`: one-way confirm keyed by id
pub(super) async fn confirm_code(
    State(store): State<Arc<CodeStore>>,
    Json(body): Json<ConfirmBody>,
) -> Response {
    match store.confirm(&CodeId::from(body.id)).await {
        Ok(record) => {
            info!(id = %record.id, text = %record.text, "code confirmed");
            Json(record).into_response()
        }
        Err(error) => store_error_response(error),
    }
}

/// `DELETE /codes/{id}`: delete an unconfirmed record
pub(super) async fn remove_code(
    State(store): State<Arc<CodeStore>>,
    Path(id): Path<String>,
) -> Response {
    match store.remove(&CodeId::from(id)).await {
        Ok(record) => {
            info!(id = %record.id, text = %record.text, "code deleted");
            Json(serde_json::json!({ "deleted": record.id })).into_response()
        }
        Err(error) => store_error_response(error),
    }
}

/// `GET /healthz`: liveness plus record count
pub(super) async fn health(State(store): State<Arc<CodeStore>>) -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "records": store.len().await,
    }))
    .into_response()
}
