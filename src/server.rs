use crate::config::{open_store, EngineArgs, StoreArgs};
use crate::engine::TransferEngine;
use crate::errors::{ErrorKind, TransferError};
use crate::models::{AccountId, TransferRequest};
use crate::service::TransferService;
use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run(bind: String, store_args: StoreArgs, engine_args: EngineArgs) -> Result<()> {
    tracing::info!("Server mode: binding to {}", bind);

    let store = open_store(&store_args).await?;
    let engine = TransferEngine::with_config(store, engine_args.config());
    let service = Arc::new(TransferService::new(engine));

    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("Listening on {}", bind);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

pub fn router(service: Arc<TransferService>) -> Router {
    Router::new()
        .route("/transfer", post(make_transfer))
        .route("/accounts/{id}/balance", get(get_balance))
        .with_state(service)
}

/// HTTP status for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::AccountNotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidAmount | ErrorKind::SameAccount => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &TransferError) -> Response {
    let kind = err.kind();
    let message = match kind {
        ErrorKind::Internal => "internal server error".to_string(),
        _ => err.to_string(),
    };
    (
        status_for(kind),
        Json(json!({ "error": message, "code": kind.as_str() })),
    )
        .into_response()
}

pub async fn make_transfer(
    State(service): State<Arc<TransferService>>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!("Rejected transfer body: {}", rejection);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid request body", "code": "bad_request" })),
            )
                .into_response();
        }
    };

    match service.transfer(req.from, req.to, req.amount).await {
        Ok(transfer) => (
            StatusCode::OK,
            Json(json!({ "status": "transfer successful", "transfer": transfer })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn get_balance(
    State(service): State<Arc<TransferService>>,
    Path(id): Path<AccountId>,
) -> Response {
    match service.balance(id).await {
        Ok(balance) => (StatusCode::OK, Json(json!({ "id": id, "balance": balance }))).into_response(),
        Err(e) => error_response(&e),
    }
}
