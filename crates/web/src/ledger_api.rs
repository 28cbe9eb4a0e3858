//! `/api/ledger/*`: the embedded ledger served to remote gateways.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::{engine::general_purpose, Engine as _};
use filechain_ledger::{LedgerError, LedgerErrorResponse, PayloadResponse, Proposal};

use crate::server::{ApiError, SharedState};

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/api/ledger/submit", post(handle_ledger_submit))
        .route("/api/ledger/evaluate", post(handle_ledger_evaluate))
}

async fn handle_ledger_submit(
    State(state): State<SharedState>,
    Json(proposal): Json<Proposal>,
) -> Response {
    state.record_request();
    let Some(ledger) = state.ledger.clone() else {
        return ApiError::service_unavailable("no embedded ledger").into_response();
    };
    respond(ledger.submit(&proposal).await)
}

async fn handle_ledger_evaluate(
    State(state): State<SharedState>,
    Json(proposal): Json<Proposal>,
) -> Response {
    state.record_request();
    let Some(ledger) = state.ledger.clone() else {
        return ApiError::service_unavailable("no embedded ledger").into_response();
    };
    respond(ledger.evaluate(&proposal).await)
}

fn respond(result: filechain_ledger::Result<Vec<u8>>) -> Response {
    match result {
        Ok(payload) => Json(PayloadResponse {
            payload: general_purpose::STANDARD.encode(payload),
        })
        .into_response(),
        Err(err) => {
            tracing::debug!(code = err.code(), "ledger request failed: {err}");
            (status_for(&err), Json(LedgerErrorResponse::from(&err))).into_response()
        }
    }
}

fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::NotFound(_)
        | LedgerError::BlockNotFound(_)
        | LedgerError::ChannelNotFound(_)
        | LedgerError::ChaincodeNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::AlreadyExists(_)
        | LedgerError::AlreadyInitialized
        | LedgerError::DuplicateTransaction(_) => StatusCode::CONFLICT,
        LedgerError::InvalidArguments(_) | LedgerError::UnknownTransaction(_) => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::Unauthorized(_) => StatusCode::FORBIDDEN,
        LedgerError::Connection(_) => StatusCode::BAD_GATEWAY,
        LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
