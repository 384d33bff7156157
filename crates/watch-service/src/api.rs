//! API request handlers for the Watch Service

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use payment_watcher::{MatchPredicate, TransactionRecord, WatchOutcome, WatchRequest, WatchStatus};

use crate::payment_request::PaymentRequest;
use crate::{AppState, LedgerKind};

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn watch_not_found(id: &Uuid) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("Watch not found: {}", id),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

/// Request to start a watch; exactly one of `memo` and `value` must be set
#[derive(Debug, Default, Deserialize)]
pub struct StartWatchRequest {
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    /// Block height to search from, usually the `start_height` of a payment
    /// request. Value watches default to the chain head at start.
    #[serde(default)]
    pub from_height: Option<u64>,
}

/// Watch identity and status
#[derive(Debug, Serialize)]
pub struct WatchResponse {
    pub watch_id: Uuid,
    pub status: WatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<WatchOutcome>,
}

/// Request body of `/check_transaction`
#[derive(Debug, Default, Deserialize)]
pub struct CheckTransactionRequest {
    #[serde(default)]
    pub memo: Option<String>,
}

/// Response of `/check_transaction`
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckTransactionResponse {
    Success {
        transaction: serde_json::Value,
        #[serde(rename = "statedAmount")]
        stated_amount: String,
        #[serde(rename = "actualAmount")]
        actual_amount: String,
    },
    Timeout {
        message: String,
    },
    Cancelled {
        message: String,
    },
    Failed {
        message: String,
    },
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "watch-service"
    }))
}

/// Generate a payment request for the configured wallet
///
/// POST /api/payment-request
pub async fn payment_request_handler(State(state): State<Arc<AppState>>) -> Json<PaymentRequest> {
    let settings = &state.settings;
    let mut request = PaymentRequest::new(
        settings.ledger_kind,
        &settings.account,
        &settings.stated_amount,
    );

    // Value payments are told apart only by when they were mined
    if settings.ledger_kind == LedgerKind::Etherscan {
        request.start_height = chain_head(&state).await;
    }

    info!("Generated payment request with memo {}", request.memo);

    Json(request)
}

/// Start a watch
///
/// POST /api/watch
pub async fn start_watch_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartWatchRequest>,
) -> Result<(StatusCode, Json<WatchResponse>), ApiError> {
    let predicate = match (req.memo, req.value) {
        (Some(memo), None) => MatchPredicate::exact_memo(memo),
        (None, Some(value)) => MatchPredicate::exact_value(value, state.settings.account.clone()),
        _ => return Err(ApiError::bad_request("Exactly one of memo or value is required.")),
    };

    let from_height = match (req.from_height, &predicate) {
        (Some(height), _) => Some(height),
        (None, MatchPredicate::ExactValue { .. }) => chain_head(&state).await,
        (None, MatchPredicate::ExactMemo { .. }) => None,
    };

    let request = watch_request(&state, predicate).with_from_height(from_height);
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let handle = state.registry.start(request).await;
    info!("Started watch {}", handle.id());

    Ok((
        StatusCode::ACCEPTED,
        Json(WatchResponse {
            watch_id: handle.id(),
            status: handle.status(),
            outcome: None,
        }),
    ))
}

/// Current status of a watch, with its outcome once finished
///
/// GET /api/watch/{id}
pub async fn watch_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WatchResponse>, ApiError> {
    let handle = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| ApiError::watch_not_found(&id))?;

    Ok(Json(WatchResponse {
        watch_id: id,
        status: handle.status(),
        outcome: handle.outcome(),
    }))
}

/// Wait for a watch to finish; the id is forgotten afterwards
///
/// GET /api/watch/{id}/result
pub async fn watch_result_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WatchOutcome>, ApiError> {
    state
        .registry
        .result(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::watch_not_found(&id))
}

/// Cancel a watch
///
/// DELETE /api/watch/{id}
pub async fn cancel_watch_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<WatchResponse>), ApiError> {
    match state.registry.cancel(&id).await {
        Some(true) => {
            info!("Cancelled watch {}", id);
            Ok((
                StatusCode::ACCEPTED,
                Json(WatchResponse {
                    watch_id: id,
                    status: WatchStatus::Cancelled,
                    outcome: None,
                }),
            ))
        }
        Some(false) => Err(ApiError {
            status: StatusCode::CONFLICT,
            message: format!("Watch already finished: {}", id),
        }),
        None => Err(ApiError::watch_not_found(&id)),
    }
}

/// Watch for a memo and answer once the watch ends.
///
/// The watch is tied to the request: if the client goes away, it is cancelled.
///
/// POST /check_transaction
pub async fn check_transaction_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckTransactionRequest>,
) -> Result<Json<CheckTransactionResponse>, ApiError> {
    let memo = req
        .memo
        .filter(|memo| !memo.is_empty())
        .ok_or_else(|| ApiError::bad_request("Memo is required."))?;

    let handle = state
        .registry
        .watcher()
        .start(watch_request(&state, MatchPredicate::exact_memo(memo)));
    let outcome = handle.result().await;

    Ok(Json(check_response(outcome, &state.settings.stated_amount)))
}

/// Current chain head, or `None` (search all history) if it cannot be read
async fn chain_head(state: &AppState) -> Option<u64> {
    match state.registry.watcher().current_height().await {
        Ok(height) => height,
        Err(e) => {
            warn!("Failed to get current block number: {}", e);
            None
        }
    }
}

fn watch_request(state: &AppState, predicate: MatchPredicate) -> WatchRequest {
    WatchRequest::new(state.settings.account.clone(), predicate)
        .with_poll_interval(state.settings.poll_interval)
        .with_max_duration(state.settings.max_duration)
}

fn check_response(outcome: WatchOutcome, stated_amount: &str) -> CheckTransactionResponse {
    let message = outcome.message.unwrap_or_default();

    match (outcome.status, outcome.transaction) {
        (WatchStatus::Succeeded, Some(transaction)) => CheckTransactionResponse::Success {
            transaction: transaction_json(transaction),
            stated_amount: stated_amount.to_string(),
            actual_amount: outcome
                .amounts
                .first()
                .map(|amount| amount.amount.clone())
                .unwrap_or_else(|| "0".to_string()),
        },
        (WatchStatus::TimedOut, _) => CheckTransactionResponse::Timeout { message },
        (WatchStatus::Failed, _) => CheckTransactionResponse::Failed { message },
        _ => CheckTransactionResponse::Cancelled { message },
    }
}

/// The explorer's own JSON for a transaction, when it was kept
fn transaction_json(transaction: TransactionRecord) -> serde_json::Value {
    if transaction.raw.is_null() {
        serde_json::to_value(&transaction).unwrap_or(serde_json::Value::Null)
    } else {
        transaction.raw
    }
}
