//! Client-facing subscription operations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::BillingError;
use crate::ledger;
use crate::models::{
    CanAddItemResponse, CancelSubscriptionRequest, PaymentTransaction, RefundRequest,
    Subscription, SwitchCycleRequest, SwitchCycleResponse, TransactionStatus,
};

use super::AppState;

/// GET /api/billing/users/{user_id}/subscription
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Subscription>, BillingError> {
    let sub = state.engine.subscription_for_user(user_id).await?;
    Ok(Json(sub))
}

/// GET /api/billing/users/{user_id}/can-add-item
pub async fn can_add_item(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CanAddItemResponse>, BillingError> {
    let response = state.engine.can_add_item(user_id).await?;
    Ok(Json(response))
}

/// GET /api/billing/users/{user_id}/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentTransaction>>, BillingError> {
    let sub = state.engine.subscription_for_user(user_id).await?;
    let rows = ledger::history(state.store.as_ref(), sub.id).await?;
    Ok(Json(rows))
}

/// POST /api/billing/users/{user_id}/subscription/pause
pub async fn pause_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Subscription>, BillingError> {
    let sub = state.engine.pause(user_id).await?;
    Ok(Json(sub))
}

/// POST /api/billing/users/{user_id}/subscription/resume
pub async fn resume_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Subscription>, BillingError> {
    let sub = state.engine.resume(user_id).await?;
    Ok(Json(sub))
}

/// POST /api/billing/users/{user_id}/subscription/cancel
///
/// Defaults to cancel-at-period-end; `at_period_end: false` revokes
/// immediately.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<CancelSubscriptionRequest>,
) -> Result<Json<Subscription>, BillingError> {
    let at_period_end = request.at_period_end.unwrap_or(true);
    let sub = state
        .engine
        .cancel(user_id, at_period_end, request.reason)
        .await?;
    Ok(Json(sub))
}

/// POST /api/billing/users/{user_id}/subscription/switch-cycle
pub async fn switch_billing_cycle(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SwitchCycleRequest>,
) -> Result<Json<SwitchCycleResponse>, BillingError> {
    let (_, response) = state
        .engine
        .switch_billing_cycle(user_id, request.new_cycle)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct RefundRequestResponse {
    pub transaction_id: Uuid,
    pub status: &'static str,
}

/// POST /api/billing/users/{user_id}/subscription/refund-request
///
/// Records a pending refund row for operator follow-up. The outbound
/// provider call happens out of band; the eventual charge.refunded webhook
/// settles the ledger.
pub async fn request_refund(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<(StatusCode, Json<RefundRequestResponse>), BillingError> {
    let sub = state.engine.subscription_for_user(user_id).await?;
    let amount = state.engine.cycle_price_minor(sub.billing_cycle);
    let outcome = ledger::record(
        state.store.as_ref(),
        sub.id,
        &format!("refund-request-{}", Uuid::new_v4()),
        amount,
        &state.engine.config().currency,
        TransactionStatus::Pending,
        Some(json!({ "reason": request.reason })),
    )
    .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RefundRequestResponse {
            transaction_id: outcome.transaction_id(),
            status: "pending",
        }),
    ))
}
