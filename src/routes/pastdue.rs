//! Past-due listing and payment confirmation.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{ConfirmPaymentRequest, PastDueItem, PastDueQuery, RecurringItem};
use crate::pastdue;

use super::AppState;

/// GET /api/billing/users/{user_id}/past-due?as_of=YYYY-MM-DD
///
/// `as_of` is the caller's local calendar date; without it the server's
/// current date is used.
pub async fn list_past_due(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PastDueQuery>,
) -> Result<Json<Vec<PastDueItem>>, BillingError> {
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let items = pastdue::find_past_due(state.store.as_ref(), user_id, as_of).await?;
    Ok(Json(items))
}

/// POST /api/billing/items/{item_id}/confirm-payment
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<RecurringItem>, BillingError> {
    let item = pastdue::confirm_payment(
        state.store.as_ref(),
        item_id,
        request.outcome,
        request.payment_date,
    )
    .await?;
    Ok(Json(item))
}
