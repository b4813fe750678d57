//! Inbound webhook endpoint and the operator surface over stored events.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use crate::error::BillingError;
use crate::ingest::IngestAck;
use crate::models::{ListWebhooksQuery, ReplayWebhookRequest, WebhookEvent};

use super::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

/// POST /api/billing/webhooks/{provider}
///
/// The body must stay raw bytes: the signature covers the exact payload the
/// provider sent, so any re-serialization breaks verification.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestAck>, BillingError> {
    let ack = state.processor.ingest(&provider, &headers, &body).await?;
    Ok(Json(ack))
}

/// GET /api/billing/webhook-events
pub async fn list_webhooks(
    State(state): State<AppState>,
    Query(query): Query<ListWebhooksQuery>,
) -> Result<Json<Vec<WebhookEvent>>, BillingError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let events = state
        .store
        .list_webhook_events(query.event_type.as_deref(), query.status, limit, offset)
        .await?;
    Ok(Json(events))
}

/// GET /api/billing/webhook-events/{id}
pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WebhookEvent>, BillingError> {
    let event = state
        .store
        .webhook_event(id)
        .await?
        .ok_or(BillingError::NotFound("webhook event"))?;
    Ok(Json(event))
}

/// POST /api/billing/webhook-events/{id}/replay
pub async fn replay_webhook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReplayWebhookRequest>,
) -> Result<Json<WebhookEvent>, BillingError> {
    let force = request.force.unwrap_or(false);
    let event = state.processor.replay(id, force).await?;
    Ok(Json(event))
}
