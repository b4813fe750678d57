//! HTTP surface.

mod health;
mod pastdue;
mod subscription;
mod webhooks;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::BillingEngine;
use crate::ingest::WebhookProcessor;
use crate::store::BillingStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BillingStore>,
    pub engine: BillingEngine,
    pub processor: Arc<WebhookProcessor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/billing/webhooks/{provider}",
            post(webhooks::receive_webhook),
        )
        // Operator surface over stored events; kept off the /webhooks
        // prefix so its {id} segment cannot collide with {provider}.
        .route("/api/billing/webhook-events", get(webhooks::list_webhooks))
        .route(
            "/api/billing/webhook-events/{id}",
            get(webhooks::get_webhook),
        )
        .route(
            "/api/billing/webhook-events/{id}/replay",
            post(webhooks::replay_webhook),
        )
        .route(
            "/api/billing/users/{user_id}/subscription",
            get(subscription::get_subscription),
        )
        .route(
            "/api/billing/users/{user_id}/can-add-item",
            get(subscription::can_add_item),
        )
        .route(
            "/api/billing/users/{user_id}/transactions",
            get(subscription::list_transactions),
        )
        .route(
            "/api/billing/users/{user_id}/subscription/pause",
            post(subscription::pause_subscription),
        )
        .route(
            "/api/billing/users/{user_id}/subscription/resume",
            post(subscription::resume_subscription),
        )
        .route(
            "/api/billing/users/{user_id}/subscription/cancel",
            post(subscription::cancel_subscription),
        )
        .route(
            "/api/billing/users/{user_id}/subscription/switch-cycle",
            post(subscription::switch_billing_cycle),
        )
        .route(
            "/api/billing/users/{user_id}/subscription/refund-request",
            post(subscription::request_refund),
        )
        .route(
            "/api/billing/users/{user_id}/past-due",
            get(pastdue::list_past_due),
        )
        .route(
            "/api/billing/items/{item_id}/confirm-payment",
            post(pastdue::confirm_payment),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
