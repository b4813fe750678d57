//! Recurring billing reconciliation engine.
//!
//! Reconciles provider webhook notifications (Stripe, RevenueCat) against a
//! local subscription record, keeps an append-only payment ledger, and tracks
//! user-entered recurring items with past-due detection.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod interval;
pub mod ledger;
pub mod models;
pub mod pastdue;
pub mod proration;
pub mod provider;
pub mod routes;
pub mod store;
pub mod transitions;

use std::sync::Arc;

use axum::Router;

use config::Config;
use engine::{BillingEngine, EngineConfig};
use ingest::WebhookProcessor;
use provider::{RevenueCatProvider, StripeProvider};
use routes::AppState;
use store::BillingStore;

/// Wires the full application over any store backend. Tests use this with
/// the memory store; `main` with Postgres.
pub fn build_app(store: Arc<dyn BillingStore>, cfg: &Config) -> Router {
    let engine = BillingEngine::new(
        store.clone(),
        EngineConfig {
            monthly_price_minor: cfg.monthly_price_minor,
            annual_price_minor: cfg.annual_price_minor,
            currency: cfg.currency.clone(),
            free_tier_item_limit: cfg.free_tier_item_limit,
        },
    );
    let processor = Arc::new(WebhookProcessor::new(
        store.clone(),
        engine.clone(),
        StripeProvider::new(cfg.stripe_webhook_secret.clone()),
        RevenueCatProvider::new(cfg.revenuecat_webhook_secret.clone()),
    ));
    routes::router(AppState {
        store,
        engine,
        processor,
    })
}
