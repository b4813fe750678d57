//! Payment provider adapters.
//!
//! Each adapter owns two concerns for one provider: verifying the webhook
//! signature against the raw request body, and translating the provider's
//! payload into the normalized [`BillingEvent`] the engine consumes. Nothing
//! downstream of this module sees provider-specific JSON.

mod revenuecat;
mod stripe;

pub use revenuecat::RevenueCatProvider;
pub use stripe::StripeProvider;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::BillingCycle;

/// Normalized event kind, independent of provider vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SubscriptionActivated,
    PaymentSucceeded,
    PaymentFailed,
    /// The renewal intent flipped (cancel-at-period-end set or cleared).
    RenewalStatusChanged,
    SubscriptionExpired,
    RefundIssued,
    /// Recognized shape, unrecognized type. Recorded and acknowledged without
    /// side effects.
    Unknown(String),
}

/// Provider notification after normalization. Fields the provider did not
/// send stay None; the engine decides per event kind which are required.
#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub event_id: String,
    pub provider: &'static str,
    pub kind: EventKind,
    pub event_type: String,
    pub subscription_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub user_id: Option<Uuid>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub billing_cycle: Option<BillingCycle>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub payment_ref: Option<String>,
    pub cancel_at_period_end: Option<bool>,
    /// Set for RefundIssued: whether the refund covered the full charge.
    pub refund_full: Option<bool>,
    pub raw: JsonValue,
}

pub trait WebhookProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verifies the signature over the raw body. Failure means the request
    /// is rejected before anything is stored.
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), BillingError>;

    /// Parses a verified body into a normalized event.
    fn parse(&self, body: &[u8]) -> Result<BillingEvent, BillingError>;
}

fn epoch_secs_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn epoch_millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
