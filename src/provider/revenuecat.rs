//! RevenueCat webhook adapter.
//!
//! RevenueCat signs the raw body directly (no timestamp envelope) and sends
//! the hex HMAC-SHA256 in `X-RevenueCat-Signature`. The payload nests the
//! event under an `"event"` key with SCREAMING_CASE type names and epoch
//! milliseconds for all instants.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::BillingCycle;

use super::{epoch_millis_to_utc, BillingEvent, EventKind, WebhookProvider};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-revenuecat-signature";

pub struct RevenueCatProvider {
    webhook_secret: String,
}

impl RevenueCatProvider {
    pub fn new(webhook_secret: String) -> Self {
        Self { webhook_secret }
    }
}

impl WebhookProvider for RevenueCatProvider {
    fn name(&self) -> &'static str {
        "revenuecat"
    }

    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), BillingError> {
        let received = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                BillingError::SignatureInvalid("missing x-revenuecat-signature header".into())
            })?;

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| BillingError::SignatureInvalid("invalid secret".into()))?;
        mac.update(body);
        let expected = mac.finalize().into_bytes();

        let received_bytes = hex::decode(received)
            .map_err(|_| BillingError::SignatureInvalid("malformed signature".into()))?;
        if received_bytes.len() != expected.len() {
            return Err(BillingError::SignatureInvalid("signature mismatch".into()));
        }

        // Constant-time comparison
        let mut diff = 0u8;
        for (a, b) in received_bytes.iter().zip(expected.iter()) {
            diff |= a ^ b;
        }
        if diff == 0 {
            Ok(())
        } else {
            Err(BillingError::SignatureInvalid("signature mismatch".into()))
        }
    }

    fn parse(&self, body: &[u8]) -> Result<BillingEvent, BillingError> {
        let payload: JsonValue = serde_json::from_slice(body)
            .map_err(|e| BillingError::Validation(format!("malformed JSON payload: {e}")))?;
        let inner = &payload["event"];

        let event_id = inner["id"]
            .as_str()
            .ok_or_else(|| BillingError::Validation("missing event id".into()))?
            .to_string();
        let event_type = inner["type"]
            .as_str()
            .ok_or_else(|| BillingError::Validation("missing event type".into()))?
            .to_string();

        let kind = match event_type.as_str() {
            "INITIAL_PURCHASE" => EventKind::SubscriptionActivated,
            "RENEWAL" => EventKind::PaymentSucceeded,
            "BILLING_ISSUE" => EventKind::PaymentFailed,
            "CANCELLATION" | "UNCANCELLATION" => EventKind::RenewalStatusChanged,
            "EXPIRATION" => EventKind::SubscriptionExpired,
            "REFUND" => EventKind::RefundIssued,
            other => EventKind::Unknown(other.to_string()),
        };

        // Prices arrive in major currency units as a float.
        let amount_minor = inner["price"]
            .as_f64()
            .map(|p| (p * 100.0).round() as i64)
            .map(i64::abs);

        let billing_cycle = inner["product_id"].as_str().and_then(|p| {
            if p.contains("annual") || p.contains("yearly") {
                Some(BillingCycle::Annual)
            } else if p.contains("monthly") {
                Some(BillingCycle::Monthly)
            } else {
                None
            }
        });

        let cancel_at_period_end = match event_type.as_str() {
            "CANCELLATION" => Some(true),
            "UNCANCELLATION" => Some(false),
            _ => None,
        };

        // RevenueCat only notifies on full refunds.
        let refund_full = if event_type == "REFUND" { Some(true) } else { None };

        Ok(BillingEvent {
            event_id,
            provider: "revenuecat",
            kind,
            event_type,
            subscription_ref: inner["original_transaction_id"].as_str().map(String::from),
            customer_ref: inner["app_user_id"].as_str().map(String::from),
            user_id: inner["app_user_id"]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok()),
            period_start: inner["purchased_at_ms"].as_i64().and_then(epoch_millis_to_utc),
            period_end: inner["expiration_at_ms"].as_i64().and_then(epoch_millis_to_utc),
            billing_cycle,
            amount_minor,
            currency: inner["currency"].as_str().map(str::to_uppercase),
            payment_ref: inner["transaction_id"].as_str().map(String::from),
            cancel_at_period_end,
            refund_full,
            raw: payload.clone(),
        })
    }
}
