//! Stripe webhook adapter.
//!
//! Signature scheme: `Stripe-Signature: t=<unix>,v1=<hex hmac>` where the
//! HMAC-SHA256 is computed over `"{t}.{raw_body}"` with the endpoint secret.
//! Timestamps outside the tolerance window are rejected to block replays.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::BillingCycle;

use super::{epoch_secs_to_utc, BillingEvent, EventKind, WebhookProvider};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "stripe-signature";
const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub struct StripeProvider {
    webhook_secret: String,
    tolerance_secs: i64,
}

impl StripeProvider {
    pub fn new(webhook_secret: String) -> Self {
        Self {
            webhook_secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }
}

impl WebhookProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), BillingError> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                BillingError::SignatureInvalid("missing stripe-signature header".into())
            })?;

        let parts: Vec<&str> = signature.split(',').collect();
        let timestamp = parts
            .iter()
            .find_map(|p| p.strip_prefix("t="))
            .ok_or_else(|| BillingError::SignatureInvalid("missing timestamp".into()))?;
        let received = parts
            .iter()
            .find_map(|p| p.strip_prefix("v1="))
            .ok_or_else(|| BillingError::SignatureInvalid("missing v1 signature".into()))?;

        let webhook_time = timestamp
            .parse::<i64>()
            .map_err(|_| BillingError::SignatureInvalid("malformed timestamp".into()))?;
        let current_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| BillingError::SignatureInvalid("clock error".into()))?
            .as_secs() as i64;
        if (current_time - webhook_time).abs() > self.tolerance_secs {
            return Err(BillingError::SignatureInvalid(
                "timestamp outside tolerance".into(),
            ));
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| BillingError::SignatureInvalid("invalid secret".into()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
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

        let event_id = payload["id"]
            .as_str()
            .ok_or_else(|| BillingError::Validation("missing event id".into()))?
            .to_string();
        let event_type = payload["type"]
            .as_str()
            .ok_or_else(|| BillingError::Validation("missing event type".into()))?
            .to_string();
        let object = &payload["data"]["object"];

        let kind = match event_type.as_str() {
            "customer.subscription.created" => EventKind::SubscriptionActivated,
            "invoice.payment_succeeded" => EventKind::PaymentSucceeded,
            "invoice.payment_failed" => EventKind::PaymentFailed,
            "customer.subscription.updated" => EventKind::RenewalStatusChanged,
            "customer.subscription.deleted" => EventKind::SubscriptionExpired,
            "charge.refunded" => EventKind::RefundIssued,
            other => EventKind::Unknown(other.to_string()),
        };

        let mut event = BillingEvent {
            event_id,
            provider: "stripe",
            kind: kind.clone(),
            event_type,
            subscription_ref: None,
            customer_ref: object["customer"].as_str().map(String::from),
            user_id: object["metadata"]["user_id"]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok()),
            period_start: None,
            period_end: None,
            billing_cycle: None,
            amount_minor: None,
            currency: object["currency"].as_str().map(str::to_uppercase),
            payment_ref: None,
            cancel_at_period_end: None,
            refund_full: None,
            raw: payload.clone(),
        };

        match kind {
            EventKind::SubscriptionActivated
            | EventKind::RenewalStatusChanged
            | EventKind::SubscriptionExpired => {
                event.subscription_ref = object["id"].as_str().map(String::from);
                event.period_start =
                    object["current_period_start"].as_i64().and_then(epoch_secs_to_utc);
                event.period_end =
                    object["current_period_end"].as_i64().and_then(epoch_secs_to_utc);
                event.cancel_at_period_end = object["cancel_at_period_end"].as_bool();
                event.billing_cycle = object["items"]["data"][0]["plan"]["interval"]
                    .as_str()
                    .and_then(|i| match i {
                        "month" => Some(BillingCycle::Monthly),
                        "year" => Some(BillingCycle::Annual),
                        _ => None,
                    });
            }
            EventKind::PaymentSucceeded | EventKind::PaymentFailed => {
                event.subscription_ref = object["subscription"].as_str().map(String::from);
                event.payment_ref = object["payment_intent"]
                    .as_str()
                    .or_else(|| object["id"].as_str())
                    .map(String::from);
                event.amount_minor = object["amount_paid"]
                    .as_i64()
                    .or_else(|| object["amount_due"].as_i64());
                event.period_start =
                    object["period_start"].as_i64().and_then(epoch_secs_to_utc);
                event.period_end = object["period_end"].as_i64().and_then(epoch_secs_to_utc);
            }
            EventKind::RefundIssued => {
                // Charges reference the subscription only through the invoice
                // metadata Stripe copies onto them.
                event.subscription_ref =
                    object["metadata"]["subscription_id"].as_str().map(String::from);
                event.payment_ref = object["payment_intent"]
                    .as_str()
                    .or_else(|| object["id"].as_str())
                    .map(String::from);
                let amount = object["amount"].as_i64();
                let refunded = object["amount_refunded"].as_i64();
                event.amount_minor = refunded;
                event.refund_full = match (amount, refunded) {
                    (Some(a), Some(r)) => Some(r >= a),
                    _ => None,
                };
            }
            EventKind::Unknown(_) => {}
        }

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, timestamp: i64, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{body}").as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn now_secs() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
    }

    #[test]
    fn test_valid_signature_accepted() {
        let provider = StripeProvider::new("whsec_test".into());
        let body = r#"{"id":"evt_1","type":"invoice.payment_succeeded"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            sign("whsec_test", now_secs(), body).parse().unwrap(),
        );
        assert!(provider.verify(&headers, body.as_bytes()).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let provider = StripeProvider::new("whsec_real".into());
        let body = r#"{"id":"evt_1"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            sign("whsec_other", now_secs(), body).parse().unwrap(),
        );
        assert!(provider.verify(&headers, body.as_bytes()).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let provider = StripeProvider::new("whsec_test".into());
        let body = r#"{"id":"evt_1"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            sign("whsec_test", now_secs() - 4000, body).parse().unwrap(),
        );
        assert!(provider.verify(&headers, body.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_header_rejected() {
        let provider = StripeProvider::new("whsec_test".into());
        let headers = HeaderMap::new();
        assert!(provider.verify(&headers, b"{}").is_err());
    }

    #[test]
    fn test_parse_payment_succeeded() {
        let provider = StripeProvider::new("whsec_test".into());
        let body = r#"{
            "id": "evt_100",
            "type": "invoice.payment_succeeded",
            "data": {"object": {
                "id": "in_1",
                "subscription": "sub_abc",
                "customer": "cus_abc",
                "payment_intent": "pi_1",
                "amount_paid": 999,
                "currency": "usd",
                "period_start": 1730419200,
                "period_end": 1733011200
            }}
        }"#;
        let event = provider.parse(body.as_bytes()).unwrap();
        assert_eq!(event.kind, EventKind::PaymentSucceeded);
        assert_eq!(event.subscription_ref.as_deref(), Some("sub_abc"));
        assert_eq!(event.payment_ref.as_deref(), Some("pi_1"));
        assert_eq!(event.amount_minor, Some(999));
        assert_eq!(event.currency.as_deref(), Some("USD"));
        assert!(event.period_end.is_some());
    }

    #[test]
    fn test_parse_subscription_created_maps_cycle() {
        let provider = StripeProvider::new("whsec_test".into());
        let body = r#"{
            "id": "evt_101",
            "type": "customer.subscription.created",
            "data": {"object": {
                "id": "sub_abc",
                "customer": "cus_abc",
                "cancel_at_period_end": false,
                "current_period_start": 1730419200,
                "current_period_end": 1733011200,
                "metadata": {"user_id": "7f1e5c1a-9f6f-4a6d-8d3a-2a4f9b8c1d2e"},
                "items": {"data": [{"plan": {"interval": "year"}}]}
            }}
        }"#;
        let event = provider.parse(body.as_bytes()).unwrap();
        assert_eq!(event.kind, EventKind::SubscriptionActivated);
        assert_eq!(event.billing_cycle, Some(BillingCycle::Annual));
        assert!(event.user_id.is_some());
        assert_eq!(event.cancel_at_period_end, Some(false));
    }

    #[test]
    fn test_parse_partial_refund() {
        let provider = StripeProvider::new("whsec_test".into());
        let body = r#"{
            "id": "evt_102",
            "type": "charge.refunded",
            "data": {"object": {
                "id": "ch_1",
                "payment_intent": "pi_1",
                "amount": 9900,
                "amount_refunded": 4950,
                "currency": "usd",
                "metadata": {"subscription_id": "sub_abc"}
            }}
        }"#;
        let event = provider.parse(body.as_bytes()).unwrap();
        assert_eq!(event.kind, EventKind::RefundIssued);
        assert_eq!(event.refund_full, Some(false));
        assert_eq!(event.amount_minor, Some(4950));
    }

    #[test]
    fn test_parse_unrecognized_type() {
        let provider = StripeProvider::new("whsec_test".into());
        let body = r#"{"id":"evt_103","type":"payout.paid","data":{"object":{}}}"#;
        let event = provider.parse(body.as_bytes()).unwrap();
        assert_eq!(event.kind, EventKind::Unknown("payout.paid".into()));
    }
}
