//! Webhook ingestion pipeline.
//!
//! Order of operations for every inbound notification:
//! 1. signature verification (reject before anything is stored)
//! 2. payload normalization
//! 3. insert-or-detect on the `event_id` unique guard
//! 4. dispatch to the engine/ledger
//! 5. mark the row processed / ignored / failed
//!
//! Business failures are acknowledged with 200 so the provider stops
//! redelivering; only a transient store failure surfaces as 5xx, leaving the
//! row pending (or absent) for the redelivery to pick up.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::engine::BillingEngine;
use crate::error::BillingError;
use crate::ledger;
use crate::models::{ProcessingStatus, TransactionStatus, WebhookEvent};
use crate::provider::{
    BillingEvent, EventKind, RevenueCatProvider, StripeProvider, WebhookProvider,
};
use crate::store::{BillingStore, EventInsert};

/// Acknowledgement body returned to the provider.
#[derive(Debug, Serialize)]
pub struct IngestAck {
    pub event_id: String,
    pub status: &'static str,
}

pub struct WebhookProcessor {
    store: Arc<dyn BillingStore>,
    engine: BillingEngine,
    stripe: StripeProvider,
    revenuecat: RevenueCatProvider,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn BillingStore>,
        engine: BillingEngine,
        stripe: StripeProvider,
        revenuecat: RevenueCatProvider,
    ) -> Self {
        Self {
            store,
            engine,
            stripe,
            revenuecat,
        }
    }

    fn provider(&self, name: &str) -> Result<&dyn WebhookProvider, BillingError> {
        match name {
            "stripe" => Ok(&self.stripe),
            "revenuecat" => Ok(&self.revenuecat),
            _ => Err(BillingError::NotFound("provider")),
        }
    }

    pub async fn ingest(
        &self,
        provider_name: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<IngestAck, BillingError> {
        let provider = self.provider(provider_name)?;
        provider.verify(headers, body)?;

        // A signed but unparsable payload can never succeed on redelivery,
        // so it is acknowledged instead of bounced back for retry. Without
        // an event id there is nothing to store for it.
        let event = match provider.parse(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    provider = provider.name(),
                    error = %e,
                    "unparsable webhook payload acknowledged"
                );
                return Ok(IngestAck {
                    event_id: String::new(),
                    status: "unparsable",
                });
            }
        };

        let row = WebhookEvent {
            id: Uuid::new_v4(),
            event_id: event.event_id.clone(),
            provider: provider.name().to_string(),
            event_type: event.event_type.clone(),
            processing_status: ProcessingStatus::Pending,
            payload: event.raw.clone(),
            error: None,
            retry_count: 0,
            received_at: Utc::now(),
            processed_at: None,
        };

        let row_id = match self.store.insert_webhook_event(&row).await? {
            EventInsert::Inserted => row.id,
            EventInsert::Duplicate(existing) => {
                // A still-pending row means an earlier delivery stalled on a
                // transient failure after the insert; this redelivery picks
                // the work back up. Dispatch is idempotent end to end, so
                // racing a concurrent first delivery is harmless.
                if existing.processing_status == ProcessingStatus::Pending {
                    let status = self.dispatch(existing.id, &event).await?;
                    return Ok(IngestAck {
                        event_id: event.event_id,
                        status,
                    });
                }
                tracing::info!(
                    event_id = %event.event_id,
                    status = ?existing.processing_status,
                    "duplicate webhook delivery acknowledged"
                );
                return Ok(IngestAck {
                    event_id: event.event_id,
                    status: "duplicate",
                });
            }
        };

        let status = self.dispatch(row_id, &event).await?;
        Ok(IngestAck {
            event_id: event.event_id,
            status,
        })
    }

    /// Re-runs dispatch for a stored event. `force` allows replaying an
    /// event that already processed successfully.
    pub async fn replay(&self, id: Uuid, force: bool) -> Result<WebhookEvent, BillingError> {
        let row = self
            .store
            .webhook_event(id)
            .await?
            .ok_or(BillingError::NotFound("webhook event"))?;

        if row.processing_status == ProcessingStatus::Processed && !force {
            return Err(BillingError::Validation(
                "event already processed; set force to replay anyway".into(),
            ));
        }

        let provider = self.provider(&row.provider)?;
        let body = serde_json::to_vec(&row.payload)
            .map_err(|e| BillingError::Validation(format!("stored payload unusable: {e}")))?;
        let event = provider.parse(&body)?;

        self.store.bump_webhook_retry(id).await?;
        self.dispatch(id, &event).await?;
        self.store
            .webhook_event(id)
            .await?
            .ok_or(BillingError::NotFound("webhook event"))
    }

    /// Applies the event and records the outcome on the row. Transient store
    /// errors propagate without marking, so the row stays pending.
    async fn dispatch(
        &self,
        row_id: Uuid,
        event: &BillingEvent,
    ) -> Result<&'static str, BillingError> {
        if let EventKind::Unknown(kind) = &event.kind {
            tracing::info!(event_id = %event.event_id, kind = %kind, "unrecognized event type ignored");
            self.store
                .mark_webhook_event(row_id, ProcessingStatus::Ignored, None)
                .await?;
            return Ok("ignored");
        }

        match self.apply(event).await {
            Ok(()) => {
                self.store
                    .mark_webhook_event(row_id, ProcessingStatus::Processed, None)
                    .await?;
                tracing::info!(event_id = %event.event_id, event_type = %event.event_type, "webhook processed");
                Ok("processed")
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                tracing::warn!(event_id = %event.event_id, error = %e, "webhook processing failed");
                self.store
                    .mark_webhook_event(row_id, ProcessingStatus::Failed, Some(&e.to_string()))
                    .await?;
                Ok("failed")
            }
        }
    }

    async fn apply(&self, event: &BillingEvent) -> Result<(), BillingError> {
        match event.kind {
            EventKind::SubscriptionActivated => {
                self.engine.activate_or_renew(event).await?;
            }
            EventKind::PaymentSucceeded => {
                let sub = self.engine.activate_or_renew(event).await?;
                let payment_ref = event.payment_ref.as_deref().ok_or_else(|| {
                    BillingError::Validation("payment event without payment ref".into())
                })?;
                ledger::record(
                    self.store.as_ref(),
                    sub.id,
                    payment_ref,
                    event
                        .amount_minor
                        .unwrap_or_else(|| self.engine.cycle_price_minor(sub.billing_cycle)),
                    self.currency(event),
                    TransactionStatus::Succeeded,
                    Some(json!({ "event_id": event.event_id })),
                )
                .await?;
            }
            EventKind::PaymentFailed => {
                let sub = self.engine.mark_past_due(event).await?;
                if let Some(payment_ref) = event.payment_ref.as_deref() {
                    ledger::record(
                        self.store.as_ref(),
                        sub.id,
                        payment_ref,
                        event.amount_minor.unwrap_or(0),
                        self.currency(event),
                        TransactionStatus::Failed,
                        Some(json!({ "event_id": event.event_id })),
                    )
                    .await?;
                }
            }
            EventKind::RenewalStatusChanged => {
                self.engine.set_renewal_status(event).await?;
            }
            EventKind::SubscriptionExpired => {
                self.engine.expire(event).await?;
            }
            EventKind::RefundIssued => {
                let sub = self.engine.resolve(event).await?;
                if let Some(payment_ref) = event.payment_ref.as_deref() {
                    ledger::record(
                        self.store.as_ref(),
                        sub.id,
                        &format!("refund-{payment_ref}"),
                        event.amount_minor.unwrap_or(0),
                        self.currency(event),
                        TransactionStatus::Refunded,
                        Some(json!({ "event_id": event.event_id })),
                    )
                    .await?;
                }
                if event.refund_full.unwrap_or(true) {
                    self.engine.revoke(sub.id, Some("refund".into())).await?;
                } else {
                    self.engine.downgrade_tier(sub.id).await?;
                }
            }
            EventKind::Unknown(_) => unreachable!("filtered in dispatch"),
        }
        Ok(())
    }

    fn currency<'a>(&'a self, event: &'a BillingEvent) -> &'a str {
        event
            .currency
            .as_deref()
            .unwrap_or(&self.engine.config().currency)
    }
}
