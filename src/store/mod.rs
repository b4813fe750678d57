//! Persistence abstraction for the reconciliation engine.
//!
//! Two implementations, config-swappable at startup:
//! - **PgStore**: production backend over Postgres/sqlx
//! - **MemoryStore**: in-memory backend for dev and hermetic tests
//!
//! The idempotency-critical operations (`insert_transaction`,
//! `insert_webhook_event`, `update_subscription`) are atomic in both
//! backends: a unique-key guard in Postgres, a single critical section in
//! memory.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    PaymentHistoryRecord, PaymentTransaction, ProcessingStatus, RecurringItem, Subscription,
    WebhookEvent,
};

/// Errors that can occur in a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient: the backend could not be reached. Webhook providers are
    /// asked to redeliver when this surfaces.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
            other => StoreError::Internal(other.to_string()),
        }
    }
}

/// Outcome of a ledger insert guarded by `provider_payment_ref` uniqueness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerInsert {
    Recorded(Uuid),
    /// The ref was already recorded; carries the existing row id.
    Duplicate(Uuid),
}

impl LedgerInsert {
    pub fn transaction_id(&self) -> Uuid {
        match self {
            LedgerInsert::Recorded(id) | LedgerInsert::Duplicate(id) => *id,
        }
    }
}

/// Outcome of a webhook-event insert guarded by `event_id` uniqueness
#[derive(Debug, Clone)]
pub enum EventInsert {
    Inserted,
    /// Another delivery won the race; carries the existing row.
    Duplicate(WebhookEvent),
}

#[async_trait]
pub trait BillingStore: Send + Sync {
    // ------------------------------------------------------------------
    // Subscriptions (singleton per user)
    // ------------------------------------------------------------------

    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError>;

    async fn subscription_for_user(&self, user_id: Uuid)
        -> Result<Option<Subscription>, StoreError>;

    async fn subscription_by_provider_ref(
        &self,
        provider_subscription_ref: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    async fn insert_subscription(&self, sub: &Subscription) -> Result<(), StoreError>;

    /// Conditional write: applies `sub` only when the stored version still
    /// equals `expected_version`, bumping the version on success. Returns
    /// false on a version mismatch so the caller can re-read and retry.
    async fn update_subscription(
        &self,
        sub: &Subscription,
        expected_version: i64,
    ) -> Result<bool, StoreError>;

    // ------------------------------------------------------------------
    // Payment transaction ledger (append-only)
    // ------------------------------------------------------------------

    async fn insert_transaction(
        &self,
        tx: &PaymentTransaction,
    ) -> Result<LedgerInsert, StoreError>;

    async fn transactions_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, StoreError>;

    // ------------------------------------------------------------------
    // Webhook events (audit + idempotency)
    // ------------------------------------------------------------------

    async fn insert_webhook_event(&self, event: &WebhookEvent)
        -> Result<EventInsert, StoreError>;

    async fn webhook_event(&self, id: Uuid) -> Result<Option<WebhookEvent>, StoreError>;

    async fn list_webhook_events(
        &self,
        event_type: Option<&str>,
        status: Option<ProcessingStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookEvent>, StoreError>;

    async fn mark_webhook_event(
        &self,
        id: Uuid,
        status: ProcessingStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn bump_webhook_retry(&self, id: Uuid) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Recurring items + payment history
    // ------------------------------------------------------------------

    async fn recurring_item(&self, id: Uuid) -> Result<Option<RecurringItem>, StoreError>;

    async fn recurring_items_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecurringItem>, StoreError>;

    async fn count_active_items(&self, user_id: Uuid) -> Result<i64, StoreError>;

    async fn insert_recurring_item(&self, item: &RecurringItem) -> Result<(), StoreError>;

    async fn update_recurring_item(&self, item: &RecurringItem) -> Result<(), StoreError>;

    async fn insert_payment_history(
        &self,
        record: &PaymentHistoryRecord,
    ) -> Result<(), StoreError>;

    async fn payment_history_for_item(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<PaymentHistoryRecord>, StoreError>;
}

impl std::fmt::Debug for dyn BillingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BillingStore")
    }
}
