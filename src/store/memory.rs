//! In-memory store backend for dev and hermetic tests.
//!
//! A single mutex guards all tables, which makes the insert-or-detect
//! operations and the version-checked subscription update naturally atomic.
//! No lock is held across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    ItemStatus, PaymentHistoryRecord, PaymentTransaction, ProcessingStatus, RecurringItem,
    Subscription, WebhookEvent,
};

use super::{BillingStore, EventInsert, LedgerInsert, StoreError};

#[derive(Default)]
struct Inner {
    subscriptions: HashMap<Uuid, Subscription>,
    transactions: Vec<PaymentTransaction>,
    webhook_events: Vec<WebhookEvent>,
    items: HashMap<Uuid, RecurringItem>,
    history: Vec<PaymentHistoryRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-write; propagating the panic is
        // the only sound option for a test/dev backend.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let inner = self.lock();
        Ok(inner.subscriptions.get(&id).cloned())
    }

    async fn subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .subscriptions
            .values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn subscription_by_provider_ref(
        &self,
        provider_subscription_ref: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .subscriptions
            .values()
            .find(|s| {
                s.provider_subscription_ref.as_deref() == Some(provider_subscription_ref)
            })
            .cloned())
    }

    async fn insert_subscription(&self, sub: &Subscription) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.subscriptions.values().any(|s| s.user_id == sub.user_id) {
            return Err(StoreError::Internal(format!(
                "subscription already exists for user {}",
                sub.user_id
            )));
        }
        inner.subscriptions.insert(sub.id, sub.clone());
        Ok(())
    }

    async fn update_subscription(
        &self,
        sub: &Subscription,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.subscriptions.get_mut(&sub.id) {
            Some(stored) if stored.version == expected_version => {
                let mut next = sub.clone();
                next.version = expected_version + 1;
                next.updated_at = Utc::now();
                *stored = next;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::Internal(format!(
                "subscription {} does not exist",
                sub.id
            ))),
        }
    }

    async fn insert_transaction(
        &self,
        tx: &PaymentTransaction,
    ) -> Result<LedgerInsert, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .transactions
            .iter()
            .find(|t| t.provider_payment_ref == tx.provider_payment_ref)
        {
            return Ok(LedgerInsert::Duplicate(existing.id));
        }
        inner.transactions.push(tx.clone());
        Ok(LedgerInsert::Recorded(tx.id))
    }

    async fn transactions_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        let inner = self.lock();
        let mut rows: Vec<PaymentTransaction> = inner
            .transactions
            .iter()
            .filter(|t| t.subscription_id == subscription_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_webhook_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<EventInsert, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .webhook_events
            .iter()
            .find(|e| e.event_id == event.event_id)
        {
            return Ok(EventInsert::Duplicate(existing.clone()));
        }
        inner.webhook_events.push(event.clone());
        Ok(EventInsert::Inserted)
    }

    async fn webhook_event(&self, id: Uuid) -> Result<Option<WebhookEvent>, StoreError> {
        let inner = self.lock();
        Ok(inner.webhook_events.iter().find(|e| e.id == id).cloned())
    }

    async fn list_webhook_events(
        &self,
        event_type: Option<&str>,
        status: Option<ProcessingStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookEvent>, StoreError> {
        let inner = self.lock();
        let mut rows: Vec<WebhookEvent> = inner
            .webhook_events
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| status.map_or(true, |s| e.processing_status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn mark_webhook_event(
        &self,
        id: Uuid,
        status: ProcessingStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let event = inner
            .webhook_events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::Internal(format!("webhook event {id} does not exist")))?;
        event.processing_status = status;
        event.error = error.map(|s| s.to_string());
        if status == ProcessingStatus::Processed {
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn bump_webhook_retry(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let event = inner
            .webhook_events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::Internal(format!("webhook event {id} does not exist")))?;
        event.retry_count += 1;
        Ok(())
    }

    async fn recurring_item(&self, id: Uuid) -> Result<Option<RecurringItem>, StoreError> {
        let inner = self.lock();
        Ok(inner.items.get(&id).cloned())
    }

    async fn recurring_items_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecurringItem>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .items
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_active_items(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let inner = self.lock();
        Ok(inner
            .items
            .values()
            .filter(|i| i.user_id == user_id && i.status == ItemStatus::Active)
            .count() as i64)
    }

    async fn insert_recurring_item(&self, item: &RecurringItem) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn update_recurring_item(&self, item: &RecurringItem) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.items.contains_key(&item.id) {
            return Err(StoreError::Internal(format!(
                "recurring item {} does not exist",
                item.id
            )));
        }
        let mut next = item.clone();
        next.updated_at = Utc::now();
        inner.items.insert(item.id, next);
        Ok(())
    }

    async fn insert_payment_history(
        &self,
        record: &PaymentHistoryRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.history.push(record.clone());
        Ok(())
    }

    async fn payment_history_for_item(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<PaymentHistoryRecord>, StoreError> {
        let inner = self.lock();
        let mut rows: Vec<PaymentHistoryRecord> = inner
            .history
            .iter()
            .filter(|h| h.item_id == item_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}
