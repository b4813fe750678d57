#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use chrono::{Duration, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use sha2::Sha256;
use uuid::Uuid;

use billing_rs::config::Config;
use billing_rs::models::{
    BillingCycle, ItemStatus, PaymentHistoryRecord, PaymentTransaction, ProcessingStatus,
    RecurringItem, RepeatInterval, Subscription, SubscriptionStatus, Tier, WebhookEvent,
};
use billing_rs::store::{BillingStore, EventInsert, LedgerInsert, MemoryStore, StoreError};

pub const STRIPE_TEST_SECRET: &str = "whsec_test_secret";
pub const REVENUECAT_TEST_SECRET: &str = "rc_test_secret";
pub const MONTHLY_PRICE_MINOR: i64 = 999;
pub const ANNUAL_PRICE_MINOR: i64 = 9900;
pub const FREE_TIER_ITEM_LIMIT: i64 = 5;

pub fn test_config() -> Config {
    Config {
        database_url: None,
        store_backend: "memory".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        stripe_webhook_secret: STRIPE_TEST_SECRET.to_string(),
        revenuecat_webhook_secret: REVENUECAT_TEST_SECRET.to_string(),
        free_tier_item_limit: FREE_TIER_ITEM_LIMIT,
        monthly_price_minor: MONTHLY_PRICE_MINOR,
        annual_price_minor: ANNUAL_PRICE_MINOR,
        currency: "USD".to_string(),
    }
}

/// Build the app over a fresh in-memory store, returning the store handle so
/// tests can seed and inspect state directly.
pub fn app() -> (Router, Arc<dyn BillingStore>) {
    let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
    let router = billing_rs::build_app(store.clone(), &test_config());
    (router, store)
}

/// Read response body as JSON.
pub async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn unique_event_id() -> String {
    format!("evt_{}", Uuid::new_v4())
}

pub fn unique_sub_ref() -> String {
    format!("sub_{}", Uuid::new_v4())
}

/// Generate a Stripe-format signature header for a payload.
pub fn stripe_signature(payload: &str, secret: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Generate a RevenueCat-format signature header for a payload.
pub fn revenuecat_signature(payload: &str, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Seed a free-tier subscription row.
pub async fn seed_free_subscription(store: &dyn BillingStore) -> Subscription {
    let sub = Subscription::new_free(Uuid::new_v4());
    store.insert_subscription(&sub).await.unwrap();
    sub
}

/// Seed a premium subscription in the given status with a provider ref and a
/// current 30-day period.
pub async fn seed_premium_subscription(
    store: &dyn BillingStore,
    status: SubscriptionStatus,
    cycle: BillingCycle,
) -> Subscription {
    let now = Utc::now();
    let mut sub = Subscription::new_free(Uuid::new_v4());
    sub.tier = Tier::Premium;
    sub.billing_cycle = cycle;
    sub.status = status;
    sub.provider_customer_ref = Some(format!("cus_{}", Uuid::new_v4()));
    sub.provider_subscription_ref = Some(unique_sub_ref());
    sub.current_period_start = Some(now - Duration::days(10));
    sub.current_period_end = Some(now + Duration::days(20));
    store.insert_subscription(&sub).await.unwrap();
    sub
}

/// Seed a recurring item for a user.
pub async fn seed_item(
    store: &dyn BillingStore,
    user_id: Uuid,
    name: &str,
    interval: RepeatInterval,
    renewal_date: Option<NaiveDate>,
    status: ItemStatus,
) -> RecurringItem {
    let now = Utc::now();
    let item = RecurringItem {
        id: Uuid::new_v4(),
        user_id,
        name: name.to_string(),
        cost_minor: 1599,
        currency: "USD".to_string(),
        repeat_interval: interval,
        renewal_date,
        status,
        created_at: now,
        updated_at: now,
    };
    store.insert_recurring_item(&item).await.unwrap();
    item
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Memory store that fails the first conditional subscription write with a
/// transient error, then recovers. Models a backend outage striking in the
/// middle of webhook dispatch.
pub struct OutageOnceStore {
    inner: MemoryStore,
    tripped: AtomicBool,
}

impl OutageOnceStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            tripped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BillingStore for OutageOnceStore {
    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        self.inner.subscription(id).await
    }

    async fn subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        self.inner.subscription_for_user(user_id).await
    }

    async fn subscription_by_provider_ref(
        &self,
        provider_subscription_ref: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        self.inner
            .subscription_by_provider_ref(provider_subscription_ref)
            .await
    }

    async fn insert_subscription(&self, sub: &Subscription) -> Result<(), StoreError> {
        self.inner.insert_subscription(sub).await
    }

    async fn update_subscription(
        &self,
        sub: &Subscription,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.update_subscription(sub, expected_version).await
    }

    async fn insert_transaction(
        &self,
        tx: &PaymentTransaction,
    ) -> Result<LedgerInsert, StoreError> {
        self.inner.insert_transaction(tx).await
    }

    async fn transactions_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        self.inner.transactions_for_subscription(subscription_id).await
    }

    async fn insert_webhook_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<EventInsert, StoreError> {
        self.inner.insert_webhook_event(event).await
    }

    async fn webhook_event(&self, id: Uuid) -> Result<Option<WebhookEvent>, StoreError> {
        self.inner.webhook_event(id).await
    }

    async fn list_webhook_events(
        &self,
        event_type: Option<&str>,
        status: Option<ProcessingStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookEvent>, StoreError> {
        self.inner
            .list_webhook_events(event_type, status, limit, offset)
            .await
    }

    async fn mark_webhook_event(
        &self,
        id: Uuid,
        status: ProcessingStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.mark_webhook_event(id, status, error).await
    }

    async fn bump_webhook_retry(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.bump_webhook_retry(id).await
    }

    async fn recurring_item(&self, id: Uuid) -> Result<Option<RecurringItem>, StoreError> {
        self.inner.recurring_item(id).await
    }

    async fn recurring_items_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecurringItem>, StoreError> {
        self.inner.recurring_items_for_user(user_id).await
    }

    async fn count_active_items(&self, user_id: Uuid) -> Result<i64, StoreError> {
        self.inner.count_active_items(user_id).await
    }

    async fn insert_recurring_item(&self, item: &RecurringItem) -> Result<(), StoreError> {
        self.inner.insert_recurring_item(item).await
    }

    async fn update_recurring_item(&self, item: &RecurringItem) -> Result<(), StoreError> {
        self.inner.update_recurring_item(item).await
    }

    async fn insert_payment_history(
        &self,
        record: &PaymentHistoryRecord,
    ) -> Result<(), StoreError> {
        self.inner.insert_payment_history(record).await
    }

    async fn payment_history_for_item(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<PaymentHistoryRecord>, StoreError> {
        self.inner.payment_history_for_item(item_id).await
    }
}
