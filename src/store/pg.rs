//! Postgres store backend.
//!
//! Idempotency guards live in the schema: `ON CONFLICT ... DO NOTHING` on the
//! unique keys for the ledger and webhook tables, and a version predicate on
//! the subscription update. The application never needs SELECT-then-INSERT.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    PaymentHistoryRecord, PaymentTransaction, ProcessingStatus, RecurringItem, Subscription,
    WebhookEvent,
};

use super::{BillingStore, EventInsert, LedgerInsert, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let sub = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM billing_subscriptions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    async fn subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        let sub = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM billing_subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    async fn subscription_by_provider_ref(
        &self,
        provider_subscription_ref: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let sub = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM billing_subscriptions WHERE provider_subscription_ref = $1",
        )
        .bind(provider_subscription_ref)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    async fn insert_subscription(&self, sub: &Subscription) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO billing_subscriptions (
                id, user_id, tier, billing_cycle, status,
                provider_customer_ref, provider_subscription_ref,
                current_period_start, current_period_end,
                cancel_at_period_end, canceled_at, cancel_reason,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(sub.id)
        .bind(sub.user_id)
        .bind(sub.tier)
        .bind(sub.billing_cycle)
        .bind(sub.status)
        .bind(&sub.provider_customer_ref)
        .bind(&sub.provider_subscription_ref)
        .bind(sub.current_period_start)
        .bind(sub.current_period_end)
        .bind(sub.cancel_at_period_end)
        .bind(sub.canceled_at)
        .bind(&sub.cancel_reason)
        .bind(sub.version)
        .bind(sub.created_at)
        .bind(sub.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_subscription(
        &self,
        sub: &Subscription,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE billing_subscriptions SET
                tier = $3,
                billing_cycle = $4,
                status = $5,
                provider_customer_ref = $6,
                provider_subscription_ref = $7,
                current_period_start = $8,
                current_period_end = $9,
                cancel_at_period_end = $10,
                canceled_at = $11,
                cancel_reason = $12,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(sub.id)
        .bind(expected_version)
        .bind(sub.tier)
        .bind(sub.billing_cycle)
        .bind(sub.status)
        .bind(&sub.provider_customer_ref)
        .bind(&sub.provider_subscription_ref)
        .bind(sub.current_period_start)
        .bind(sub.current_period_end)
        .bind(sub.cancel_at_period_end)
        .bind(sub.canceled_at)
        .bind(&sub.cancel_reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_transaction(
        &self,
        tx: &PaymentTransaction,
    ) -> Result<LedgerInsert, StoreError> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO billing_transactions (
                id, subscription_id, provider_payment_ref,
                amount_minor, currency, status, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (provider_payment_ref) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(tx.id)
        .bind(tx.subscription_id)
        .bind(&tx.provider_payment_ref)
        .bind(tx.amount_minor)
        .bind(&tx.currency)
        .bind(tx.status)
        .bind(&tx.metadata)
        .bind(tx.created_at)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(id) => Ok(LedgerInsert::Recorded(id)),
            None => {
                let existing: Uuid = sqlx::query_scalar(
                    "SELECT id FROM billing_transactions WHERE provider_payment_ref = $1",
                )
                .bind(&tx.provider_payment_ref)
                .fetch_one(&self.pool)
                .await?;
                Ok(LedgerInsert::Duplicate(existing))
            }
        }
    }

    async fn transactions_for_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentTransaction>(
            r#"
            SELECT * FROM billing_transactions
            WHERE subscription_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_webhook_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<EventInsert, StoreError> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO billing_webhook_events (
                id, event_id, provider, event_type, processing_status,
                payload, error, retry_count, received_at, processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(event.id)
        .bind(&event.event_id)
        .bind(&event.provider)
        .bind(&event.event_type)
        .bind(event.processing_status)
        .bind(&event.payload)
        .bind(&event.error)
        .bind(event.retry_count)
        .bind(event.received_at)
        .bind(event.processed_at)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(_) => Ok(EventInsert::Inserted),
            None => {
                let existing = sqlx::query_as::<_, WebhookEvent>(
                    "SELECT * FROM billing_webhook_events WHERE event_id = $1",
                )
                .bind(&event.event_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(EventInsert::Duplicate(existing))
            }
        }
    }

    async fn webhook_event(&self, id: Uuid) -> Result<Option<WebhookEvent>, StoreError> {
        let event = sqlx::query_as::<_, WebhookEvent>(
            "SELECT * FROM billing_webhook_events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn list_webhook_events(
        &self,
        event_type: Option<&str>,
        status: Option<ProcessingStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookEvent>, StoreError> {
        // Filters are optional, so the WHERE clause is assembled dynamically
        // with positional params kept in registration order.
        let mut sql = String::from("SELECT * FROM billing_webhook_events WHERE 1=1");
        let mut param_count = 0;

        if event_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ${param_count}"));
        }
        if status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND processing_status = ${param_count}"));
        }
        sql.push_str(&format!(
            " ORDER BY received_at DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        ));

        let mut query = sqlx::query_as::<_, WebhookEvent>(&sql);
        if let Some(t) = event_type {
            query = query.bind(t.to_string());
        }
        if let Some(s) = status {
            query = query.bind(s);
        }
        let rows = query.bind(limit).bind(offset).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn mark_webhook_event(
        &self,
        id: Uuid,
        status: ProcessingStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE billing_webhook_events SET
                processing_status = $2,
                error = $3,
                processed_at = CASE WHEN $2 = 'processed'::billing_webhook_status
                                    THEN NOW() ELSE processed_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bump_webhook_retry(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE billing_webhook_events SET retry_count = retry_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recurring_item(&self, id: Uuid) -> Result<Option<RecurringItem>, StoreError> {
        let item = sqlx::query_as::<_, RecurringItem>(
            "SELECT * FROM billing_recurring_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn recurring_items_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecurringItem>, StoreError> {
        let items = sqlx::query_as::<_, RecurringItem>(
            "SELECT * FROM billing_recurring_items WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn count_active_items(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM billing_recurring_items
            WHERE user_id = $1 AND status = 'active'::billing_item_status
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_recurring_item(&self, item: &RecurringItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO billing_recurring_items (
                id, user_id, name, cost_minor, currency,
                repeat_interval, renewal_date, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id)
        .bind(item.user_id)
        .bind(&item.name)
        .bind(item.cost_minor)
        .bind(&item.currency)
        .bind(item.repeat_interval)
        .bind(item.renewal_date)
        .bind(item.status)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_recurring_item(&self, item: &RecurringItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE billing_recurring_items SET
                name = $2,
                cost_minor = $3,
                currency = $4,
                repeat_interval = $5,
                renewal_date = $6,
                status = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(&item.name)
        .bind(item.cost_minor)
        .bind(&item.currency)
        .bind(item.repeat_interval)
        .bind(item.renewal_date)
        .bind(item.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_payment_history(
        &self,
        record: &PaymentHistoryRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO billing_payment_history (
                id, item_id, due_date, payment_date, status, amount_minor, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.item_id)
        .bind(record.due_date)
        .bind(record.payment_date)
        .bind(record.status)
        .bind(record.amount_minor)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn payment_history_for_item(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<PaymentHistoryRecord>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentHistoryRecord>(
            r#"
            SELECT * FROM billing_payment_history
            WHERE item_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
