//! Payment transaction ledger.
//!
//! Append-only: a duplicate `provider_payment_ref` is a successful no-op that
//! returns the existing row id, so webhook redelivery can never double-record
//! a payment. The ledger never touches subscription state.

use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{PaymentTransaction, TransactionStatus};
use crate::store::{BillingStore, LedgerInsert};

pub async fn record(
    store: &dyn BillingStore,
    subscription_id: Uuid,
    provider_payment_ref: &str,
    amount_minor: i64,
    currency: &str,
    status: TransactionStatus,
    metadata: Option<JsonValue>,
) -> Result<LedgerInsert, BillingError> {
    let tx = PaymentTransaction {
        id: Uuid::new_v4(),
        subscription_id,
        provider_payment_ref: provider_payment_ref.to_string(),
        amount_minor,
        currency: currency.to_string(),
        status,
        metadata,
        created_at: Utc::now(),
    };
    let outcome = store.insert_transaction(&tx).await?;
    if let LedgerInsert::Duplicate(existing) = outcome {
        tracing::debug!(
            provider_payment_ref = %tx.provider_payment_ref,
            transaction_id = %existing,
            "duplicate payment ref, ledger unchanged"
        );
    }
    Ok(outcome)
}

pub async fn history(
    store: &dyn BillingStore,
    subscription_id: Uuid,
) -> Result<Vec<PaymentTransaction>, BillingError> {
    Ok(store.transactions_for_subscription(subscription_id).await?)
}
