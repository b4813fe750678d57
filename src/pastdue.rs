//! Past-due detection and payment confirmation for recurring items.
//!
//! All date logic is calendar-date arithmetic in the caller's local date
//! (`as_of`), never instant comparison through UTC, so an item due "today"
//! is not past due anywhere on Earth.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{
    ItemStatus, PastDueItem, PaymentHistoryRecord, PaymentOutcome, RecurringItem,
};
use crate::store::BillingStore;

/// Active items whose renewal date is strictly before `as_of`, oldest first.
pub async fn find_past_due(
    store: &dyn BillingStore,
    user_id: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<PastDueItem>, BillingError> {
    let items = store.recurring_items_for_user(user_id).await?;
    let mut past_due: Vec<PastDueItem> = items
        .into_iter()
        .filter(|i| i.status == ItemStatus::Active)
        .filter_map(|i| {
            let due = i.renewal_date?;
            if due < as_of {
                Some(PastDueItem {
                    days_overdue: (as_of - due).num_days(),
                    item: i,
                })
            } else {
                None
            }
        })
        .collect();
    past_due.sort_by_key(|p| p.item.renewal_date);
    Ok(past_due)
}

/// Records the outcome for the item's current due date and advances the
/// renewal date through the interval calculator.
///
/// `paid` and `skipped` advance identically; the distinction is kept only in
/// the history record. One-time items are dismissed instead of advanced.
pub async fn confirm_payment(
    store: &dyn BillingStore,
    item_id: Uuid,
    outcome: PaymentOutcome,
    payment_date: Option<NaiveDate>,
) -> Result<RecurringItem, BillingError> {
    let mut item = store
        .recurring_item(item_id)
        .await?
        .ok_or(BillingError::NotFound("recurring item"))?;

    let due_date = item
        .renewal_date
        .ok_or_else(|| BillingError::Validation("item has no pending due date".into()))?;

    let record = PaymentHistoryRecord {
        id: Uuid::new_v4(),
        item_id: item.id,
        due_date,
        payment_date: match outcome {
            PaymentOutcome::Paid => payment_date.or_else(|| Some(Utc::now().date_naive())),
            PaymentOutcome::Skipped => None,
        },
        status: outcome.into(),
        amount_minor: item.cost_minor,
        created_at: Utc::now(),
    };
    store.insert_payment_history(&record).await?;

    // `never` yields None here, which is exactly the dismissal semantics.
    item.renewal_date = item.repeat_interval.next_renewal(due_date);
    store.update_recurring_item(&item).await?;

    tracing::info!(
        item_id = %item.id,
        due_date = %due_date,
        outcome = ?outcome,
        next_due = ?item.renewal_date,
        "past-due item confirmed"
    );
    Ok(item)
}
