use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// ============================================================================
// SUBSCRIPTION MODELS
// ============================================================================

/// Entitlement tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
}

/// Paid-tier billing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_cycle", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Annual,
    None,
}

/// Subscription status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    Paused,
}

/// The singleton subscription record, one per user.
///
/// Mutated only by the state machine; `version` is the optimistic-concurrency
/// token checked on every conditional write.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: Tier,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub provider_customer_ref: Option<String>,
    pub provider_subscription_ref: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// The free/active record created at account creation.
    pub fn new_free(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            tier: Tier::Free,
            billing_cycle: BillingCycle::None,
            status: SubscriptionStatus::Active,
            provider_customer_ref: None,
            provider_subscription_ref: None,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            cancel_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request body for canceling a subscription
#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionRequest {
    pub at_period_end: Option<bool>,
    pub reason: Option<String>,
}

/// Request body for switching billing cycle
#[derive(Debug, Deserialize)]
pub struct SwitchCycleRequest {
    pub new_cycle: BillingCycle,
}

/// Proration outcome returned from a cycle switch
#[derive(Debug, Serialize)]
pub struct SwitchCycleResponse {
    pub new_cycle: BillingCycle,
    pub credit_minor: i64,
    pub currency: String,
}

/// Request body for a client refund request
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reason: Option<String>,
}

/// Response for the item-limit check
#[derive(Debug, Serialize, Deserialize)]
pub struct CanAddItemResponse {
    pub allowed: bool,
    pub current_count: i64,
    /// None means unlimited (premium tier).
    pub limit: Option<i64>,
}

// ============================================================================
// PAYMENT TRANSACTION MODELS
// ============================================================================

/// Payment transaction status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
}

/// Append-only ledger row. Rows with `succeeded`/`refunded` status are never
/// mutated; corrections are new rows against the same subscription.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub provider_payment_ref: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// WEBHOOK EVENT MODELS
// ============================================================================

/// Webhook processing status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_webhook_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processed,
    Failed,
    Ignored,
}

/// Audit/idempotency record, one per inbound provider notification.
/// `event_id` uniqueness is the sole idempotency guarantee.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub event_id: String,
    pub provider: String,
    pub event_type: String,
    pub processing_status: ProcessingStatus,
    pub payload: JsonValue,
    pub error: Option<String>,
    pub retry_count: i32,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Request to replay a failed webhook
#[derive(Debug, Deserialize)]
pub struct ReplayWebhookRequest {
    pub force: Option<bool>,
}

/// Query parameters for listing webhooks
#[derive(Debug, Deserialize)]
pub struct ListWebhooksQuery {
    pub event_type: Option<String>,
    pub status: Option<ProcessingStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================================
// RECURRING ITEM MODELS
// ============================================================================

/// User-tracked recurring charge interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_repeat_interval", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RepeatInterval {
    Weekly,
    Biweekly,
    Semimonthly,
    Monthly,
    Bimonthly,
    Quarterly,
    Semiannually,
    Yearly,
    Never,
}

/// Recurring item status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_item_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Active,
    Paused,
    Canceled,
}

/// A billing obligation the user tracks, independent of the paid-tier
/// subscription. `renewal_date` is None once a one-time item is dismissed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecurringItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub cost_minor: i64,
    pub currency: String,
    pub repeat_interval: RepeatInterval,
    pub renewal_date: Option<NaiveDate>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Past-due listing entry
#[derive(Debug, Serialize, Deserialize)]
pub struct PastDueItem {
    #[serde(flatten)]
    pub item: RecurringItem,
    pub days_overdue: i64,
}

/// Query parameters for the past-due scan. `as_of` is the caller's local
/// calendar date; date comparisons never shift through UTC.
#[derive(Debug, Deserialize)]
pub struct PastDueQuery {
    pub as_of: Option<NaiveDate>,
}

// ============================================================================
// PAYMENT HISTORY MODELS
// ============================================================================

/// Payment history outcome enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billing_history_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Paid,
    Skipped,
    Pending,
    Cancelled,
}

/// Immutable record of a past-due confirmation. Every renewal-date advance is
/// paired with exactly one of these for the due date it supersedes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentHistoryRecord {
    pub id: Uuid,
    pub item_id: Uuid,
    pub due_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub status: HistoryStatus,
    pub amount_minor: i64,
    pub created_at: DateTime<Utc>,
}

/// User-confirmed outcome for a past-due item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Paid,
    Skipped,
}

impl From<PaymentOutcome> for HistoryStatus {
    fn from(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Paid => HistoryStatus::Paid,
            PaymentOutcome::Skipped => HistoryStatus::Skipped,
        }
    }
}

/// Request body for confirming a past-due item
#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub outcome: PaymentOutcome,
    pub payment_date: Option<NaiveDate>,
}

// ============================================================================
// ERROR RESPONSE
// ============================================================================

/// Standard error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
