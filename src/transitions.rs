//! Subscription status transition table.
//!
//! Every state-machine operation validates against this table before writing,
//! so invalid transitions are rejected structurally instead of ad hoc inside
//! each webhook branch.

use crate::models::SubscriptionStatus;

/// Whether the state machine permits moving `from` → `to`.
///
/// `Active → Active` covers renewals (a fresh billing period on an already
/// active subscription). `Canceled → Active` is re-subscription: the singleton
/// row is reused for a logically new lifecycle.
pub fn allows(from: SubscriptionStatus, to: SubscriptionStatus) -> bool {
    use SubscriptionStatus::*;
    matches!(
        (from, to),
        (Trialing, Active)
            | (Trialing, Canceled)
            | (Active, Active)
            | (Active, PastDue)
            | (Active, Paused)
            | (Active, Canceled)
            | (PastDue, Active)
            | (PastDue, Canceled)
            | (Paused, Active)
            | (Incomplete, Active)
            | (Incomplete, Canceled)
            | (Canceled, Active)
    )
}
