//! Subscription state machine.
//!
//! Every operation here follows the same shape: resolve the singleton
//! subscription row, validate the requested move against the transition
//! table, then write through a version-checked conditional update. A version
//! mismatch means another writer got there first; the operation re-reads and
//! re-validates from scratch, up to [`MAX_WRITE_ATTEMPTS`] times.
//!
//! No operation awaits the network between read and write, so the retry loop
//! only ever races other local writers.

use std::sync::Arc;

use chrono::{Months, Utc};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{
    BillingCycle, CanAddItemResponse, Subscription, SubscriptionStatus, SwitchCycleResponse, Tier,
};
use crate::provider::BillingEvent;
use crate::proration;
use crate::store::BillingStore;
use crate::transitions;

const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Pricing and policy knobs, loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub monthly_price_minor: i64,
    pub annual_price_minor: i64,
    pub currency: String,
    pub free_tier_item_limit: i64,
}

#[derive(Clone)]
pub struct BillingEngine {
    store: Arc<dyn BillingStore>,
    cfg: EngineConfig,
}

impl BillingEngine {
    pub fn new(store: Arc<dyn BillingStore>, cfg: EngineConfig) -> Self {
        Self { store, cfg }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn cycle_price_minor(&self, cycle: BillingCycle) -> i64 {
        match cycle {
            BillingCycle::Monthly => self.cfg.monthly_price_minor,
            BillingCycle::Annual => self.cfg.annual_price_minor,
            BillingCycle::None => 0,
        }
    }

    /// Read-validate-write loop over the optimistic version token.
    ///
    /// `mutate` returns false when the row is already in the desired state;
    /// the operation then succeeds without writing, which is what makes
    /// webhook redelivery harmless at this layer.
    async fn commit<F>(
        &self,
        subscription_id: Uuid,
        mutate: F,
    ) -> Result<Subscription, BillingError>
    where
        F: Fn(&mut Subscription) -> Result<bool, BillingError>,
    {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let current = self
                .store
                .subscription(subscription_id)
                .await?
                .ok_or(BillingError::NotFound("subscription"))?;

            let mut next = current.clone();
            if !mutate(&mut next)? {
                return Ok(current);
            }

            if self.store.update_subscription(&next, current.version).await? {
                next.version = current.version + 1;
                return Ok(next);
            }
            tracing::debug!(
                subscription_id = %subscription_id,
                attempt,
                "version conflict, re-reading"
            );
        }
        Err(BillingError::Conflict(format!(
            "subscription {subscription_id} kept changing under us"
        )))
    }

    fn require_transition(
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<(), BillingError> {
        if transitions::allows(from, to) {
            Ok(())
        } else {
            Err(BillingError::InvalidTransition(format!(
                "{from:?} -> {to:?}"
            )))
        }
    }

    /// Resolves the subscription a provider event is about: by entitlement
    /// ref first, falling back to the user id carried in provider metadata
    /// (which is how a ref gets attached on first activation).
    pub async fn resolve(&self, event: &BillingEvent) -> Result<Subscription, BillingError> {
        if let Some(sub_ref) = event.subscription_ref.as_deref() {
            if let Some(sub) = self.store.subscription_by_provider_ref(sub_ref).await? {
                return Ok(sub);
            }
        }
        if let Some(user_id) = event.user_id {
            if let Some(sub) = self.store.subscription_for_user(user_id).await? {
                return Ok(sub);
            }
        }
        Err(BillingError::NotFound("subscription"))
    }

    // ------------------------------------------------------------------
    // Provider-driven operations
    // ------------------------------------------------------------------

    /// Grants or extends premium entitlement. Idempotent on the billing
    /// period: a redelivered event carrying a period end the row already has
    /// is a no-op.
    pub async fn activate_or_renew(
        &self,
        event: &BillingEvent,
    ) -> Result<Subscription, BillingError> {
        let sub = self.resolve(event).await?;
        let event = event.clone();
        self.commit(sub.id, move |s| {
            let already_current = s.status == SubscriptionStatus::Active
                && s.tier == Tier::Premium
                && event.period_end.is_some()
                && s.current_period_end == event.period_end;
            if already_current {
                return Ok(false);
            }
            Self::require_transition(s.status, SubscriptionStatus::Active)?;

            s.status = SubscriptionStatus::Active;
            s.tier = Tier::Premium;
            if let Some(cycle) = event.billing_cycle {
                s.billing_cycle = cycle;
            } else if s.billing_cycle == BillingCycle::None {
                s.billing_cycle = BillingCycle::Monthly;
            }
            if event.subscription_ref.is_some() {
                s.provider_subscription_ref = event.subscription_ref.clone();
            }
            if event.customer_ref.is_some() {
                s.provider_customer_ref = event.customer_ref.clone();
            }
            if event.period_start.is_some() {
                s.current_period_start = event.period_start;
            }
            if event.period_end.is_some() {
                s.current_period_end = event.period_end;
            }
            s.cancel_at_period_end = event.cancel_at_period_end.unwrap_or(false);
            s.canceled_at = None;
            s.cancel_reason = None;
            Ok(true)
        })
        .await
    }

    /// A payment attempt failed. The subscription enters its grace window;
    /// the tier is retained so entitlement survives until expiry.
    pub async fn mark_past_due(&self, event: &BillingEvent) -> Result<Subscription, BillingError> {
        let sub = self.resolve(event).await?;
        self.commit(sub.id, |s| {
            if s.status == SubscriptionStatus::PastDue {
                return Ok(false);
            }
            Self::require_transition(s.status, SubscriptionStatus::PastDue)?;
            s.status = SubscriptionStatus::PastDue;
            Ok(true)
        })
        .await
    }

    /// Sets or clears the cancel-at-period-end intent without moving status.
    pub async fn set_renewal_status(
        &self,
        event: &BillingEvent,
    ) -> Result<Subscription, BillingError> {
        let flag = event.cancel_at_period_end.ok_or_else(|| {
            BillingError::Validation("renewal status event without cancel flag".into())
        })?;
        let sub = self.resolve(event).await?;
        self.commit(sub.id, move |s| {
            if s.cancel_at_period_end == flag {
                return Ok(false);
            }
            s.cancel_at_period_end = flag;
            if !flag {
                s.canceled_at = None;
                s.cancel_reason = None;
            }
            Ok(true)
        })
        .await
    }

    /// Terminal downgrade: the entitlement ended (grace exhausted, or a
    /// scheduled cancellation reached the period boundary).
    pub async fn expire(&self, event: &BillingEvent) -> Result<Subscription, BillingError> {
        let sub = self.resolve(event).await?;
        self.expire_subscription(sub.id).await
    }

    pub async fn expire_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Subscription, BillingError> {
        self.commit(subscription_id, |s| {
            if s.status == SubscriptionStatus::Canceled && s.tier == Tier::Free {
                return Ok(false);
            }
            let eligible = match s.status {
                SubscriptionStatus::PastDue => true,
                SubscriptionStatus::Active if s.cancel_at_period_end => true,
                _ => false,
            };
            if !eligible {
                return Err(BillingError::InvalidTransition(format!(
                    "{:?} is not eligible for expiry",
                    s.status
                )));
            }
            Self::downgrade(s);
            Ok(true)
        })
        .await
    }

    /// Immediate revocation, used for full refunds and immediate cancels.
    pub async fn revoke(
        &self,
        subscription_id: Uuid,
        reason: Option<String>,
    ) -> Result<Subscription, BillingError> {
        self.commit(subscription_id, move |s| {
            if s.status == SubscriptionStatus::Canceled && s.tier == Tier::Free {
                return Ok(false);
            }
            Self::require_transition(s.status, SubscriptionStatus::Canceled)?;
            Self::downgrade(s);
            s.cancel_reason = reason.clone();
            Ok(true)
        })
        .await
    }

    /// Partial-refund consequence: the tier drops but the subscription
    /// lifecycle is untouched (a free, active row is the account default).
    pub async fn downgrade_tier(
        &self,
        subscription_id: Uuid,
    ) -> Result<Subscription, BillingError> {
        self.commit(subscription_id, |s| {
            if s.tier == Tier::Free {
                return Ok(false);
            }
            s.tier = Tier::Free;
            s.billing_cycle = BillingCycle::None;
            Ok(true)
        })
        .await
    }

    fn downgrade(s: &mut Subscription) {
        s.status = SubscriptionStatus::Canceled;
        s.tier = Tier::Free;
        s.billing_cycle = BillingCycle::None;
        // The entitlement ref is dead; the customer ref stays for audit.
        s.provider_subscription_ref = None;
        s.cancel_at_period_end = false;
        s.canceled_at = Some(Utc::now());
    }

    // ------------------------------------------------------------------
    // Client-driven operations
    // ------------------------------------------------------------------

    pub async fn subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Subscription, BillingError> {
        self.store
            .subscription_for_user(user_id)
            .await?
            .ok_or(BillingError::NotFound("subscription"))
    }

    pub async fn cancel(
        &self,
        user_id: Uuid,
        at_period_end: bool,
        reason: Option<String>,
    ) -> Result<Subscription, BillingError> {
        let sub = self.subscription_for_user(user_id).await?;
        if at_period_end {
            self.commit(sub.id, move |s| {
                if s.tier != Tier::Premium {
                    return Err(BillingError::Validation(
                        "no paid subscription to cancel".into(),
                    ));
                }
                if s.cancel_at_period_end {
                    return Ok(false);
                }
                s.cancel_at_period_end = true;
                s.canceled_at = Some(Utc::now());
                s.cancel_reason = reason.clone();
                Ok(true)
            })
            .await
        } else {
            self.revoke(sub.id, reason).await
        }
    }

    pub async fn pause(&self, user_id: Uuid) -> Result<Subscription, BillingError> {
        let sub = self.subscription_for_user(user_id).await?;
        self.commit(sub.id, |s| {
            if s.status == SubscriptionStatus::Paused {
                return Ok(false);
            }
            Self::require_transition(s.status, SubscriptionStatus::Paused)?;
            s.status = SubscriptionStatus::Paused;
            Ok(true)
        })
        .await
    }

    /// Resume starts a fresh billing period at the resume instant rather
    /// than reviving the period that was interrupted.
    pub async fn resume(&self, user_id: Uuid) -> Result<Subscription, BillingError> {
        let sub = self.subscription_for_user(user_id).await?;
        self.commit(sub.id, |s| {
            if s.status == SubscriptionStatus::Active {
                return Ok(false);
            }
            Self::require_transition(s.status, SubscriptionStatus::Active)?;
            let now = Utc::now();
            s.status = SubscriptionStatus::Active;
            s.current_period_start = Some(now);
            s.current_period_end = match s.billing_cycle {
                BillingCycle::Monthly => now.checked_add_months(Months::new(1)),
                BillingCycle::Annual => now.checked_add_months(Months::new(12)),
                BillingCycle::None => None,
            };
            Ok(true)
        })
        .await
    }

    /// Switches the billing cycle on an active subscription and reports the
    /// prorated credit for the unused remainder of the current period. The
    /// credit is informational here; it hits the ledger when the provider
    /// confirms the plan change.
    pub async fn switch_billing_cycle(
        &self,
        user_id: Uuid,
        new_cycle: BillingCycle,
    ) -> Result<(Subscription, SwitchCycleResponse), BillingError> {
        if new_cycle == BillingCycle::None {
            return Err(BillingError::Validation(
                "cannot switch to the empty billing cycle".into(),
            ));
        }
        let sub = self.subscription_for_user(user_id).await?;
        if sub.status != SubscriptionStatus::Active || sub.tier != Tier::Premium {
            return Err(BillingError::InvalidTransition(
                "cycle switches require an active paid subscription".into(),
            ));
        }
        if sub.billing_cycle == new_cycle {
            return Err(BillingError::Validation(
                "subscription is already on that billing cycle".into(),
            ));
        }

        let credit_minor = match (sub.current_period_start, sub.current_period_end) {
            (Some(start), Some(end)) => {
                let total_days = (end - start).num_days();
                let unused_days = (end - Utc::now()).num_days().max(0);
                proration::switch_credit_minor(
                    unused_days,
                    total_days,
                    self.cycle_price_minor(sub.billing_cycle),
                )
            }
            _ => 0,
        };

        let updated = self
            .commit(sub.id, move |s| {
                if s.status != SubscriptionStatus::Active || s.tier != Tier::Premium {
                    return Err(BillingError::InvalidTransition(
                        "cycle switches require an active paid subscription".into(),
                    ));
                }
                if s.billing_cycle == new_cycle {
                    return Ok(false);
                }
                s.billing_cycle = new_cycle;
                Ok(true)
            })
            .await?;

        Ok((
            updated,
            SwitchCycleResponse {
                new_cycle,
                credit_minor,
                currency: self.cfg.currency.clone(),
            },
        ))
    }

    /// Free-tier item cap check. Users without a subscription row count as
    /// free tier.
    pub async fn can_add_item(&self, user_id: Uuid) -> Result<CanAddItemResponse, BillingError> {
        let premium = self
            .store
            .subscription_for_user(user_id)
            .await?
            .map(|s| s.tier == Tier::Premium)
            .unwrap_or(false);
        let current_count = self.store.count_active_items(user_id).await?;
        if premium {
            return Ok(CanAddItemResponse {
                allowed: true,
                current_count,
                limit: None,
            });
        }
        let limit = self.cfg.free_tier_item_limit;
        Ok(CanAddItemResponse {
            allowed: current_count < limit,
            current_count,
            limit: Some(limit),
        })
    }
}
