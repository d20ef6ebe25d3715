//! crates/diagnostic_core/src/quota.rs
//!
//! Decides whether a user may open a new diagnostic.
//!
//! A user with a running subscription is limited per subscription window; everyone
//! else is limited over their whole history. The lifetime fallback also counts
//! diagnostics created during earlier, now lapsed, subscriptions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Subscription, SubscriptionStatus};
use crate::ports::{DatabaseService, PortError, PortResult};

pub const REASON_PERIOD_LIMIT: &str = "You have reached the diagnostics limit for this subscription period.";
pub const REASON_LIFETIME_LIMIT: &str =
    "You have reached your diagnostics limit. Consider purchasing a subscription to raise it.";
pub const REASON_USER_NOT_FOUND: &str = "User not found.";

/// Which window the usage was counted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    /// Diagnostics created within the active subscription's `[start, end]`.
    Subscription,
    /// Every diagnostic the user ever created.
    Lifetime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    pub can_create: bool,
    pub remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QuotaDecision {
    fn denied(reason: &str) -> Self {
        Self {
            can_create: false,
            remaining: 0,
            reason: Some(reason.to_string()),
        }
    }
}

/// Remaining allowance, never negative.
pub fn remaining(limit: i32, used: i64) -> i64 {
    (i64::from(limit) - used).max(0)
}

/// Pure decision over an already counted usage.
pub fn evaluate(limit: i32, used: i64, scope: QuotaScope) -> QuotaDecision {
    let remaining = remaining(limit, used);
    if remaining > 0 {
        return QuotaDecision {
            can_create: true,
            remaining,
            reason: None,
        };
    }
    match scope {
        QuotaScope::Subscription => QuotaDecision::denied(REASON_PERIOD_LIMIT),
        QuotaScope::Lifetime => QuotaDecision::denied(REASON_LIFETIME_LIMIT),
    }
}

/// A subscription only counts as running while its end date lies in the future.
pub fn is_running(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    subscription.status == SubscriptionStatus::Active && subscription.end_date > now
}

//=========================================================================================
// Store-backed operations
//=========================================================================================

/// Subscription state as seen at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionState {
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub plan_id: Option<Uuid>,
}

impl SubscriptionState {
    fn none() -> Self {
        Self {
            is_active: false,
            start_date: None,
            end_date: None,
            plan_id: None,
        }
    }
}

/// Looks up the user's latest `active` subscription and flips it to `expired`
/// when its end date has passed. The flip is best-effort.
pub async fn check_subscription(
    db: &dyn DatabaseService,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> PortResult<SubscriptionState> {
    let Some(subscription) = db.latest_active_subscription(user_id).await? else {
        return Ok(SubscriptionState::none());
    };

    let is_active = is_running(&subscription, now);
    if !is_active {
        debug!(%user_id, subscription_id = %subscription.id, "Subscription has lapsed; marking expired");
        if let Err(e) = db.mark_subscription_expired(subscription.id).await {
            warn!(subscription_id = %subscription.id, error = %e, "Failed to mark subscription as expired");
        }
    }

    Ok(SubscriptionState {
        is_active,
        start_date: Some(subscription.start_date),
        end_date: Some(subscription.end_date),
        plan_id: Some(subscription.plan_id),
    })
}

/// Counts the usage that applies to the user given their subscription state.
async fn used_diagnostics(
    db: &dyn DatabaseService,
    user_id: Uuid,
    subscription: &SubscriptionState,
) -> PortResult<(i64, QuotaScope)> {
    match (subscription.is_active, subscription.start_date, subscription.end_date) {
        (true, Some(start), Some(end)) => {
            let used = db.count_user_diagnostics(user_id, Some((start, end))).await?;
            Ok((used, QuotaScope::Subscription))
        }
        _ => {
            let used = db.count_user_diagnostics(user_id, None).await?;
            Ok((used, QuotaScope::Lifetime))
        }
    }
}

/// Determines whether the user may create a new diagnostic right now.
pub async fn check_quota(
    db: &dyn DatabaseService,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> PortResult<QuotaDecision> {
    let subscription = check_subscription(db, user_id, now).await?;

    let user = match db.get_user_by_id(user_id).await {
        Ok(user) => user,
        Err(PortError::NotFound(_)) => return Ok(QuotaDecision::denied(REASON_USER_NOT_FOUND)),
        Err(e) => return Err(e),
    };

    let (used, scope) = used_diagnostics(db, user_id, &subscription).await?;
    let decision = evaluate(user.effective_limit(), used, scope);
    debug!(
        %user_id,
        used,
        limit = user.effective_limit(),
        ?scope,
        can_create = decision.can_create,
        "Quota evaluated"
    );
    Ok(decision)
}

/// Everything the dashboard shows about a user's allowance.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub subscription: SubscriptionState,
    pub remaining: i64,
    pub limit: i32,
}

pub async fn subscription_info(
    db: &dyn DatabaseService,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> PortResult<SubscriptionInfo> {
    let subscription = check_subscription(db, user_id, now).await?;
    let user = db.get_user_by_id(user_id).await?;
    let (used, _) = used_diagnostics(db, user_id, &subscription).await?;
    let limit = user.effective_limit();

    Ok(SubscriptionInfo {
        subscription,
        remaining: remaining(limit, used),
        limit,
    })
}
