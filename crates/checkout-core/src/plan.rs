//! Plan Tiers and Quota Gate
//!
//! Plan limits are static policy keyed by tier; nothing here is stored per
//! user. The gate is a plain check-then-act: two concurrent creations can
//! both pass and leave the owner one resource over the limit. That overshoot
//! is tolerated for a soft usage cap.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::UserId;
use crate::store::Store;

/// Subscription plan tiers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Builder,
    Pro,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Free, Plan::Builder, Plan::Pro];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Builder => "builder",
            Plan::Pro => "pro",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Builder => "Builder",
            Plan::Pro => "Pro",
        }
    }

    /// Monthly price in cents
    pub fn monthly_cents(&self) -> i64 {
        match self {
            Plan::Free => 0,
            Plan::Builder => 1900,
            Plan::Pro => 4900,
        }
    }

    /// Quota for a bounded resource
    pub fn limit(&self, resource: Resource) -> PlanLimit {
        match (self, resource) {
            (Plan::Free, Resource::Page) => PlanLimit::Limited(1),
            (Plan::Builder, Resource::Page) => PlanLimit::Limited(5),
            (Plan::Pro, Resource::Page) => PlanLimit::Unlimited,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Plan {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "builder" => Ok(Plan::Builder),
            "pro" => Ok(Plan::Pro),
            other => Err(CoreError::Validation(format!("Unknown plan: {other}"))),
        }
    }
}

/// Quota-bounded resource kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Page,
}

/// Resource limit for a plan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum PlanLimit {
    Limited(usize),
    Unlimited,
}

impl PlanLimit {
    /// Whether one more resource fits on top of `current`
    pub fn allows(&self, current: usize) -> bool {
        match self {
            PlanLimit::Limited(max) => current < *max,
            PlanLimit::Unlimited => true,
        }
    }

    pub fn as_option(&self) -> Option<usize> {
        match self {
            PlanLimit::Limited(max) => Some(*max),
            PlanLimit::Unlimited => None,
        }
    }
}

impl std::fmt::Display for PlanLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanLimit::Limited(max) => write!(f, "{max}"),
            PlanLimit::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Reject when `current` already reaches the plan's limit.
pub fn enforce_quota(plan: Plan, resource: Resource, current: usize) -> Result<()> {
    let limit = plan.limit(resource);
    if limit.allows(current) {
        Ok(())
    } else {
        Err(CoreError::QuotaExceeded {
            plan,
            current,
            limit,
        })
    }
}

/// Resolve the user's tier, count what they own and apply the quota.
pub async fn check_quota(store: &dyn Store, user_id: &UserId, resource: Resource) -> Result<()> {
    let user = store
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoreError::not_found("user", user_id.as_str()))?;

    let current = match resource {
        Resource::Page => store.count_pages_by_owner(user_id).await?,
    };

    enforce_quota(user.plan, resource, current).inspect_err(|_| {
        tracing::info!(
            user_id = %user_id,
            plan = %user.plan,
            current,
            "Plan quota reached"
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_boundary() {
        assert!(enforce_quota(Plan::Builder, Resource::Page, 4).is_ok());
        let err = enforce_quota(Plan::Builder, Resource::Page, 5).unwrap_err();
        match err {
            CoreError::QuotaExceeded {
                plan,
                current,
                limit,
            } => {
                assert_eq!(plan, Plan::Builder);
                assert_eq!(current, 5);
                assert_eq!(limit, PlanLimit::Limited(5));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_free_plan_allows_one_page() {
        assert!(enforce_quota(Plan::Free, Resource::Page, 0).is_ok());
        assert!(enforce_quota(Plan::Free, Resource::Page, 1).is_err());
    }

    #[test]
    fn test_unlimited_never_rejects() {
        assert!(enforce_quota(Plan::Pro, Resource::Page, 10_000).is_ok());
        assert!(enforce_quota(Plan::Pro, Resource::Page, usize::MAX).is_ok());
    }

    #[test]
    fn test_plan_parsing() {
        assert_eq!("Builder".parse::<Plan>().unwrap(), Plan::Builder);
        assert_eq!(" pro ".parse::<Plan>().unwrap(), Plan::Pro);
        assert!("enterprise".parse::<Plan>().is_err());
    }
}
