//! Domain Model
//!
//! Users own pages, pages collect submissions, and every processor checkout
//! session is tracked as a payment. Amounts are always integer minor
//! currency units.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::plan::Plan;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_type!(
    /// Unique user identifier
    UserId
);
id_type!(
    /// Unique page identifier
    PageId
);
id_type!(
    /// Unique submission identifier
    SubmissionId
);
id_type!(
    /// Unique payment identifier
    PaymentId
);

/// Free trial granted at signup
pub const TRIAL_DAYS: i64 = 14;

// ============================================================================
// User
// ============================================================================

/// Merchant account
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Lowercased email, unique across users
    pub email: String,

    pub name: String,

    /// Password hash; never serialized to clients
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub plan: Plan,

    /// Processor sub-account, set once on connection
    pub processor_account_id: Option<String>,

    pub trial_ends_at: DateTime<Utc>,

    /// Owned pages in creation order
    pub page_ids: Vec<PageId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, name: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email: normalize_email(email),
            name: name.into(),
            password_hash: password_hash.into(),
            plan: Plan::Free,
            processor_account_id: None,
            trial_ends_at: now + Duration::days(TRIAL_DAYS),
            page_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.processor_account_id.is_some()
    }

    pub fn in_trial(&self) -> bool {
        Utc::now() < self.trial_ends_at
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// Page
// ============================================================================

/// Product sold on a page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Price in minor units
    pub price_cents: i64,

    /// ISO 4217 code, lowercase
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "usd".into()
}

/// Custom form field kinds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Email,
    Phone,
    Number,
    Textarea,
    Checkbox,
}

/// Custom form field descriptor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub label: String,

    #[serde(default, rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,
}

/// Page layout variants
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    Classic,
    Split,
    Minimal,
}

/// Add-on line item offered at checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBump {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub price_cents: i64,
}

/// Checkout page definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub owner_id: UserId,

    /// Unique public slug
    pub slug: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    pub product: Product,

    #[serde(default)]
    pub fields: Vec<FormField>,

    #[serde(default)]
    pub layout: Layout,

    #[serde(default)]
    pub order_bumps: Vec<OrderBump>,

    #[serde(default)]
    pub success_url: Option<String>,

    #[serde(default)]
    pub cancel_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    /// Base price plus every order bump, in minor units.
    pub fn total_cents(&self) -> Result<i64> {
        self.order_bumps
            .iter()
            .try_fold(self.product.price_cents, |total, bump| {
                total.checked_add(bump.price_cents)
            })
            .ok_or_else(|| CoreError::Validation("Page total overflows".into()))
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner_id == user_id
    }

    /// Reject pages that could not be sold as-is
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("Title is required".into()));
        }
        if self.product.name.trim().is_empty() {
            return Err(CoreError::Validation("Product name is required".into()));
        }
        if self.product.price_cents < 0 {
            return Err(CoreError::Validation("Price cannot be negative".into()));
        }
        if self.product.currency.len() != 3
            || !self.product.currency.chars().all(|c| c.is_ascii_lowercase())
        {
            return Err(CoreError::Validation(format!(
                "Invalid currency code: {}",
                self.product.currency
            )));
        }
        if self.order_bumps.iter().any(|b| b.price_cents < 0) {
            return Err(CoreError::Validation("Order bump price cannot be negative".into()));
        }
        if self.fields.iter().any(|f| f.label.trim().is_empty()) {
            return Err(CoreError::Validation("Form field labels cannot be empty".into()));
        }
        self.total_cents().map(|_| ())
    }
}

// ============================================================================
// Submission
// ============================================================================

/// Payment state as seen from a submission
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionPaymentStatus {
    #[default]
    None,
    Pending,
    Completed,
    Failed,
}

/// One visitor's form fill on a page
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub page_id: PageId,

    /// Field label to submitted value
    pub data: HashMap<String, String>,

    pub payment_id: Option<PaymentId>,
    pub payment_status: SubmissionPaymentStatus,

    pub ip_address: Option<String>,
    pub user_agent: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(page_id: PageId, data: HashMap<String, String>) -> Self {
        Self {
            id: SubmissionId::new(),
            page_id,
            data,
            payment_id: None,
            payment_status: SubmissionPaymentStatus::None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.payment_id.is_some()
    }
}

// ============================================================================
// Payment
// ============================================================================

/// Payment lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local record of one processor checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub page_id: PageId,

    /// Processor session id, globally unique
    pub session_id: String,

    /// Processor sub-account the session was created on
    pub processor_account_id: String,

    pub amount_cents: i64,
    pub currency: String,
    pub platform_fee_cents: i64,

    pub status: PaymentStatus,

    pub submission_id: Option<SubmissionId>,
    pub payment_intent_id: Option<String>,

    pub customer_email: Option<String>,
    pub customer_name: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    pub webhook_processed: bool,
    pub webhook_processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A fresh pending payment for a newly created session
    pub fn pending(
        user_id: UserId,
        page_id: PageId,
        session_id: impl Into<String>,
        processor_account_id: impl Into<String>,
        amount_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            user_id,
            page_id,
            session_id: session_id.into(),
            processor_account_id: processor_account_id.into(),
            amount_cents,
            currency: currency.into(),
            platform_fee_cents: 0,
            status: PaymentStatus::Pending,
            submission_id: None,
            payment_intent_id: None,
            customer_email: None,
            customer_name: None,
            metadata: HashMap::new(),
            webhook_processed: false,
            webhook_processed_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Webhook audit log
// ============================================================================

/// Processing outcome of an inbound event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookOutcome {
    Received,
    Processed,
    Ignored,
    Duplicate,
    Failed,
}

impl WebhookOutcome {
    /// Settled outcomes need no further work on redelivery
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            WebhookOutcome::Processed | WebhookOutcome::Ignored | WebhookOutcome::Duplicate
        )
    }
}

/// One row per distinct inbound event id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookLog {
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub outcome: WebhookOutcome,
    pub error: Option<String>,

    /// Deliveries after the first
    pub retry_count: u32,

    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookLog {
    pub fn received(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload,
            outcome: WebhookOutcome::Received,
            error: None,
            retry_count: 0,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with(price: i64, bumps: &[i64]) -> Page {
        let now = Utc::now();
        Page {
            id: PageId::new(),
            owner_id: UserId::new(),
            slug: "test".into(),
            title: "Test".into(),
            description: None,
            product: Product {
                name: "Course".into(),
                description: None,
                price_cents: price,
                currency: "usd".into(),
            },
            fields: Vec::new(),
            layout: Layout::Classic,
            order_bumps: bumps
                .iter()
                .enumerate()
                .map(|(i, cents)| OrderBump {
                    name: format!("Bump {i}"),
                    description: None,
                    price_cents: *cents,
                })
                .collect(),
            success_url: None,
            cancel_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_total_is_price_plus_bumps() {
        assert_eq!(page_with(1000, &[]).total_cents().unwrap(), 1000);
        assert_eq!(page_with(1999, &[499, 1]).total_cents().unwrap(), 2499);
        assert_eq!(page_with(10, &[20, 30, 40]).total_cents().unwrap(), 100);
    }

    #[test]
    fn test_total_overflow_rejected() {
        assert!(page_with(i64::MAX, &[1]).total_cents().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_currency() {
        let mut page = page_with(1000, &[]);
        page.product.currency = "USD".into();
        assert!(page.validate().is_err());
        page.product.currency = "usd".into();
        assert!(page.validate().is_ok());
    }

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("  Merchant@Example.COM ", "Merchant", "hash");
        assert_eq!(user.email, "merchant@example.com");
        assert_eq!(user.plan, Plan::Free);
        assert!(user.in_trial());
        assert!(!user.is_connected());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("a@b.co", "A", "secret-hash");
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
