//! Storage
//!
//! One trait per record kind, combined into [`Store`]. Implementations must
//! make each call atomic on its own; no multi-call transactions are assumed.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    Page, PageId, Payment, Submission, SubmissionId, User, UserId, WebhookLog, WebhookOutcome,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; `Conflict` when the email is taken
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, id: &UserId) -> Result<Option<User>>;

    /// Lookup by (normalized) email
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Lookup by connected processor sub-account
    async fn find_user_by_processor_account(&self, account_id: &str) -> Result<Option<User>>;

    async fn update_user(&self, user: &User) -> Result<()>;
}

#[async_trait]
pub trait PageStore: Send + Sync {
    /// Insert a new page; `Conflict` when the slug is taken
    async fn insert_page(&self, page: &Page) -> Result<()>;

    async fn get_page(&self, id: &PageId) -> Result<Option<Page>>;

    async fn get_page_by_slug(&self, slug: &str) -> Result<Option<Page>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    async fn list_pages_by_owner(&self, owner: &UserId) -> Result<Vec<Page>>;

    async fn count_pages_by_owner(&self, owner: &UserId) -> Result<usize>;

    /// Replace a page; `Conflict` when its slug belongs to another page
    async fn update_page(&self, page: &Page) -> Result<()>;

    async fn delete_page(&self, id: &PageId) -> Result<()>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert_submission(&self, submission: &Submission) -> Result<()>;

    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>>;

    /// Newest first
    async fn list_submissions_by_page(&self, page: &PageId) -> Result<Vec<Submission>>;

    /// Most recent unlinked submission on `page` created in `[from, until]`
    async fn find_unlinked_submission(
        &self,
        page: &PageId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<Submission>>;

    async fn update_submission(&self, submission: &Submission) -> Result<()>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new payment; `Conflict` when the session id already exists
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    async fn get_payment_by_session(&self, session_id: &str) -> Result<Option<Payment>>;

    async fn get_payment_by_intent(&self, payment_intent_id: &str) -> Result<Option<Payment>>;

    /// Newest first
    async fn list_payments_by_page(&self, page: &PageId) -> Result<Vec<Payment>>;

    async fn update_payment(&self, payment: &Payment) -> Result<()>;
}

#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    /// Insert the first delivery of an event, or bump the retry count of a
    /// known one. Returns the stored row.
    async fn record_delivery(&self, log: WebhookLog) -> Result<WebhookLog>;

    async fn get_webhook_log(&self, event_id: &str) -> Result<Option<WebhookLog>>;

    async fn set_webhook_outcome(
        &self,
        event_id: &str,
        outcome: WebhookOutcome,
        error: Option<String>,
    ) -> Result<()>;
}

/// Everything the service needs from persistence
pub trait Store: UserStore + PageStore + SubmissionStore + PaymentStore + WebhookLogStore {}

impl<T> Store for T where T: UserStore + PageStore + SubmissionStore + PaymentStore + WebhookLogStore
{}
