//! In-memory store (for development and tests)

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{PageStore, PaymentStore, SubmissionStore, UserStore, WebhookLogStore};
use crate::error::{CoreError, Result};
use crate::model::{
    Page, PageId, Payment, PaymentId, Submission, SubmissionId, User, UserId, WebhookLog,
    WebhookOutcome,
};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    pages: HashMap<PageId, Page>,
    submissions: HashMap<SubmissionId, Submission>,
    payments: HashMap<PaymentId, Payment>,
    webhook_logs: HashMap<String, WebhookLog>,

    users_by_email: HashMap<String, UserId>,
    pages_by_slug: HashMap<String, PageId>,
    payments_by_session: HashMap<String, PaymentId>,
}

/// Process-local store guarded by a single lock
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.users_by_email.contains_key(&user.email) {
            return Err(CoreError::Conflict(format!(
                "Email already registered: {}",
                user.email
            )));
        }
        t.users_by_email.insert(user.email.clone(), user.id.clone());
        t.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let t = self.tables.read().await;
        let email = crate::model::normalize_email(email);
        Ok(t.users_by_email
            .get(&email)
            .and_then(|id| t.users.get(id))
            .cloned())
    }

    async fn find_user_by_processor_account(&self, account_id: &str) -> Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users
            .values()
            .find(|u| u.processor_account_id.as_deref() == Some(account_id))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&user.id) {
            return Err(CoreError::not_found("user", user.id.as_str()));
        }
        t.users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn insert_page(&self, page: &Page) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.pages_by_slug.contains_key(&page.slug) {
            return Err(CoreError::Conflict(format!(
                "Slug already in use: {}",
                page.slug
            )));
        }
        t.pages_by_slug.insert(page.slug.clone(), page.id.clone());
        t.pages.insert(page.id.clone(), page.clone());
        Ok(())
    }

    async fn get_page(&self, id: &PageId) -> Result<Option<Page>> {
        Ok(self.tables.read().await.pages.get(id).cloned())
    }

    async fn get_page_by_slug(&self, slug: &str) -> Result<Option<Page>> {
        let t = self.tables.read().await;
        Ok(t.pages_by_slug
            .get(slug)
            .and_then(|id| t.pages.get(id))
            .cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        Ok(self.tables.read().await.pages_by_slug.contains_key(slug))
    }

    async fn list_pages_by_owner(&self, owner: &UserId) -> Result<Vec<Page>> {
        let t = self.tables.read().await;
        let mut pages: Vec<Page> = t
            .pages
            .values()
            .filter(|p| &p.owner_id == owner)
            .cloned()
            .collect();
        pages.sort_by_key(|p| p.created_at);
        Ok(pages)
    }

    async fn count_pages_by_owner(&self, owner: &UserId) -> Result<usize> {
        let t = self.tables.read().await;
        Ok(t.pages.values().filter(|p| &p.owner_id == owner).count())
    }

    async fn update_page(&self, page: &Page) -> Result<()> {
        let mut t = self.tables.write().await;
        let old_slug = match t.pages.get(&page.id) {
            Some(existing) => existing.slug.clone(),
            None => return Err(CoreError::not_found("page", page.id.as_str())),
        };

        if old_slug != page.slug {
            if t.pages_by_slug.contains_key(&page.slug) {
                return Err(CoreError::Conflict(format!(
                    "Slug already in use: {}",
                    page.slug
                )));
            }
            t.pages_by_slug.remove(&old_slug);
            t.pages_by_slug.insert(page.slug.clone(), page.id.clone());
        }

        t.pages.insert(page.id.clone(), page.clone());
        Ok(())
    }

    async fn delete_page(&self, id: &PageId) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(page) = t.pages.remove(id) {
            t.pages_by_slug.remove(&page.slug);
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        let mut t = self.tables.write().await;
        t.submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>> {
        Ok(self.tables.read().await.submissions.get(id).cloned())
    }

    async fn list_submissions_by_page(&self, page: &PageId) -> Result<Vec<Submission>> {
        let t = self.tables.read().await;
        let mut submissions: Vec<Submission> = t
            .submissions
            .values()
            .filter(|s| &s.page_id == page)
            .cloned()
            .collect();
        submissions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(submissions)
    }

    async fn find_unlinked_submission(
        &self,
        page: &PageId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<Submission>> {
        let t = self.tables.read().await;
        Ok(t.submissions
            .values()
            .filter(|s| {
                &s.page_id == page
                    && !s.is_linked()
                    && s.created_at >= from
                    && s.created_at <= until
            })
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn update_submission(&self, submission: &Submission) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.submissions.contains_key(&submission.id) {
            return Err(CoreError::not_found("submission", submission.id.as_str()));
        }
        t.submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.payments_by_session.contains_key(&payment.session_id) {
            return Err(CoreError::Conflict(format!(
                "Payment already exists for session: {}",
                payment.session_id
            )));
        }
        t.payments_by_session
            .insert(payment.session_id.clone(), payment.id.clone());
        t.payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn get_payment_by_session(&self, session_id: &str) -> Result<Option<Payment>> {
        let t = self.tables.read().await;
        Ok(t.payments_by_session
            .get(session_id)
            .and_then(|id| t.payments.get(id))
            .cloned())
    }

    async fn get_payment_by_intent(&self, payment_intent_id: &str) -> Result<Option<Payment>> {
        let t = self.tables.read().await;
        Ok(t.payments
            .values()
            .find(|p| p.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn list_payments_by_page(&self, page: &PageId) -> Result<Vec<Payment>> {
        let t = self.tables.read().await;
        let mut payments: Vec<Payment> = t
            .payments
            .values()
            .filter(|p| &p.page_id == page)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let mut t = self.tables.write().await;
        match t.payments.get(&payment.id) {
            Some(existing) if existing.session_id != payment.session_id => {
                return Err(CoreError::Conflict(
                    "Payment session id is immutable".into(),
                ));
            }
            Some(_) => {}
            None => return Err(CoreError::not_found("payment", payment.id.as_str())),
        }
        t.payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }
}

#[async_trait]
impl WebhookLogStore for MemoryStore {
    async fn record_delivery(&self, log: WebhookLog) -> Result<WebhookLog> {
        let mut t = self.tables.write().await;
        let stored = t
            .webhook_logs
            .entry(log.event_id.clone())
            .and_modify(|existing| existing.retry_count += 1)
            .or_insert(log);
        Ok(stored.clone())
    }

    async fn get_webhook_log(&self, event_id: &str) -> Result<Option<WebhookLog>> {
        Ok(self.tables.read().await.webhook_logs.get(event_id).cloned())
    }

    async fn set_webhook_outcome(
        &self,
        event_id: &str,
        outcome: WebhookOutcome,
        error: Option<String>,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        let log = t
            .webhook_logs
            .get_mut(event_id)
            .ok_or_else(|| CoreError::not_found("webhook log", event_id))?;
        log.outcome = outcome;
        log.error = error;
        log.processed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store.insert_user(&User::new("a@example.com", "A", "h")).await.unwrap();
        let err = store
            .insert_user(&User::new("A@Example.com", "A2", "h"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_session_id_is_unique() {
        let store = MemoryStore::new();
        let payment = Payment::pending(UserId::new(), PageId::new(), "cs_1", "acct_1", 1000, "usd");
        store.insert_payment(&payment).await.unwrap();

        let again = Payment::pending(UserId::new(), PageId::new(), "cs_1", "acct_1", 1000, "usd");
        assert!(matches!(
            store.insert_payment(&again).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_record_delivery_counts_retries() {
        let store = MemoryStore::new();
        let first = store
            .record_delivery(WebhookLog::received("evt_1", "x", serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(first.retry_count, 0);

        let second = store
            .record_delivery(WebhookLog::received("evt_1", "x", serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(second.retry_count, 1);
        assert_eq!(second.outcome, WebhookOutcome::Received);
    }

    #[tokio::test]
    async fn test_find_unlinked_submission_window() {
        let store = MemoryStore::new();
        let page = PageId::new();
        let now = Utc::now();

        let mut old = Submission::new(page.clone(), HashMap::new());
        old.created_at = now - Duration::minutes(45);
        let mut recent = Submission::new(page.clone(), HashMap::new());
        recent.created_at = now - Duration::minutes(5);
        let mut linked = Submission::new(page.clone(), HashMap::new());
        linked.created_at = now - Duration::minutes(1);
        linked.payment_id = Some(PaymentId::new());

        for s in [&old, &recent, &linked] {
            store.insert_submission(s).await.unwrap();
        }

        let found = store
            .find_unlinked_submission(&page, now - Duration::minutes(30), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, recent.id);
    }

    #[tokio::test]
    async fn test_slug_index_follows_update() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut page = Page {
            id: PageId::new(),
            owner_id: UserId::new(),
            slug: "first".into(),
            title: "First".into(),
            description: None,
            product: crate::model::Product {
                name: "P".into(),
                description: None,
                price_cents: 100,
                currency: "usd".into(),
            },
            fields: Vec::new(),
            layout: crate::model::Layout::Classic,
            order_bumps: Vec::new(),
            success_url: None,
            cancel_url: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_page(&page).await.unwrap();

        page.slug = "second".into();
        store.update_page(&page).await.unwrap();

        assert!(!store.slug_exists("first").await.unwrap());
        assert!(store.slug_exists("second").await.unwrap());
    }
}
