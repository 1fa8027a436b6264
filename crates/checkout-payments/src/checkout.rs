//! Checkout Sessions
//!
//! Builds a hosted checkout session on the page owner's connected account
//! and records the pending payment once the processor has accepted it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use checkout_core::{CoreError, Page, PageId, Payment, PaymentId, Store, SubmissionId, User, UserId};

use crate::error::{PaymentError, Result};
use crate::processor::{HostedSession, LineItem, ProcessorClient, ProcessorMode, SessionRequest};

/// Platform fee in basis points of the session total
pub const PLATFORM_FEE_BPS: i64 = 500;

/// Default deadline for a single processor call
pub const DEFAULT_PROCESSOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Session metadata keys echoed back in webhook events
pub mod metadata_keys {
    pub const PAGE_ID: &str = "pageId";
    pub const USER_ID: &str = "userId";
    pub const TOTAL_AMOUNT: &str = "totalAmount";
    pub const SUBMISSION_ID: &str = "submissionId";
}

/// Platform fee for `total_cents`, rounded half up.
pub fn platform_fee(total_cents: i64) -> i64 {
    let fee = (i128::from(total_cents) * i128::from(PLATFORM_FEE_BPS) + 5_000) / 10_000;
    i64::try_from(fee).unwrap_or(i64::MAX)
}

/// One line for the product plus one per order bump
pub fn line_items(page: &Page) -> Vec<LineItem> {
    std::iter::once(LineItem {
        name: page.product.name.clone(),
        description: page.product.description.clone(),
        amount_cents: page.product.price_cents,
        quantity: 1,
    })
    .chain(page.order_bumps.iter().map(|bump| LineItem {
        name: bump.name.clone(),
        description: bump.description.clone(),
        amount_cents: bump.price_cents,
        quantity: 1,
    }))
    .collect()
}

/// Buyer-side options for a new session
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Prefills the hosted page
    #[serde(default)]
    pub customer_email: Option<String>,

    /// Submission made just before checkout; matched exactly on completion
    #[serde(default)]
    pub submission_id: Option<SubmissionId>,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub checkout_url: String,
    pub payment_id: PaymentId,
    pub amount_cents: i64,
    pub platform_fee_cents: i64,
    pub currency: String,
    pub simulated: bool,
}

/// Processor onboarding for a merchant
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectLink {
    pub account_id: String,
    pub url: String,
}

/// Payment-session service
pub struct CheckoutService {
    store: Arc<dyn Store>,
    processor: Arc<dyn ProcessorClient>,
    public_base_url: String,
    timeout: Duration,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, processor: Arc<dyn ProcessorClient>) -> Self {
        Self {
            store,
            processor,
            public_base_url: "http://localhost:3000".into(),
            timeout: DEFAULT_PROCESSOR_TIMEOUT,
        }
    }

    /// Base URL used for default redirect targets
    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn processor_mode(&self) -> ProcessorMode {
        self.processor.mode()
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| PaymentError::Timeout(self.timeout))?
    }

    async fn load_user(&self, id: &UserId) -> Result<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id.as_str()).into())
    }

    /// Create a hosted session for `page_id` and persist a pending payment.
    ///
    /// The payment row is written only after the processor call succeeds, so
    /// a timeout or upstream failure leaves nothing behind.
    pub async fn create_session(
        &self,
        page_id: &PageId,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession> {
        let page = self
            .store
            .get_page(page_id)
            .await?
            .ok_or_else(|| CoreError::not_found("page", page_id.as_str()))?;

        let owner = self.load_user(&page.owner_id).await?;
        let account_id = owner.processor_account_id.clone().ok_or_else(|| {
            PaymentError::NotConnected(format!("User {} has no connected account", owner.id))
        })?;

        if let Some(submission_id) = &request.submission_id {
            let submission = self
                .store
                .get_submission(submission_id)
                .await?
                .ok_or_else(|| CoreError::not_found("submission", submission_id.as_str()))?;
            if submission.page_id != page.id {
                return Err(CoreError::Validation(
                    "Submission belongs to a different page".into(),
                )
                .into());
            }
        }

        let total = page.total_cents()?;
        let fee = platform_fee(total);

        let mut metadata = HashMap::from([
            (metadata_keys::PAGE_ID.to_string(), page.id.to_string()),
            (metadata_keys::USER_ID.to_string(), owner.id.to_string()),
            (metadata_keys::TOTAL_AMOUNT.to_string(), total.to_string()),
        ]);
        if let Some(submission_id) = &request.submission_id {
            metadata.insert(
                metadata_keys::SUBMISSION_ID.to_string(),
                submission_id.to_string(),
            );
        }

        let session_request = SessionRequest {
            account_id: account_id.clone(),
            currency: page.product.currency.clone(),
            line_items: line_items(&page),
            application_fee_cents: fee,
            success_url: page.success_url.clone().unwrap_or_else(|| {
                format!(
                    "{}/p/{}?checkout=success&session_id={{CHECKOUT_SESSION_ID}}",
                    self.public_base_url, page.slug
                )
            }),
            cancel_url: page.cancel_url.clone().unwrap_or_else(|| {
                format!("{}/p/{}?checkout=cancelled", self.public_base_url, page.slug)
            }),
            customer_email: request.customer_email.clone(),
            client_reference_id: request.submission_id.as_ref().map(ToString::to_string),
            metadata: metadata.clone(),
        };

        let session: HostedSession = self
            .bounded(self.processor.create_checkout_session(&session_request))
            .await
            .inspect_err(|e| {
                tracing::error!(page_id = %page.id, error = %e, "Checkout session creation failed");
            })?;

        let mut payment = Payment::pending(
            owner.id.clone(),
            page.id.clone(),
            session.id.clone(),
            account_id,
            total,
            page.product.currency.clone(),
        );
        payment.platform_fee_cents = fee;
        payment.customer_email = request.customer_email;
        payment.metadata = metadata;
        self.store.insert_payment(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            session_id = %session.id,
            page_id = %page.id,
            amount = total,
            fee,
            processor = self.processor.name(),
            "Created checkout session"
        );

        Ok(CheckoutSession {
            session_id: session.id,
            checkout_url: session.url,
            payment_id: payment.id,
            amount_cents: total,
            platform_fee_cents: fee,
            currency: payment.currency,
            simulated: self.processor.mode() == ProcessorMode::Simulated,
        })
    }

    /// Ensure `user_id` has a connected sub-account and return an onboarding link.
    ///
    /// The account id is stored once; later calls only mint a fresh link.
    pub async fn connect(&self, user_id: &UserId) -> Result<ConnectLink> {
        let mut user = self.load_user(user_id).await?;

        let account_id = match user.processor_account_id.clone() {
            Some(id) => id,
            None => {
                let id = self
                    .bounded(self.processor.create_account(&user.email))
                    .await?;
                user.processor_account_id = Some(id.clone());
                user.updated_at = chrono::Utc::now();
                self.store.update_user(&user).await?;
                tracing::info!(user_id = %user.id, account = %id, "Connected processor account");
                id
            }
        };

        let refresh_url = format!("{}/stripe/connect/refresh", self.public_base_url);
        let return_url = format!("{}/dashboard?connected=1", self.public_base_url);
        let url = self
            .bounded(
                self.processor
                    .onboarding_link(&account_id, &refresh_url, &return_url),
            )
            .await?;

        Ok(ConnectLink { account_id, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::{
        Layout, MemoryStore, OrderBump, PaymentStatus, PaymentStore, Plan, Product, UserStore,
    };
    use checkout_core::pages::{PageDraft, create_page};

    use crate::processor::{SIMULATED_SESSION_PREFIX, SimulatedProcessor};

    async fn setup(
        processor: Arc<SimulatedProcessor>,
        connected: bool,
        bumps: Vec<OrderBump>,
    ) -> (Arc<MemoryStore>, CheckoutService, Page) {
        let store = Arc::new(MemoryStore::new());
        let mut user = User::new("m@example.com", "M", "h");
        user.plan = Plan::Pro;
        if connected {
            user.processor_account_id = Some("sim_acct_test".into());
        }
        store.insert_user(&user).await.unwrap();

        let draft = PageDraft {
            slug: None,
            title: "Course".into(),
            description: None,
            product: Product {
                name: "Course".into(),
                description: None,
                price_cents: 1000,
                currency: "usd".into(),
            },
            fields: Vec::new(),
            layout: Layout::Classic,
            order_bumps: bumps,
            success_url: None,
            cancel_url: None,
        };
        let page = create_page(store.as_ref(), &user.id, draft).await.unwrap();
        let service = CheckoutService::new(store.clone(), processor)
            .with_public_base_url("https://pages.test/");
        (store, service, page)
    }

    #[test]
    fn test_platform_fee_rounding() {
        assert_eq!(platform_fee(1000), 50);
        assert_eq!(platform_fee(0), 0);
        assert_eq!(platform_fee(10), 1); // 0.5 rounds up
        assert_eq!(platform_fee(9), 0); // 0.45 rounds down
        assert_eq!(platform_fee(1999), 100); // 99.95
    }

    #[tokio::test]
    async fn test_pending_payment_recorded() {
        let processor = Arc::new(SimulatedProcessor::default());
        let (store, service, page) = setup(processor.clone(), true, Vec::new()).await;

        let session = service
            .create_session(&page.id, CheckoutRequest::default())
            .await
            .unwrap();

        assert!(session.session_id.starts_with(SIMULATED_SESSION_PREFIX));
        assert!(session.simulated);
        assert_eq!(session.amount_cents, 1000);

        let payment = store
            .get_payment_by_session(&session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount_cents, 1000);
        assert_eq!(payment.platform_fee_cents, 50);
        assert!(!payment.webhook_processed);
        assert_eq!(payment.metadata[metadata_keys::TOTAL_AMOUNT], "1000");
        assert_eq!(payment.metadata[metadata_keys::PAGE_ID], page.id.to_string());

        let sent = processor.sessions().await;
        assert_eq!(sent[0].account_id, "sim_acct_test");
        assert_eq!(
            sent[0].cancel_url,
            format!("https://pages.test/p/{}?checkout=cancelled", page.slug)
        );
    }

    #[tokio::test]
    async fn test_total_includes_order_bumps() {
        let bumps = vec![
            OrderBump {
                name: "Workbook".into(),
                description: None,
                price_cents: 499,
            },
            OrderBump {
                name: "Coaching".into(),
                description: None,
                price_cents: 2501,
            },
        ];
        let processor = Arc::new(SimulatedProcessor::default());
        let (_, service, page) = setup(processor.clone(), true, bumps).await;

        let session = service
            .create_session(&page.id, CheckoutRequest::default())
            .await
            .unwrap();
        assert_eq!(session.amount_cents, 1000 + 499 + 2501);
        assert_eq!(session.platform_fee_cents, 200);

        let sent = processor.sessions().await;
        assert_eq!(sent[0].line_items.len(), 3);
        let line_total: i64 = sent[0].line_items.iter().map(|l| l.amount_cents).sum();
        assert_eq!(line_total, session.amount_cents);
    }

    #[tokio::test]
    async fn test_unconnected_owner_rejected() {
        let processor = Arc::new(SimulatedProcessor::default());
        let (_, service, page) = setup(processor, false, Vec::new()).await;

        let err = service
            .create_session(&page.id, CheckoutRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_timeout_leaves_no_payment() {
        let processor =
            Arc::new(SimulatedProcessor::default().with_latency(Duration::from_millis(200)));
        let (store, service, page) = setup(processor, true, Vec::new()).await;
        let service = service.with_timeout(Duration::from_millis(20));

        let err = service
            .create_session(&page.id, CheckoutRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Timeout(_)));
        assert!(store.list_payments_by_page(&page.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_stores_account_once() {
        let processor = Arc::new(SimulatedProcessor::default());
        let (store, service, page) = setup(processor, false, Vec::new()).await;

        let first = service.connect(&page.owner_id).await.unwrap();
        let second = service.connect(&page.owner_id).await.unwrap();
        assert_eq!(first.account_id, second.account_id);

        let user = store.get_user(&page.owner_id).await.unwrap().unwrap();
        assert_eq!(user.processor_account_id, Some(first.account_id));
    }
}
