//! Simulated Processor
//!
//! For local development without processor credentials. Session and account
//! ids carry reserved prefixes so they can never be mistaken for real ones.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{HostedSession, ProcessorClient, ProcessorMode, SessionRequest};
use crate::error::{PaymentError, Result};

pub const SIMULATED_SESSION_PREFIX: &str = "sim_cs_";
pub const SIMULATED_ACCOUNT_PREFIX: &str = "sim_acct_";

/// In-process stand-in for the processor API
pub struct SimulatedProcessor {
    base_url: String,
    latency: Duration,
    sessions: Mutex<Vec<SessionRequest>>,
}

impl Default for SimulatedProcessor {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

impl SimulatedProcessor {
    /// `base_url` hosts the simulated checkout links
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            latency: Duration::ZERO,
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Delay every call (for exercising timeouts)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Requests received so far, oldest first
    pub async fn sessions(&self) -> Vec<SessionRequest> {
        self.sessions.lock().await.clone()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn simulated_id(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

#[async_trait]
impl ProcessorClient for SimulatedProcessor {
    async fn create_checkout_session(&self, request: &SessionRequest) -> Result<HostedSession> {
        self.simulate_latency().await;

        if request.line_items.is_empty() {
            return Err(PaymentError::Processor("Session has no line items".into()));
        }

        let id = simulated_id(SIMULATED_SESSION_PREFIX);
        let url = format!("{}/simulated-checkout/{id}", self.base_url);
        self.sessions.lock().await.push(request.clone());

        tracing::debug!(session_id = %id, account = %request.account_id, "Simulated checkout session");
        Ok(HostedSession { id, url })
    }

    async fn create_account(&self, email: &str) -> Result<String> {
        self.simulate_latency().await;
        let id = simulated_id(SIMULATED_ACCOUNT_PREFIX);
        tracing::debug!(account = %id, email = %email, "Simulated connected account");
        Ok(id)
    }

    async fn onboarding_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        return_url: &str,
    ) -> Result<String> {
        self.simulate_latency().await;
        let separator = if return_url.contains('?') { '&' } else { '?' };
        Ok(format!("{return_url}{separator}simulated_account={account_id}"))
    }

    fn mode(&self) -> ProcessorMode {
        ProcessorMode::Simulated
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::LineItem;
    use std::collections::HashMap;

    fn request() -> SessionRequest {
        SessionRequest {
            account_id: "sim_acct_1".into(),
            currency: "usd".into(),
            line_items: vec![LineItem {
                name: "Course".into(),
                description: None,
                amount_cents: 1000,
                quantity: 1,
            }],
            application_fee_cents: 50,
            success_url: "https://shop.test/ok".into(),
            cancel_url: "https://shop.test/cancel".into(),
            customer_email: None,
            client_reference_id: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_simulated_session_prefix() {
        let processor = SimulatedProcessor::new("http://localhost:3000/");
        let session = processor.create_checkout_session(&request()).await.unwrap();

        assert!(session.id.starts_with(SIMULATED_SESSION_PREFIX));
        assert_eq!(
            session.url,
            format!("http://localhost:3000/simulated-checkout/{}", session.id)
        );
        assert_eq!(processor.sessions().await.len(), 1);
        assert_eq!(processor.mode(), ProcessorMode::Simulated);
    }

    #[tokio::test]
    async fn test_simulated_sessions_are_distinct() {
        let processor = SimulatedProcessor::default();
        let a = processor.create_checkout_session(&request()).await.unwrap();
        let b = processor.create_checkout_session(&request()).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_simulated_account_and_link() {
        let processor = SimulatedProcessor::default();
        let account = processor.create_account("m@example.com").await.unwrap();
        assert!(account.starts_with(SIMULATED_ACCOUNT_PREFIX));

        let link = processor
            .onboarding_link(&account, "https://app.test/r", "https://app.test/done?x=1")
            .await
            .unwrap();
        assert_eq!(link, format!("https://app.test/done?x=1&simulated_account={account}"));
    }
}
