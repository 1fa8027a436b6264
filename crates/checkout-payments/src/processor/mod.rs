//! Payment Processor Integration
//!
//! The processor is a capability chosen once at startup: either the live
//! Stripe client or the simulated client used for local development. Both
//! implement [`ProcessorClient`], so nothing downstream inspects credentials
//! to decide which behaviour applies.

mod simulated;
mod live;

pub use self::simulated::{SIMULATED_ACCOUNT_PREFIX, SIMULATED_SESSION_PREFIX, SimulatedProcessor};
pub use self::live::StripeProcessor;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One line on the hosted checkout page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub quantity: u64,
}

/// Everything the processor needs to open a hosted checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Connected sub-account that receives the funds
    pub account_id: String,
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub application_fee_cents: i64,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub client_reference_id: Option<String>,

    /// Opaque correlation data echoed back in webhook events
    pub metadata: HashMap<String, String>,
}

/// A session created by the processor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

/// Which processor implementation is active
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorMode {
    Live,
    Simulated,
}

/// Processor client trait (Strategy pattern)
#[async_trait]
pub trait ProcessorClient: Send + Sync {
    /// Create a hosted checkout session on the connected account
    async fn create_checkout_session(&self, request: &SessionRequest) -> Result<HostedSession>;

    /// Create a connected sub-account, returning its id
    async fn create_account(&self, email: &str) -> Result<String>;

    /// Onboarding URL for a connected sub-account
    async fn onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String>;

    fn mode(&self) -> ProcessorMode;

    /// Processor name
    fn name(&self) -> &str;
}
