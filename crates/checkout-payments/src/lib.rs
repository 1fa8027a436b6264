//! # checkout-payments
//!
//! Connected-account checkout sessions and webhook reconciliation.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  session   ┌─────────────────┐  redirect  ┌─────────────┐
//! │ Public page │──────────▶│ Processor hosted │──────────▶│ Public page │
//! │  (submit)   │           │  checkout page   │           │  (success)  │
//! └─────────────┘           └────────┬────────┘           └─────────────┘
//!                                    │ checkout.session.completed
//!                                    ▼
//!                           ┌─────────────────┐
//!                           │ WebhookHandler  │ verify → log → reconcile
//!                           └─────────────────┘
//! ```
//!
//! Funds settle on the merchant's connected sub-account; the platform keeps
//! an application fee of [`PLATFORM_FEE_BPS`] basis points.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_payments::{CheckoutRequest, CheckoutService, SimulatedProcessor};
//!
//! let service = CheckoutService::new(store, Arc::new(SimulatedProcessor::default()));
//! let session = service.create_session(&page_id, CheckoutRequest::default()).await?;
//!
//! // Redirect the buyer to: session.checkout_url
//! ```

mod checkout;
mod error;
mod event;
mod processor;
mod signature;
mod webhook;

pub use checkout::{
    CheckoutRequest, CheckoutService, CheckoutSession, ConnectLink, DEFAULT_PROCESSOR_TIMEOUT,
    PLATFORM_FEE_BPS, line_items, metadata_keys, platform_fee,
};
pub use error::{PaymentError, Result};
pub use event::{CompletedSession, EventEnvelope, ProcessorEvent};
pub use processor::{
    HostedSession, LineItem, ProcessorClient, ProcessorMode, SIMULATED_ACCOUNT_PREFIX,
    SIMULATED_SESSION_PREFIX, SessionRequest, SimulatedProcessor, StripeProcessor,
};
pub use signature::{DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER, WebhookVerifier};
pub use webhook::{Disposition, LINK_WINDOW_MINUTES, WebhookHandler, WebhookReport};
