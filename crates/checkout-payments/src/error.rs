//! Payment Error Types

use checkout_core::CoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Page owner has no processor sub-account
    #[error("Merchant not connected: {0}")]
    NotConnected(String),

    /// Processor API error
    #[error("Processor error: {0}")]
    Processor(String),

    /// Processor call exceeded its deadline
    #[error("Processor timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// A verified event could not be applied; the sender should redeliver
    #[error("Webhook {event_id} not applied: {reason}")]
    WebhookApply { event_id: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain or storage error
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Processor(_)
            | PaymentError::Timeout(_)
            | PaymentError::WebhookApply { .. } => true,
            PaymentError::Core(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::NotConnected(_) => {
                "This merchant is not accepting payments yet.".into()
            }
            PaymentError::Processor(_) | PaymentError::Timeout(_) => {
                "Payment processing failed. Please try again.".into()
            }
            PaymentError::WebhookSignature(_) => "Invalid signature.".into(),
            PaymentError::WebhookParse(_) => "Malformed event.".into(),
            PaymentError::WebhookApply { .. } => "Webhook processing failed.".into(),
            PaymentError::Config(_) => "Service configuration error.".into(),
            PaymentError::Core(e) => e.user_message(),
        }
    }
}
