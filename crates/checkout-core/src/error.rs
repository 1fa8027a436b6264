//! Error Types

use thiserror::Error;

use crate::plan::{Plan, PlanLimit};

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core domain errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Caller does not own the record
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness violation (slug, email, session id)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// Plan quota reached
    #[error("Quota exceeded: {plan} plan allows {limit}, currently {current}")]
    QuotaExceeded {
        plan: Plan,
        current: usize,
        limit: PlanLimit,
    },

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CoreError::NotFound { entity, .. } => format!("The requested {entity} was not found."),
            CoreError::Forbidden(_) => "You do not have access to this resource.".into(),
            CoreError::Conflict(msg) | CoreError::Validation(msg) => msg.clone(),
            CoreError::QuotaExceeded { plan, limit, .. } => format!(
                "Your {} plan allows {} pages. Upgrade to create more.",
                plan.display_name(),
                limit
            ),
            CoreError::Storage(_) => "An unexpected error occurred.".into(),
        }
    }
}
