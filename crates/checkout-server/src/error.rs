//! API Errors
//!
//! Every failure leaves the server as
//! `{ "status": "fail" | "error", "message", "code", "details"? }`.
//! `fail` marks a client error (4xx), `error` a server or upstream error.
//! Server errors carry only a generic message; [`expose_internal_errors`]
//! adds the underlying error text outside production.

use axum::{
    Json,
    body::Body,
    extract::{Request, rejection::JsonRejection},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use checkout_core::CoreError;
use checkout_payments::PaymentError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

struct Mapped {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

impl Mapped {
    fn new(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            code,
            message,
            details: None,
        }
    }
}

fn map_core(e: &CoreError) -> Mapped {
    let message = e.user_message();
    match e {
        CoreError::NotFound { .. } => Mapped::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
        CoreError::Forbidden(_) => Mapped::new(StatusCode::FORBIDDEN, "FORBIDDEN", message),
        CoreError::Conflict(_) => Mapped::new(StatusCode::CONFLICT, "CONFLICT", message),
        CoreError::Validation(_) => {
            Mapped::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
        }
        CoreError::QuotaExceeded {
            plan,
            current,
            limit,
        } => Mapped {
            details: Some(json!({
                "plan": plan,
                "current": current,
                "limit": limit.as_option(),
            })),
            ..Mapped::new(StatusCode::FORBIDDEN, "QUOTA_EXCEEDED", message)
        },
        CoreError::Storage(_) => {
            Mapped::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
        }
    }
}

impl ApiError {
    fn mapped(&self) -> Mapped {
        match self {
            ApiError::Validation(msg) => {
                Mapped::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ApiError::Unauthorized(msg) => {
                Mapped::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            ApiError::Core(e) => map_core(e),
            ApiError::Payment(e) => {
                let message = e.user_message();
                match e {
                    PaymentError::NotConnected(_) => {
                        Mapped::new(StatusCode::BAD_REQUEST, "NOT_CONNECTED", message)
                    }
                    PaymentError::Processor(_) => {
                        Mapped::new(StatusCode::BAD_GATEWAY, "PROCESSOR_ERROR", message)
                    }
                    PaymentError::Timeout(_) => {
                        Mapped::new(StatusCode::GATEWAY_TIMEOUT, "PROCESSOR_TIMEOUT", message)
                    }
                    PaymentError::WebhookSignature(_) => {
                        Mapped::new(StatusCode::BAD_REQUEST, "INVALID_SIGNATURE", message)
                    }
                    PaymentError::WebhookParse(_) => {
                        Mapped::new(StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", message)
                    }
                    PaymentError::WebhookApply { .. } => {
                        Mapped::new(StatusCode::INTERNAL_SERVER_ERROR, "WEBHOOK_FAILED", message)
                    }
                    PaymentError::Config(_) => {
                        Mapped::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
                    }
                    PaymentError::Core(core) => map_core(core),
                }
            }
            ApiError::Internal(_) => Mapped::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An unexpected error occurred.".into(),
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.mapped().status
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// Error text behind a 5xx response, kept out of the body
#[derive(Clone, Debug)]
struct InternalDetail(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mapped = self.mapped();
        let server_error = mapped.status.is_server_error();

        if server_error {
            tracing::error!(status = %mapped.status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %mapped.status, error = %self, "Request rejected");
        }

        let body = ErrorBody {
            status: if server_error { "error" } else { "fail" },
            message: mapped.message,
            code: mapped.code,
            details: mapped.details,
        };
        let mut response = (mapped.status, Json(body)).into_response();
        if server_error {
            response
                .extensions_mut()
                .insert(InternalDetail(self.to_string()));
        }
        response
    }
}

/// Middleware that copies the internal error text of a 5xx response into
/// `details.error`. Only mounted outside production.
pub async fn expose_internal_errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>().cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read error body");
            return Response::from_parts(parts, Body::empty());
        }
    };
    let mut value = match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => value,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };
    if let Some(object) = value.as_object_mut() {
        object.insert("details".into(), json!({ "error": detail }));
    }

    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(value.to_string()))
}
