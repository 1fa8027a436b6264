//! Processor Events
//!
//! Inbound webhook bodies are parsed into a closed set of variants. Event
//! types the service does not act on land in [`ProcessorEvent::Unhandled`].

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{PaymentError, Result};

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessorEvent {
    /// Hosted checkout finished
    CheckoutSessionCompleted(CompletedSession),

    /// Session expired before payment
    CheckoutSessionExpired { session_id: String },

    /// Delayed payment method failed after completion
    CheckoutSessionAsyncPaymentFailed { session_id: String },

    PaymentIntentSucceeded { payment_intent_id: String },

    PaymentIntentFailed {
        payment_intent_id: String,
        failure_message: Option<String>,
    },

    ChargeRefunded {
        charge_id: String,
        payment_intent_id: Option<String>,
    },

    /// Connected account changed (capabilities, onboarding)
    AccountUpdated {
        account_id: String,
        charges_enabled: bool,
    },

    /// Unhandled event type
    Unhandled { event_type: String },
}

/// Completed checkout session details
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletedSession {
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Verified event with its envelope fields
#[derive(Clone, Debug)]
pub struct EventEnvelope {
    pub id: String,
    pub event_type: String,
    pub created: DateTime<Utc>,

    /// Connected account the event originated from
    pub account: Option<String>,

    /// Full body, kept for the audit log
    pub payload: Value,

    pub event: ProcessorEvent,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    account: Option<String>,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: Value,
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<Value>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct PaymentIntentObject {
    id: String,
    #[serde(default)]
    last_payment_error: Option<PaymentErrorObject>,
}

#[derive(Deserialize)]
struct PaymentErrorObject {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ChargeObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<Value>,
}

#[derive(Deserialize)]
struct AccountObject {
    id: String,
    #[serde(default)]
    charges_enabled: bool,
}

/// Id of an expandable field: either the bare id or an expanded object
fn expandable_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) => Some(id.clone()),
        Value::Object(obj) => obj.get("id").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

fn object<T: for<'de> Deserialize<'de>>(event_type: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| PaymentError::WebhookParse(format!("Invalid {event_type} object: {e}")))
}

impl ProcessorEvent {
    fn from_object(event_type: &str, value: Value) -> Result<Self> {
        let event = match event_type {
            "checkout.session.completed" => {
                let session: SessionObject = object(event_type, value)?;
                let details = session.customer_details;
                ProcessorEvent::CheckoutSessionCompleted(CompletedSession {
                    payment_intent_id: expandable_id(session.payment_intent.as_ref()),
                    amount_total: session.amount_total,
                    currency: session.currency,
                    customer_email: details
                        .as_ref()
                        .and_then(|d| d.email.clone())
                        .or(session.customer_email),
                    customer_name: details.and_then(|d| d.name),
                    metadata: session.metadata.unwrap_or_default(),
                    session_id: session.id,
                })
            }
            "checkout.session.expired" => {
                let session: SessionObject = object(event_type, value)?;
                ProcessorEvent::CheckoutSessionExpired {
                    session_id: session.id,
                }
            }
            "checkout.session.async_payment_failed" => {
                let session: SessionObject = object(event_type, value)?;
                ProcessorEvent::CheckoutSessionAsyncPaymentFailed {
                    session_id: session.id,
                }
            }
            "payment_intent.succeeded" => {
                let intent: PaymentIntentObject = object(event_type, value)?;
                ProcessorEvent::PaymentIntentSucceeded {
                    payment_intent_id: intent.id,
                }
            }
            "payment_intent.payment_failed" => {
                let intent: PaymentIntentObject = object(event_type, value)?;
                ProcessorEvent::PaymentIntentFailed {
                    payment_intent_id: intent.id,
                    failure_message: intent.last_payment_error.and_then(|e| e.message),
                }
            }
            "charge.refunded" => {
                let charge: ChargeObject = object(event_type, value)?;
                ProcessorEvent::ChargeRefunded {
                    payment_intent_id: expandable_id(charge.payment_intent.as_ref()),
                    charge_id: charge.id,
                }
            }
            "account.updated" => {
                let account: AccountObject = object(event_type, value)?;
                ProcessorEvent::AccountUpdated {
                    account_id: account.id,
                    charges_enabled: account.charges_enabled,
                }
            }
            other => ProcessorEvent::Unhandled {
                event_type: other.to_string(),
            },
        };
        Ok(event)
    }
}

impl EventEnvelope {
    /// Parse a webhook body. Call only after the signature has been verified.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let snapshot: Value = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
        let raw: RawEvent = serde_json::from_value(snapshot.clone())
            .map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

        let created = raw
            .created
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);
        let event = ProcessorEvent::from_object(&raw.event_type, raw.data.object)?;

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            created,
            account: raw.account,
            payload: snapshot,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: &Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[test]
    fn test_parse_session_completed() {
        let payload = body(&json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "created": 1_700_000_000,
            "account": "acct_123",
            "data": {"object": {
                "id": "cs_test_1",
                "payment_intent": "pi_1",
                "amount_total": 1500,
                "currency": "usd",
                "customer_details": {"email": "buyer@example.com", "name": "Buyer"},
                "metadata": {"pageId": "p1", "userId": "u1", "totalAmount": "1500"}
            }}
        }));

        let envelope = EventEnvelope::parse(&payload).unwrap();
        assert_eq!(envelope.id, "evt_1");
        assert_eq!(envelope.account.as_deref(), Some("acct_123"));
        assert_eq!(envelope.created.timestamp(), 1_700_000_000);

        match envelope.event {
            ProcessorEvent::CheckoutSessionCompleted(session) => {
                assert_eq!(session.session_id, "cs_test_1");
                assert_eq!(session.payment_intent_id.as_deref(), Some("pi_1"));
                assert_eq!(session.customer_email.as_deref(), Some("buyer@example.com"));
                assert_eq!(session.customer_name.as_deref(), Some("Buyer"));
                assert_eq!(session.metadata["pageId"], "p1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_expanded_payment_intent() {
        let payload = body(&json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1", "payment_intent": {"id": "pi_9"}}}
        }));
        let envelope = EventEnvelope::parse(&payload).unwrap();
        assert_eq!(
            envelope.event,
            ProcessorEvent::ChargeRefunded {
                charge_id: "ch_1".into(),
                payment_intent_id: Some("pi_9".into()),
            }
        );
    }

    #[test]
    fn test_unknown_type_is_unhandled() {
        let payload = body(&json!({
            "id": "evt_3",
            "type": "customer.created",
            "data": {"object": {"id": "cus_1"}}
        }));
        let envelope = EventEnvelope::parse(&payload).unwrap();
        assert_eq!(
            envelope.event,
            ProcessorEvent::Unhandled {
                event_type: "customer.created".into()
            }
        );
    }

    #[test]
    fn test_malformed_body_rejected() {
        assert!(EventEnvelope::parse(b"not json").is_err());
        assert!(EventEnvelope::parse(br#"{"id":"evt_4"}"#).is_err());

        let missing_id = body(&json!({
            "id": "evt_5",
            "type": "checkout.session.completed",
            "data": {"object": {}}
        }));
        assert!(matches!(
            EventEnvelope::parse(&missing_id),
            Err(PaymentError::WebhookParse(_))
        ));
    }
}
