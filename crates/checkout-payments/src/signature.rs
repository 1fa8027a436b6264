//! Webhook signature verification
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`.
//! The MAC is HMAC-SHA256 over `"<t>." || raw body` keyed by the signing
//! secret. Several `v1` entries may be present while a secret is rotated.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum accepted age of a signed timestamp, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies and produces webhook signatures for one signing secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    fn mac(&self, timestamp: &str, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PaymentError::Config(format!("Invalid webhook secret: {e}")))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// Verify against the current clock
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<()> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify as if the current time were `now` (unix seconds)
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<()> {
        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| PaymentError::WebhookSignature("Missing timestamp".into()))?;
        if candidates.is_empty() {
            return Err(PaymentError::WebhookSignature("Missing v1 signature".into()));
        }

        let signed_at: i64 = timestamp
            .parse()
            .map_err(|_| PaymentError::WebhookSignature("Malformed timestamp".into()))?;
        if (now - signed_at).abs() > self.tolerance_secs {
            return Err(PaymentError::WebhookSignature(
                "Timestamp outside tolerance".into(),
            ));
        }

        let expected = hex::encode(self.mac(timestamp, payload)?.finalize().into_bytes());
        let matched = candidates
            .iter()
            .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));

        if matched {
            Ok(())
        } else {
            Err(PaymentError::WebhookSignature("Signature mismatch".into()))
        }
    }

    /// Build a signature header for `payload` signed at `timestamp`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let t = timestamp.to_string();
        let signature = hex::encode(self.mac(&t, payload)?.finalize().into_bytes());
        Ok(format!("t={t},v1={signature}"))
    }
}
