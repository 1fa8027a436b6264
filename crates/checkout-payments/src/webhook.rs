//! Webhook Reconciliation
//!
//! Applies processor events to payments and submissions at most once per
//! event, under at-least-once delivery. Every verified event gets an audit
//! row before any business record is touched.
//!
//! On a completed session the writes are ordered so a failed attempt can be
//! redone safely:
//!
//! 1. payment → `completed`, with the chosen submission id
//! 2. submission → linked, `completed`
//! 3. payment → `webhook_processed` (always last)

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use checkout_core::{
    CoreError, PageId, Payment, PaymentStatus, Store, Submission, SubmissionId,
    SubmissionPaymentStatus, UserId, WebhookLog, WebhookOutcome,
};

use crate::checkout::metadata_keys;
use crate::error::{PaymentError, Result};
use crate::event::{CompletedSession, EventEnvelope, ProcessorEvent};
use crate::signature::WebhookVerifier;

/// How far back a completed session looks for an unlinked submission
pub const LINK_WINDOW_MINUTES: i64 = 30;

/// What the handler did with an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Business state changed
    Processed,
    /// Already handled earlier; nothing written
    Duplicate,
    /// Verified and logged, but no state change applies
    Ignored,
}

impl From<Disposition> for WebhookOutcome {
    fn from(d: Disposition) -> Self {
        match d {
            Disposition::Processed => WebhookOutcome::Processed,
            Disposition::Duplicate => WebhookOutcome::Duplicate,
            Disposition::Ignored => WebhookOutcome::Ignored,
        }
    }
}

/// Summary returned to the HTTP layer
#[derive(Clone, Debug, Serialize)]
pub struct WebhookReport {
    pub event_id: String,
    pub event_type: String,
    pub disposition: Disposition,
}

/// Webhook handler
pub struct WebhookHandler {
    store: Arc<dyn Store>,
    verifier: WebhookVerifier,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn Store>, verifier: WebhookVerifier) -> Self {
        Self { store, verifier }
    }

    /// Verify the raw body, parse it and apply the event.
    ///
    /// Nothing is read from the body or written to the store until the
    /// signature checks out.
    pub async fn process(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookReport> {
        let signature = signature
            .ok_or_else(|| PaymentError::WebhookSignature("Missing signature header".into()))?;
        self.verifier.verify(payload, signature)?;

        let envelope = EventEnvelope::parse(payload)?;
        self.handle(envelope).await
    }

    /// Apply an already verified event
    pub async fn handle(&self, envelope: EventEnvelope) -> Result<WebhookReport> {
        tracing::info!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            "Processing webhook"
        );

        let log = self
            .store
            .record_delivery(WebhookLog::received(
                envelope.id.clone(),
                envelope.event_type.clone(),
                envelope.payload.clone(),
            ))
            .await?;

        let report = |disposition| WebhookReport {
            event_id: envelope.id.clone(),
            event_type: envelope.event_type.clone(),
            disposition,
        };

        if log.outcome.is_settled() {
            tracing::info!(
                event_id = %envelope.id,
                retry_count = log.retry_count,
                "Webhook already handled"
            );
            return Ok(report(Disposition::Duplicate));
        }

        match self.apply(&envelope).await {
            Ok(disposition) => {
                self.store
                    .set_webhook_outcome(&envelope.id, disposition.into(), None)
                    .await?;
                Ok(report(disposition))
            }
            Err(e) => {
                tracing::error!(
                    event_id = %envelope.id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Webhook processing failed"
                );
                if let Err(log_err) = self
                    .store
                    .set_webhook_outcome(&envelope.id, WebhookOutcome::Failed, Some(e.to_string()))
                    .await
                {
                    tracing::warn!(event_id = %envelope.id, error = %log_err, "Could not record webhook failure");
                }
                Err(PaymentError::WebhookApply {
                    event_id: envelope.id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn apply(&self, envelope: &EventEnvelope) -> Result<Disposition> {
        match &envelope.event {
            ProcessorEvent::CheckoutSessionCompleted(session) => {
                self.complete_session(envelope, session).await
            }

            ProcessorEvent::CheckoutSessionExpired { session_id } => {
                let payment = self.store.get_payment_by_session(session_id).await?;
                self.transition(payment, PaymentStatus::Cancelled).await
            }

            ProcessorEvent::CheckoutSessionAsyncPaymentFailed { session_id } => {
                let payment = self.store.get_payment_by_session(session_id).await?;
                self.transition(payment, PaymentStatus::Failed).await
            }

            ProcessorEvent::PaymentIntentSucceeded { payment_intent_id } => {
                tracing::info!(payment_intent = %payment_intent_id, "Payment succeeded");
                Ok(Disposition::Ignored)
            }

            ProcessorEvent::PaymentIntentFailed {
                payment_intent_id,
                failure_message,
            } => {
                tracing::warn!(
                    payment_intent = %payment_intent_id,
                    reason = ?failure_message,
                    "Payment failed"
                );
                let payment = self.store.get_payment_by_intent(payment_intent_id).await?;
                self.transition(payment, PaymentStatus::Failed).await
            }

            ProcessorEvent::ChargeRefunded {
                charge_id,
                payment_intent_id,
            } => {
                let payment = match payment_intent_id {
                    Some(id) => self.store.get_payment_by_intent(id).await?,
                    None => None,
                };
                tracing::info!(charge = %charge_id, resolved = payment.is_some(), "Charge refunded");
                self.transition(payment, PaymentStatus::Refunded).await
            }

            ProcessorEvent::AccountUpdated {
                account_id,
                charges_enabled,
            } => {
                let user = self.store.find_user_by_processor_account(account_id).await?;
                tracing::info!(
                    account = %account_id,
                    charges_enabled,
                    user_id = ?user.map(|u| u.id),
                    "Connected account updated"
                );
                Ok(Disposition::Ignored)
            }

            ProcessorEvent::Unhandled { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(Disposition::Ignored)
            }
        }
    }

    async fn complete_session(
        &self,
        envelope: &EventEnvelope,
        session: &CompletedSession,
    ) -> Result<Disposition> {
        let mut payment = match self.store.get_payment_by_session(&session.session_id).await? {
            Some(p) if p.webhook_processed => {
                tracing::info!(
                    session_id = %session.session_id,
                    payment_id = %p.id,
                    "Session already reconciled"
                );
                return Ok(Disposition::Duplicate);
            }
            Some(p) => p,
            None => match self.payment_from_event(envelope, session).await? {
                Some(p) => match self.store.insert_payment(&p).await {
                    Ok(()) => p,
                    // A concurrent delivery stored the row first
                    Err(CoreError::Conflict(_)) => {
                        let existing = self
                            .store
                            .get_payment_by_session(&session.session_id)
                            .await?
                            .ok_or_else(|| CoreError::not_found("payment", session.session_id.clone()))?;
                        if existing.webhook_processed {
                            tracing::info!(
                                session_id = %session.session_id,
                                payment_id = %existing.id,
                                "Session reconciled by a concurrent delivery"
                            );
                            return Ok(Disposition::Duplicate);
                        }
                        existing
                    }
                    Err(e) => return Err(e.into()),
                },
                None => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        "Completed session has no local payment and no usable metadata"
                    );
                    return Ok(Disposition::Ignored);
                }
            },
        };

        let now = Utc::now();
        payment.status = PaymentStatus::Completed;
        payment.completed_at.get_or_insert(now);
        if session.customer_email.is_some() {
            payment.customer_email.clone_from(&session.customer_email);
        }
        if session.customer_name.is_some() {
            payment.customer_name.clone_from(&session.customer_name);
        }
        if session.payment_intent_id.is_some() {
            payment.payment_intent_id.clone_from(&session.payment_intent_id);
        }

        let submission = self.find_submission(&payment, session, envelope.created).await?;
        if let Some(s) = &submission {
            payment.submission_id = Some(s.id.clone());
        }
        payment.touch();
        self.store.update_payment(&payment).await?;

        if let Some(mut submission) = submission {
            submission.payment_id = Some(payment.id.clone());
            submission.payment_status = SubmissionPaymentStatus::Completed;
            self.store.update_submission(&submission).await?;
            tracing::info!(
                payment_id = %payment.id,
                submission_id = %submission.id,
                "Linked submission to payment"
            );
        }

        payment.webhook_processed = true;
        payment.webhook_processed_at = Some(Utc::now());
        payment.touch();
        self.store.update_payment(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            session_id = %payment.session_id,
            amount = payment.amount_cents,
            "Payment completed"
        );
        Ok(Disposition::Processed)
    }

    /// Rebuild a payment row from session metadata when none was stored
    async fn payment_from_event(
        &self,
        envelope: &EventEnvelope,
        session: &CompletedSession,
    ) -> Result<Option<Payment>> {
        let (Some(page_id), Some(user_id)) = (
            session.metadata.get(metadata_keys::PAGE_ID),
            session.metadata.get(metadata_keys::USER_ID),
        ) else {
            return Ok(None);
        };
        let page_id = PageId::from_string(page_id.as_str());
        let user_id = UserId::from_string(user_id.as_str());

        let Some(page) = self.store.get_page(&page_id).await? else {
            return Ok(None);
        };

        let account = match &envelope.account {
            Some(account) => account.clone(),
            None => self
                .store
                .get_user(&user_id)
                .await?
                .and_then(|u| u.processor_account_id)
                .unwrap_or_default(),
        };

        let amount = session
            .amount_total
            .or_else(|| {
                session
                    .metadata
                    .get(metadata_keys::TOTAL_AMOUNT)
                    .and_then(|v| v.parse().ok())
            })
            .map_or_else(|| page.total_cents(), Ok)?;
        let currency = session
            .currency
            .clone()
            .unwrap_or_else(|| page.product.currency.clone());

        let mut payment = Payment::pending(
            user_id,
            page_id,
            session.session_id.clone(),
            account,
            amount,
            currency,
        );
        payment.platform_fee_cents = crate::checkout::platform_fee(amount);
        payment.metadata = session.metadata.clone();

        tracing::info!(
            session_id = %session.session_id,
            payment_id = %payment.id,
            "Recreating payment from session metadata"
        );
        Ok(Some(payment))
    }

    /// Choose the submission to link with a completed payment.
    ///
    /// Priority: a link left by an interrupted earlier attempt, then the
    /// correlation id carried in session metadata, then the most recent
    /// unlinked submission on the page within the recency window before
    /// the event was created.
    async fn find_submission(
        &self,
        payment: &Payment,
        session: &CompletedSession,
        event_created: DateTime<Utc>,
    ) -> Result<Option<Submission>> {
        if let Some(id) = &payment.submission_id {
            return Ok(self.store.get_submission(id).await?);
        }

        if let Some(id) = session.metadata.get(metadata_keys::SUBMISSION_ID) {
            let id = SubmissionId::from_string(id.as_str());
            let candidate = self.store.get_submission(&id).await?;
            return Ok(candidate.filter(|s| {
                let usable = s.page_id == payment.page_id
                    && s.payment_id.as_ref().is_none_or(|p| p == &payment.id);
                if !usable {
                    tracing::warn!(
                        submission_id = %s.id,
                        payment_id = %payment.id,
                        "Correlated submission cannot be linked"
                    );
                }
                usable
            }));
        }

        // Event timestamps are whole seconds; the window closes at the end
        // of that second.
        let until = event_created + Duration::seconds(1);
        Ok(self
            .store
            .find_unlinked_submission(
                &payment.page_id,
                event_created - Duration::minutes(LINK_WINDOW_MINUTES),
                until,
            )
            .await?)
    }

    /// Move a payment to a terminal status if the move is meaningful
    async fn transition(&self, payment: Option<Payment>, to: PaymentStatus) -> Result<Disposition> {
        let Some(mut payment) = payment else {
            tracing::info!(status = %to, "No local payment for event");
            return Ok(Disposition::Ignored);
        };

        let allowed = match to {
            PaymentStatus::Cancelled => matches!(
                payment.status,
                PaymentStatus::Pending | PaymentStatus::Processing
            ),
            PaymentStatus::Failed => matches!(
                payment.status,
                PaymentStatus::Pending | PaymentStatus::Processing
            ),
            PaymentStatus::Refunded => payment.status == PaymentStatus::Completed,
            _ => false,
        };
        if !allowed {
            tracing::info!(
                payment_id = %payment.id,
                from = %payment.status,
                to = %to,
                "Ignoring status change"
            );
            return Ok(Disposition::Ignored);
        }

        let from = payment.status;
        payment.status = to;
        payment.touch();
        self.store.update_payment(&payment).await?;

        if to == PaymentStatus::Failed {
            let correlated = payment.submission_id.clone().or_else(|| {
                payment
                    .metadata
                    .get(metadata_keys::SUBMISSION_ID)
                    .map(|id| SubmissionId::from_string(id.as_str()))
            });
            if let Some(id) = correlated {
                if let Some(mut submission) = self.store.get_submission(&id).await? {
                    if submission.payment_id.as_ref().is_none_or(|p| p == &payment.id) {
                        submission.payment_status = SubmissionPaymentStatus::Failed;
                        self.store.update_submission(&submission).await?;
                    }
                }
            }
        }

        tracing::info!(payment_id = %payment.id, from = %from, to = %to, "Payment status changed");
        Ok(Disposition::Processed)
    }
}
