//! Live Stripe client
//!
//! Sessions are created on the merchant's connected account with the
//! platform fee taken as an application fee.

use async_trait::async_trait;
use stripe::{
    Account, AccountId, AccountLink, AccountLinkType, AccountType, CheckoutSession,
    CheckoutSessionMode, Client, CreateAccount, CreateAccountLink, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateCheckoutSessionPaymentIntentData,
    Currency,
};

use super::{HostedSession, ProcessorClient, ProcessorMode, SessionRequest};
use crate::error::{PaymentError, Result};

/// Stripe client wrapper
pub struct StripeProcessor {
    client: Client,
}

impl StripeProcessor {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }

    fn connected(&self, account_id: &str) -> Result<Client> {
        let account: AccountId = account_id
            .parse()
            .map_err(|e| PaymentError::Processor(format!("Invalid account id {account_id}: {e}")))?;
        Ok(self.client.clone().with_stripe_account(account))
    }
}

fn parse_currency(code: &str) -> Result<Currency> {
    serde_json::from_value(serde_json::Value::String(code.to_lowercase()))
        .map_err(|_| PaymentError::Processor(format!("Unsupported currency: {code}")))
}

#[async_trait]
impl ProcessorClient for StripeProcessor {
    async fn create_checkout_session(&self, request: &SessionRequest) -> Result<HostedSession> {
        let client = self.connected(&request.account_id)?;
        let currency = parse_currency(&request.currency)?;

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.customer_email = request.customer_email.as_deref();
        params.client_reference_id = request.client_reference_id.as_deref();
        params.metadata = Some(request.metadata.clone());
        params.payment_intent_data = Some(CreateCheckoutSessionPaymentIntentData {
            application_fee_amount: Some(request.application_fee_cents),
            metadata: Some(request.metadata.clone()),
            ..Default::default()
        });
        params.line_items = Some(
            request
                .line_items
                .iter()
                .map(|item| CreateCheckoutSessionLineItems {
                    quantity: Some(item.quantity),
                    price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                        currency,
                        unit_amount: Some(item.amount_cents),
                        product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                            name: item.name.clone(),
                            description: item.description.clone(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                })
                .collect(),
        );

        let session = CheckoutSession::create(&client, params)
            .await
            .map_err(|e| PaymentError::Processor(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::Processor("No checkout URL returned".into()))?;

        Ok(HostedSession {
            id: session.id.to_string(),
            url,
        })
    }

    async fn create_account(&self, email: &str) -> Result<String> {
        let mut params = CreateAccount::new();
        params.type_ = Some(AccountType::Express);
        params.email = Some(email);

        let account = Account::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Processor(e.to_string()))?;

        Ok(account.id.to_string())
    }

    async fn onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<String> {
        let account: AccountId = account_id
            .parse()
            .map_err(|e| PaymentError::Processor(format!("Invalid account id {account_id}: {e}")))?;

        let mut params = CreateAccountLink::new(account, AccountLinkType::AccountOnboarding);
        params.refresh_url = Some(refresh_url);
        params.return_url = Some(return_url);

        let link = AccountLink::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Processor(e.to_string()))?;

        Ok(link.url)
    }

    fn mode(&self) -> ProcessorMode {
        ProcessorMode::Live
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("USD").unwrap(), Currency::USD);
        assert_eq!(parse_currency("eur").unwrap(), Currency::EUR);
        assert!(parse_currency("zzz").is_err());
    }
}
