//! Application State

use std::sync::Arc;

use checkout_core::Store;
use checkout_payments::{CheckoutService, ProcessorClient, WebhookHandler, WebhookVerifier};

use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Single source of truth for all records
    pub store: Arc<dyn Store>,

    pub checkout: Arc<CheckoutService>,

    pub webhooks: Arc<WebhookHandler>,

    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        processor: Arc<dyn ProcessorClient>,
    ) -> Self {
        let checkout = CheckoutService::new(store.clone(), processor)
            .with_public_base_url(&config.public_base_url)
            .with_timeout(config.processor_timeout);
        let webhooks = WebhookHandler::new(
            store.clone(),
            WebhookVerifier::new(&config.webhook_secret),
        );

        Self {
            store,
            checkout: Arc::new(checkout),
            webhooks: Arc::new(webhooks),
            config: Arc::new(config),
        }
    }
}
