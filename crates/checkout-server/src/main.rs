//! checkout-server binary
//!
//! Loads configuration, selects the payment processor and serves the API.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_core::MemoryStore;
use checkout_payments::ProcessorMode;
use checkout_server::{AppConfig, AppState, app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let processor = config.processor();

    match processor.mode() {
        ProcessorMode::Live => tracing::info!("✓ Stripe configured"),
        ProcessorMode::Simulated => {
            tracing::warn!("⚠ Stripe not configured - using the simulated processor");
            tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
        }
    }

    let bind_addr = config.bind_addr.clone();
    let environment = config.environment;
    let state = AppState::new(config, Arc::new(MemoryStore::new()), processor);
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("checkout-server running on http://{} ({:?})", bind_addr, environment);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                  - Health check");
    tracing::info!("  POST /auth/register|login     - Merchant auth");
    tracing::info!("  *    /pages[/{{page}}]          - Page management");
    tracing::info!("  POST /pages/{{slug}}/submit     - Public form submit");
    tracing::info!("  POST /stripe/session/{{page}}   - Create checkout session");
    tracing::info!("  POST /webhooks/stripe         - Processor webhook");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
