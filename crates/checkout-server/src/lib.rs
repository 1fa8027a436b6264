//! # checkout-server
//!
//! Axum application for hosted checkout pages: merchant dashboard API,
//! public pages and submissions, processor connect and sessions, and the
//! processor webhook.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub use crate::config::{AllowedOrigins, AppConfig, ConfigError, Environment};
pub use crate::error::{ApiError, expose_internal_errors};
pub use crate::state::AppState;

use crate::handlers::{
    connect, create_page, create_session, delete_page, get_page, health_check, list_pages,
    list_payments, list_plans, list_submissions, login, me, public_page, register,
    simulated_checkout, stripe_webhook, submit, update_page, upgrade_plan,
};

fn cors(origins: &AllowedOrigins) -> CorsLayer {
    let allow = match origins {
        AllowedOrigins::Any => AllowOrigin::from(Any),
        AllowedOrigins::List(list) => AllowOrigin::list(
            list.iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        ),
    };
    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = cors(&state.config.allowed_origins);

    let mut router = Router::new()
        // Health
        .route("/health", get(health_check))

        // Auth
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))

        // Pages (owner)
        .route("/pages", get(list_pages).post(create_page))
        .route(
            "/pages/{page}",
            get(get_page).put(update_page).delete(delete_page),
        )
        .route("/pages/{page}/submissions", get(list_submissions))
        .route("/pages/{page}/payments", get(list_payments))

        // Public
        .route("/pages/{page}/submit", post(submit))
        .route("/p/{slug}", get(public_page))

        // Processor
        .route("/stripe/connect", post(connect))
        .route("/stripe/session/{page}", post(create_session))
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/simulated-checkout/{session}", get(simulated_checkout))

        // Plans
        .route("/plans", get(list_plans))
        .route("/plans/upgrade", post(upgrade_plan));

    if !state.config.environment.is_production() {
        router = router.layer(middleware::from_fn(expose_internal_errors));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
