//! HTTP Handlers

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use checkout_core::{
    FormField, Layout, OrderBump, Page, PageId, Payment, Plan, Product, Resource, Submission,
    SubmissionId, User,
    pages::{self, PageDraft, PageUpdate},
};
use checkout_payments::{
    CheckoutRequest, CheckoutSession, ConnectLink, ProcessorMode, SIGNATURE_HEADER,
    WebhookReport,
};

use crate::auth::{hash_password, issue_token, verify_password};
use crate::error::ApiError;
use crate::extract::{ApiJson, AuthUser, ClientMeta};
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub processor: ProcessorMode,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub submission_id: SubmissionId,
}

/// Page as shown to buyers; owner details stay private
#[derive(Debug, Serialize)]
pub struct PublicPage {
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub product: Product,
    pub fields: Vec<FormField>,
    pub layout: Layout,
    pub order_bumps: Vec<OrderBump>,
    pub total_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct PlanInfo {
    pub id: Plan,
    pub name: &'static str,
    pub monthly_cents: i64,

    /// `None` means unlimited
    pub page_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub plan: Plan,
}

#[derive(Debug, Serialize)]
pub struct SimulatedCheckout {
    pub session_id: String,
    pub simulated: bool,
    pub message: &'static str,
}

// ============================================================================
// Health
// ============================================================================

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        processor: state.checkout.processor_mode(),
    })
}

// ============================================================================
// Auth
// ============================================================================

pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("A valid email is required".into()));
    }
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::new(email, payload.name.trim(), hash);
    state.store.insert_user(&user).await?;

    let token = issue_token(&state.config.jwt_secret, &user.id)?;
    tracing::info!(user_id = %user.id, "Registered user");
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    let user = state
        .store
        .find_user_by_email(&payload.email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&user.password_hash, &payload.password)? {
        tracing::info!(user_id = %user.id, "Rejected login");
        return Err(invalid());
    }

    let token = issue_token(&state.config.jwt_secret, &user.id)?;
    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

// ============================================================================
// Pages (owner)
// ============================================================================

pub async fn list_pages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<Page>>> {
    Ok(Json(state.store.list_pages_by_owner(&user.id).await?))
}

pub async fn create_page(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(draft): ApiJson<PageDraft>,
) -> ApiResult<(StatusCode, Json<Page>)> {
    let page = pages::create_page(state.store.as_ref(), &user.id, draft).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

pub async fn get_page(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(page_id): Path<PageId>,
) -> ApiResult<Json<Page>> {
    Ok(Json(
        pages::owned_page(state.store.as_ref(), &user.id, &page_id).await?,
    ))
}

pub async fn update_page(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(page_id): Path<PageId>,
    ApiJson(update): ApiJson<PageUpdate>,
) -> ApiResult<Json<Page>> {
    let page = pages::update_page(state.store.as_ref(), &user.id, &page_id, update).await?;
    Ok(Json(page))
}

pub async fn delete_page(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(page_id): Path<PageId>,
) -> ApiResult<StatusCode> {
    pages::delete_page(state.store.as_ref(), &user.id, &page_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_submissions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(page_id): Path<PageId>,
) -> ApiResult<Json<Vec<Submission>>> {
    let page = pages::owned_page(state.store.as_ref(), &user.id, &page_id).await?;
    Ok(Json(state.store.list_submissions_by_page(&page.id).await?))
}

pub async fn list_payments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(page_id): Path<PageId>,
) -> ApiResult<Json<Vec<Payment>>> {
    let page = pages::owned_page(state.store.as_ref(), &user.id, &page_id).await?;
    Ok(Json(state.store.list_payments_by_page(&page.id).await?))
}

// ============================================================================
// Public
// ============================================================================

pub async fn public_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<PublicPage>> {
    let page = state
        .store
        .get_page_by_slug(&slug)
        .await?
        .ok_or_else(|| checkout_core::CoreError::not_found("page", slug))?;

    Ok(Json(PublicPage {
        total_cents: page.total_cents()?,
        slug: page.slug,
        title: page.title,
        description: page.description,
        product: page.product,
        fields: page.fields,
        layout: page.layout,
        order_bumps: page.order_bumps,
    }))
}

/// Public form submit; the path segment is the page slug
pub async fn submit(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    ClientMeta(meta): ClientMeta,
    ApiJson(payload): ApiJson<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let submission = pages::submit_form(state.store.as_ref(), &slug, payload.data, meta).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            submission_id: submission.id,
        }),
    ))
}

// ============================================================================
// Processor
// ============================================================================

pub async fn connect(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<ConnectLink>> {
    Ok(Json(state.checkout.connect(&user.id).await?))
}

pub async fn create_session(
    State(state): State<AppState>,
    Path(page_id): Path<PageId>,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<CheckoutSession>)> {
    let session = state.checkout.create_session(&page_id, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Landing target for simulated session URLs
pub async fn simulated_checkout(Path(session_id): Path<String>) -> Json<SimulatedCheckout> {
    Json(SimulatedCheckout {
        session_id,
        simulated: true,
        message: "Simulated checkout. Deliver a signed checkout.session.completed event to finish.",
    })
}

/// Webhook intake. The body is taken as raw bytes so the signature is
/// checked against exactly what was sent.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookReport>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let report = state
        .webhooks
        .process(&body, signature)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Webhook rejected"))?;
    Ok(Json(report))
}

// ============================================================================
// Plans
// ============================================================================

pub async fn list_plans() -> Json<Vec<PlanInfo>> {
    Json(
        Plan::ALL
            .iter()
            .map(|plan| PlanInfo {
                id: *plan,
                name: plan.display_name(),
                monthly_cents: plan.monthly_cents(),
                page_limit: plan.limit(Resource::Page).as_option(),
            })
            .collect(),
    )
}

pub async fn upgrade_plan(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    ApiJson(payload): ApiJson<UpgradeRequest>,
) -> ApiResult<Json<User>> {
    let from = user.plan;
    user.plan = payload.plan;
    user.updated_at = Utc::now();
    state.store.update_user(&user).await?;

    tracing::info!(user_id = %user.id, from = %from, to = %user.plan, "Changed plan");
    Ok(Json(user))
}
