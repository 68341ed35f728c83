//! Per-user billing operations for the embedding backend.
//!
//! The caller owns end-user authentication; these routes only check the
//! internal API key (applied in mod.rs when nesting this router).

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::use_cases::{
        billing_overview::DEFAULT_HISTORY_LIMIT, subscription_projector::ProjectionOutcome,
    },
};

const MAX_HISTORY_LIMIT: u32 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}/checkout", post(start_checkout))
        .route("/{user_id}/portal", post(open_portal))
        .route("/{user_id}/resync", post(resync))
        .route("/{user_id}/subscription", get(subscription))
        .route("/{user_id}/payments", get(payments))
        .route("/{user_id}/upcoming", get(upcoming))
        .route("/{user_id}/payment-methods", get(payment_methods))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
struct CheckoutPayload {
    price_id: String,
}

#[derive(Deserialize)]
struct PortalPayload {
    return_url: String,
}

#[derive(Serialize)]
struct RedirectUrlResponse {
    url: String,
}

#[derive(Serialize)]
struct ResyncResponse {
    outcome: &'static str,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

fn outcome_label(outcome: &ProjectionOutcome) -> &'static str {
    match outcome {
        ProjectionOutcome::Written { .. } => "written",
        ProjectionOutcome::Unchanged { .. } => "unchanged",
        ProjectionOutcome::OwnerNotFound => "owner_not_found",
        ProjectionOutcome::NothingToProject => "nothing_to_project",
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/users/{user_id}/checkout
async fn start_checkout(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<CheckoutPayload>,
) -> AppResult<impl IntoResponse> {
    let price_id = payload.price_id.trim();
    if price_id.is_empty() {
        return Err(AppError::InvalidInput("price_id is required".into()));
    }

    let url = app_state
        .checkout_sessions
        .start_checkout(&user_id, price_id)
        .await?;
    Ok(Json(RedirectUrlResponse { url }))
}

/// POST /api/users/{user_id}/portal
async fn open_portal(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<PortalPayload>,
) -> AppResult<impl IntoResponse> {
    let return_url = Url::parse(&payload.return_url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .ok_or_else(|| AppError::InvalidInput("return_url must be an absolute http(s) URL".into()))?;

    let url = app_state
        .portal
        .create_portal_session(&user_id, return_url.as_str())
        .await?;
    Ok(Json(RedirectUrlResponse { url }))
}

/// POST /api/users/{user_id}/resync
///
/// Recomputes the user's billing metadata from the provider.
async fn resync(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let outcome = app_state.subscription_projector.resync_user(&user_id).await?;
    Ok(Json(ResyncResponse {
        outcome: outcome_label(&outcome),
    }))
}

/// GET /api/users/{user_id}/subscription
async fn subscription(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let details = app_state
        .billing_overview
        .subscription_details(&user_id)
        .await?;
    Ok(Json(details))
}

/// GET /api/users/{user_id}/payments?limit=...
async fn payments(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(AppError::InvalidInput(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }

    let history = app_state
        .billing_overview
        .payment_history(&user_id, limit)
        .await?;
    Ok(Json(history))
}

/// GET /api/users/{user_id}/upcoming
async fn upcoming(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let upcoming = app_state.billing_overview.upcoming_payments(&user_id).await?;
    Ok(Json(upcoming))
}

/// GET /api/users/{user_id}/payment-methods
async fn payment_methods(
    State(app_state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let methods = app_state.billing_overview.payment_methods(&user_id).await?;
    Ok(Json(methods))
}
