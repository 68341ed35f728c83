//! Billing-provider entry points: webhook deliveries and the checkout return.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult, ErrorCode, FailureKind},
    application::use_cases::checkout_linkage::CheckoutRedirect,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/billing/webhook
///
/// The body is taken verbatim; the signature covers the exact bytes sent.
async fn handle_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Response> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("Missing stripe-signature header".into()))?;

    let outcome = app_state
        .webhook_dispatcher
        .dispatch(
            &body,
            signature,
            app_state.config.stripe_webhook_secret.expose_secret(),
        )
        .await;

    if outcome.success {
        return Ok((StatusCode::OK, Json(serde_json::json!({ "received": true }))).into_response());
    }

    // The dispatcher has already logged the failure with full context.
    let (status, code) = match outcome.failure {
        Some(FailureKind::Verification) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidSignature),
        Some(FailureKind::InvalidData) => (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::InvalidData),
        // 5xx makes the provider redeliver.
        Some(FailureKind::Upstream) | None => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError)
        }
    };
    let body = serde_json::json!({
        "code": code.as_str(),
        "event_id": outcome.event.as_ref().map(|e| e.delivery_id.as_str()),
    });
    Ok((status, Json(body)).into_response())
}

#[derive(Deserialize)]
struct CheckoutReturnQuery {
    session_id: Option<String>,
}

/// GET /api/billing/checkout?session_id=...
///
/// Where the hosted checkout sends the browser back to. Always redirects.
async fn handle_checkout_return(
    State(app_state): State<AppState>,
    Query(query): Query<CheckoutReturnQuery>,
) -> Redirect {
    let config = &app_state.config;
    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        tracing::warn!("Checkout return without session_id");
        return Redirect::to(&config.error_redirect());
    };

    match app_state
        .checkout_linkage
        .handle_checkout_return(&session_id)
        .await
    {
        CheckoutRedirect::Success => Redirect::to(&config.success_redirect()),
        CheckoutRedirect::Error => Redirect::to(&config.error_redirect()),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/checkout", get(handle_checkout_return))
}
