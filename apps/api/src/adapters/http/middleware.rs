use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;

use crate::{
    adapters::http::app_state::AppState, app_error::AppError,
    infra::stripe_client::constant_time_compare,
};

/// Requires `Authorization: Bearer <INTERNAL_API_KEY>`.
pub async fn internal_api_key_auth(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(presented) = presented else {
        tracing::debug!(uri = %request.uri(), "Internal request without bearer token");
        return Err(AppError::Unauthorized);
    };

    let expected = app_state.config.internal_api_key.expose_secret();
    if expected.is_empty() || !constant_time_compare(presented, expected) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
