use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = status_for(&self);

        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        match self {
            AppError::InvalidSignature(_) => error_resp(status, code, None),
            AppError::InvalidData(msg) | AppError::InvalidInput(msg) => {
                error_resp(status, code, Some(msg))
            }
            AppError::UnprojectedStatus(s) => error_resp(status, code, Some(s.to_string())),
            // Upstream and internal details stay in the logs.
            _ => error_resp(status, code, None),
        }
    }
}

fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::InvalidSignature(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        AppError::NotFound => StatusCode::NOT_FOUND,
        AppError::InvalidData(_) | AppError::UnprojectedStatus(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AppError::BillingProvider(_) | AppError::Directory(_) => StatusCode::BAD_GATEWAY,
        AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
