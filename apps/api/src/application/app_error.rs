use thiserror::Error;

use crate::domain::entities::subscription_status::SubscriptionStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Webhook verification failed: {0}")]
    InvalidSignature(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("No projection defined for subscription status '{}'", .0.as_str())]
    UnprojectedStatus(SubscriptionStatus),

    #[error("Billing provider error: {0}")]
    BillingProvider(String),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used when reporting a failed operation to a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The inbound event could not be authenticated.
    Verification,
    /// The payload was malformed. Retrying will not help.
    InvalidData,
    /// An external system failed. Retrying may help.
    Upstream,
}

impl AppError {
    /// Whether retrying the whole operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Transient errors - retry may succeed
            AppError::BillingProvider(_) => true,
            AppError::Directory(_) => true,
            AppError::Internal(_) => true,

            // Expected conditions - won't change with retry
            AppError::InvalidSignature(_) => false,
            AppError::Unauthorized => false,
            AppError::NotFound => false,
            AppError::InvalidData(_) => false,
            AppError::UnprojectedStatus(_) => false,
            AppError::InvalidInput(_) => false,
            AppError::Config(_) => false,
        }
    }

    /// Lookup misses and undefined projections are logged, never reported as failures.
    pub fn is_benign(&self) -> bool {
        matches!(self, AppError::NotFound | AppError::UnprojectedStatus(_))
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AppError::InvalidSignature(_) => FailureKind::Verification,
            AppError::InvalidData(_) | AppError::InvalidInput(_) => FailureKind::InvalidData,
            _ => FailureKind::Upstream,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidSignature(_) => ErrorCode::InvalidSignature,
            AppError::Unauthorized => ErrorCode::Unauthorized,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::InvalidData(_) => ErrorCode::InvalidData,
            AppError::UnprojectedStatus(_) => ErrorCode::UnprojectedStatus,
            AppError::BillingProvider(_) => ErrorCode::BillingProviderError,
            AppError::Directory(_) => ErrorCode::DirectoryError,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::Config(_) | AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    InvalidSignature,
    Unauthorized,
    NotFound,
    InvalidData,
    UnprojectedStatus,
    BillingProviderError,
    DirectoryError,
    InvalidInput,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidData => "INVALID_DATA",
            ErrorCode::UnprojectedStatus => "UNPROJECTED_STATUS",
            ErrorCode::BillingProviderError => "BILLING_PROVIDER_ERROR",
            ErrorCode::DirectoryError => "DIRECTORY_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
