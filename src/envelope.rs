//! Success/error envelope returned by the BFF endpoints.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::ApiError;

/// Machine-readable error code exposed to the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Timeout,
    NetworkError,
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,
    ServerError,
    InternalError,
    UnknownError,
}

impl ErrorCode {
    pub fn from_api_error(err: &ApiError) -> Self {
        match err {
            ApiError::Timeout { .. } => Self::Timeout,
            ApiError::Network { .. } => Self::NetworkError,
            ApiError::Http { status, .. } => Self::from_status(*status),
            ApiError::Malformed { .. } | ApiError::Config(_) => Self::UnknownError,
        }
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            500..=u16::MAX => Self::ServerError,
            _ => Self::UnknownError,
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Timeout => "The request took too long. Please try again later.",
            Self::NetworkError => "Connection error. Please check your internet connection.",
            Self::NotFound => "The requested data was not found.",
            Self::Unauthorized => "Authorization is required.",
            Self::Forbidden => "You do not have access to this resource.",
            Self::BadRequest => "The request is invalid.",
            Self::ServerError => "Server error. Please try again later.",
            Self::InternalError => "An error occurred while processing the request.",
            Self::UnknownError => "An unexpected error occurred.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BffError {
    pub code: ErrorCode,
    pub message: String,
    pub user_message: String,
    pub timestamp: String,
}

impl BffError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_user_message(code, message, code.user_message())
    }

    pub fn with_user_message(
        code: ErrorCode,
        message: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            user_message: user_message.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn from_api_error(err: &ApiError) -> Self {
        Self::new(ErrorCode::from_api_error(err), err.to_string())
    }

    pub fn bad_request(message: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self::with_user_message(ErrorCode::BadRequest, message, user_message)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Milliseconds spent producing the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BffSuccess<T> {
    pub success: bool,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BffFailure {
    pub success: bool,
    pub error: BffError,
}

/// Either `{ success: true, data, meta? }` or `{ success: false, error }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BffResponse<T> {
    Success(BffSuccess<T>),
    Failure(BffFailure),
}

impl<T> BffResponse<T> {
    pub fn ok(data: T, meta: Option<ResponseMeta>) -> Self {
        Self::Success(BffSuccess {
            success: true,
            data,
            meta,
        })
    }

    pub fn failure(error: BffError) -> Self {
        Self::Failure(BffFailure {
            success: false,
            error,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(success) => Some(&success.data),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&BffError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(&failure.error),
        }
    }
}

/// Logs a failed BFF operation with its call-site context.
pub fn log_error(err: &ApiError, context: &str) {
    tracing::error!(context, kind = ?err.kind(), status = err.status_code(), error = %err, "bff request failed");
}
