use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{identity::IdentityError, ledger::LedgerError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

/// What a `NotFound` vote error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingTarget {
    /// Unknown poll identifier.
    Poll(String),
    /// Unknown option identifier inside an existing poll.
    Option(String),
}

/// Failures of a single vote event. Each is reported to the sender only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    /// The event could not be parsed into a vote.
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    /// The display name was refused.
    #[error("invalid name: {reason}")]
    InvalidIdentity {
        /// Which rule the name broke.
        reason: IdentityError,
    },
    /// Inside the cooldown window of the identity or the origin.
    #[error("Please wait {retry_after_secs} seconds before voting again on this poll.")]
    RateLimited {
        /// Whole seconds until voting is possible again.
        retry_after_secs: u64,
    },
    /// Unknown poll or option.
    #[error("{}", not_found_message(.target))]
    NotFound {
        /// What was missing.
        target: MissingTarget,
    },
    /// Persistence failed or timed out; nothing was recorded.
    #[error("Error recording vote")]
    StorageFailure,
}

fn not_found_message(target: &MissingTarget) -> String {
    match target {
        MissingTarget::Poll(id) => format!("Poll `{id}` not found"),
        MissingTarget::Option(id) => format!("Option `{id}` not found in this poll"),
    }
}

/// Discriminant of [`VoteError`], as sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum VoteErrorKind {
    /// See [`VoteError::MalformedEvent`].
    MalformedEvent,
    /// See [`VoteError::InvalidIdentity`].
    InvalidIdentity,
    /// See [`VoteError::RateLimited`].
    RateLimited,
    /// See [`VoteError::NotFound`].
    NotFound,
    /// See [`VoteError::StorageFailure`].
    StorageFailure,
}

impl VoteError {
    /// Discriminant used on the wire and by the vote flow.
    pub fn kind(&self) -> VoteErrorKind {
        match self {
            VoteError::MalformedEvent(_) => VoteErrorKind::MalformedEvent,
            VoteError::InvalidIdentity { .. } => VoteErrorKind::InvalidIdentity,
            VoteError::RateLimited { .. } => VoteErrorKind::RateLimited,
            VoteError::NotFound { .. } => VoteErrorKind::NotFound,
            VoteError::StorageFailure => VoteErrorKind::StorageFailure,
        }
    }

    /// Cooldown left, for rate-limit errors.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            VoteError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<LedgerError> for VoteError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownPoll(id) => VoteError::NotFound {
                target: MissingTarget::Poll(id),
            },
            LedgerError::UnknownOption { option_id, .. } => VoteError::NotFound {
                target: MissingTarget::Option(option_id),
            },
            LedgerError::Storage(_) | LedgerError::Timeout | LedgerError::Contention(_) => {
                VoteError::StorageFailure
            }
        }
    }
}
