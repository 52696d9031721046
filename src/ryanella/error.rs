//! Error taxonomy shared by every handler.
//!
//! Authentication failures stay deliberately uniform so responses never leak
//! whether an account or reset token exists. Internal detail goes to the
//! server log only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed caller input.
    #[error("{0}")]
    Validation(String),

    /// Unknown account or wrong password, one message for both.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No usable `Authorization: Bearer` header on a privileged route.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Bearer token failed signature or expiry checks.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Reset token absent, consumed, or expired; never say which.
    #[error("Invalid or expired token")]
    InvalidResetToken,

    #[error("Account restricted: Please contact a SUPER_ADMIN")]
    AccountRestricted,

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    /// Duplicate caller-supplied value; disclosing it is acceptable.
    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidResetToken | Self::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials | Self::AuthenticationRequired | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::AccountRestricted | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("Internal error: {err:?}");
        }

        let body = Json(json!({ "error": self.to_string() }));

        (self.status(), body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_the_taxonomy() {
        assert_eq!(
            ApiError::Validation("Email is required".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidResetToken.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Conflict("Email").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::AuthenticationRequired.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AccountRestricted.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Forbidden("Insufficient permissions").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::NotFound("User").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn bearer_and_reset_token_failures_share_one_message() {
        assert_eq!(
            ApiError::InvalidToken.to_string(),
            ApiError::InvalidResetToken.to_string()
        );
    }

    #[test]
    fn internal_errors_never_leak_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("connection refused to 10.0.0.7"));
        assert_eq!(err.to_string(), "Internal server error");
    }
}
