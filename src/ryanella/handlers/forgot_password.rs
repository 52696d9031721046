//! Forgot-password: issue a single-use, time-boxed reset token.
//!
//! The response is the same whether or not the email matches an account.
//! Requesting a new token invalidates any unused tokens for the same user,
//! so at most one outstanding token is consumable at a time.

use crate::ryanella::{
    error::ApiError,
    handlers::{canonical_email, valid_email},
};
use anyhow::Context;
use axum::{extract::Extension, response::Json};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

const RESET_MESSAGE: &str = "If this email is registered, you will receive a reset link shortly.";

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct ForgotPasswordRequest {
    email: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses (
        (status = 200, description = "Generic confirmation, never discloses account existence", body = MessageResponse),
        (status = 400, description = "Missing email"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();

    let Some(email) = payload.email else {
        return Err(ApiError::Validation("Email is required".to_string()));
    };

    let email = canonical_email(&email);

    // A malformed address is treated like a miss: the caller sees the same
    // generic message either way.
    if valid_email(&email) {
        if let Some(user_id) = lookup_user_id(&pool, &email).await? {
            let token = generate_reset_token()?;

            issue_reset_token(&pool, user_id, &token).await?;

            // Operational stand-in for out-of-band email delivery. Must not
            // be raised above debug on an internet-facing deployment.
            debug!("Reset link for {email}: /admin/reset-password?token={token}");
        }
    }

    Ok(Json(MessageResponse {
        message: RESET_MESSAGE.to_string(),
    }))
}

/// 256 bits from the OS CSPRNG, url-safe encoded: 43 characters, fixed length.
fn generate_reset_token() -> Result<String, ApiError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset token")?;

    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

async fn lookup_user_id(pool: &PgPool, email: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let query = "SELECT id FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    Ok(row.map(|row| row.get("id")))
}

/// Invalidate prior unused tokens and write the new one in one transaction.
async fn issue_reset_token(pool: &PgPool, user_id: Uuid, token: &str) -> Result<(), ApiError> {
    let mut tx = pool
        .begin()
        .await
        .context("begin reset-token transaction")?;

    sqlx::query(
        r"
        UPDATE password_reset_tokens
        SET is_used = TRUE
        WHERE user_id = $1 AND is_used = FALSE
        ",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .context("failed to invalidate previous reset tokens")?;

    sqlx::query(
        r"
        INSERT INTO password_reset_tokens
            (user_id, token, expires_at)
        VALUES ($1, $2, NOW() + INTERVAL '1 hour')
        ",
    )
    .bind(user_id)
    .bind(token)
    .execute(&mut *tx)
    .await
    .context("failed to insert reset token")?;

    tx.commit().await.context("commit reset-token transaction")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn reset_tokens_are_fixed_length_and_unique() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let token = generate_reset_token().unwrap();
            assert_eq!(token.len(), 43);
            assert!(seen.insert(token));
        }
    }

    #[test]
    fn reset_tokens_are_url_safe() {
        let token = generate_reset_token().unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
