//! Reset-password: consume a single-use token and rewrite the credential.
//!
//! Absent, already-used, and expired tokens all get the same rejection.
//! Consumption and the password update commit in one transaction; the
//! conditional `is_used` update is the serialization point when two
//! consumers race on the same token.

use crate::ryanella::{
    auth::password,
    error::ApiError,
    models::ResetToken,
};
use anyhow::Context;
use axum::{extract::Extension, response::Json};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{debug, instrument, Instrument};
use utoipa::ToSchema;

use super::forgot_password::MessageResponse;

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct ResetPasswordRequest {
    token: Option<String>,
    password: Option<String>,
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses (
        (status = 200, description = "Password reset successful", body = MessageResponse),
        (status = 400, description = "Missing fields, or invalid/expired token"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();

    let (Some(token), Some(password)) = (payload.token, payload.password) else {
        return Err(ApiError::Validation(
            "Token and password are required".to_string(),
        ));
    };

    if token.is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "Token and password are required".to_string(),
        ));
    }

    consume_reset_token(&pool, &token, &password).await?;

    // No session token is issued here; the user logs in again.
    Ok(Json(MessageResponse {
        message: "Password reset successful".to_string(),
    }))
}

/// All-or-nothing consumption: mark the token used and rewrite the password
/// digest, or leave both untouched.
async fn consume_reset_token(
    pool: &PgPool,
    token: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    let mut tx = pool
        .begin()
        .await
        .context("begin reset-consumption transaction")?;

    let query = r"
        SELECT id, user_id, expires_at, is_used
        FROM password_reset_tokens
        WHERE token = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query_as::<_, ResetToken>(query)
        .bind(token)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to look up reset token")?;

    let Some(reset) = row else {
        return Err(ApiError::InvalidResetToken);
    };

    if !reset.is_consumable(Utc::now()) {
        return Err(ApiError::InvalidResetToken);
    }

    let digest = password::hash(new_password)?;

    // Conditional update: when two consumers race, only one sees the row
    // still unused; the loser rolls back on drop.
    let consumed = sqlx::query(
        r"
        UPDATE password_reset_tokens
        SET is_used = TRUE
        WHERE id = $1 AND is_used = FALSE
        ",
    )
    .bind(reset.id)
    .execute(&mut *tx)
    .await
    .context("failed to consume reset token")?;

    if consumed.rows_affected() == 0 {
        debug!("Reset token {} lost a concurrent consumption race", reset.id);

        return Err(ApiError::InvalidResetToken);
    }

    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&digest)
        .bind(reset.user_id)
        .execute(&mut *tx)
        .await
        .context("failed to update password")?;

    tx.commit()
        .await
        .context("commit reset-consumption transaction")?;

    Ok(())
}
