//! Admin login: credential check, blocked/role gates, token issuance.
//!
//! Failure responses for unknown emails and wrong passwords are identical,
//! and a comparable-cost hash verification runs even when no account matches,
//! so the endpoint gives no account-enumeration signal.

use crate::ryanella::{
    auth::{password, token::TokenKeys},
    error::ApiError,
    handlers::canonical_email,
    models::{PublicUser, User},
};
use axum::{extract::Extension, response::Json};
use serde::Deserialize;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, instrument, Instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Login successful", body = LoginResponse, content_type = "application/json"),
        (status = 400, description = "Missing email or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account restricted or role not allowed"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    pool: Extension<PgPool>,
    keys: Extension<Arc<TokenKeys>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();

    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(ApiError::Validation(
            "Email and password are required".to_string(),
        ));
    };

    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    // Same canonical form the account was stored under.
    let email = canonical_email(&email);

    let Some(user) = lookup_user(&pool, &email).await? else {
        // Burn comparable hashing work so the miss costs the same.
        password::dummy_verify(&password);

        return Err(ApiError::InvalidCredentials);
    };

    if !password::verify(&password, &user.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    if user.is_blocked {
        return Err(ApiError::AccountRestricted);
    }

    if !user.role.is_admin() {
        return Err(ApiError::Forbidden("Access denied"));
    }

    let token = keys
        .issue(&user)
        .map_err(|err| ApiError::Internal(err.into()))?;

    debug!("Login successful for user {}", user.id);

    Ok(Json(LoginResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

async fn lookup_user(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let query = r"
        SELECT id, name, email, password_hash, role, is_blocked
        FROM users
        WHERE email = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query_as::<_, User>(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
}
