//! User management endpoints behind the access gate.
//!
//! Listing is open to any admitted admin; creating admins and changing
//! role/blocked flags is SUPER_ADMIN-only, with a server-side guard against
//! modifying one's own record.

use crate::ryanella::{
    activity,
    auth::{password, Identity},
    error::ApiError,
    handlers::{canonical_email, client_ip, valid_email},
    models::{Role, UserSummary},
};
use anyhow::Context;
use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{instrument, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListUsersParams {
    role: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
    pub pagination: Pagination,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct CreateUserRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    role: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct UpdateUserRequest {
    user_id: Option<String>,
    role: Option<String>,
    is_blocked: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdatedUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_blocked: bool,
}

#[utoipa::path(
    get,
    path = "/admin/users",
    params(
        ("role" = Option<String>, Query, description = "Filter by role"),
        ("page" = Option<i64>, Query, description = "1-based page number"),
        ("limit" = Option<i64>, Query, description = "Page size, capped at 100"),
    ),
    responses (
        (status = 200, description = "Paginated user list", body = UserListResponse),
        (status = 400, description = "Unknown role filter"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Insufficient permissions"),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn list_users(
    pool: Extension<PgPool>,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<UserListResponse>, ApiError> {
    let role = match params.role.as_deref() {
        Some(value) => Some(
            value
                .parse::<Role>()
                .map_err(|_| ApiError::Validation("Invalid role".to_string()))?,
        ),
        None => None,
    };

    let page = params.page.unwrap_or(1).max(1);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1) * limit;

    let (users, total) = fetch_users(&pool, role, limit, offset).await?;

    Ok(Json(UserListResponse {
        users,
        pagination: Pagination {
            total,
            page,
            limit,
            total_pages: (total + limit - 1) / limit,
        },
    }))
}

#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses (
        (status = 200, description = "Admin account created", body = CreatedUser),
        (status = 400, description = "Missing fields or duplicate email"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not SUPER_ADMIN"),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn create_user(
    pool: Extension<PgPool>,
    identity: Extension<Identity>,
    headers: HeaderMap,
    payload: Option<Json<CreateUserRequest>>,
) -> Result<Json<CreatedUser>, ApiError> {
    if identity.role != Role::SuperAdmin {
        return Err(ApiError::Forbidden("Only SUPER_ADMIN can create admins"));
    }

    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();

    let (Some(name), Some(email), Some(plaintext), Some(role)) =
        (payload.name, payload.email, payload.password, payload.role)
    else {
        return Err(ApiError::Validation("Missing required fields".to_string()));
    };

    let email = canonical_email(&email);
    if !valid_email(&email) {
        return Err(ApiError::Validation("Invalid email".to_string()));
    }

    let role = role
        .parse::<Role>()
        .map_err(|_| ApiError::Validation("Invalid role".to_string()))?;

    let digest = password::hash(&plaintext)?;

    let user = insert_user(&pool, &name, &email, &digest, role, payload.phone).await?;

    activity::record(
        &pool,
        identity.id,
        "CREATE_ADMIN",
        Some(format!("Created {role}: {email}")),
        client_ip(&headers),
    )
    .await;

    Ok(Json(user))
}

#[utoipa::path(
    patch,
    path = "/admin/users",
    request_body = UpdateUserRequest,
    responses (
        (status = 200, description = "User updated", body = UpdatedUser),
        (status = 400, description = "Missing user id or invalid role"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller is not SUPER_ADMIN, or targets their own account"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn update_user(
    pool: Extension<PgPool>,
    identity: Extension<Identity>,
    headers: HeaderMap,
    payload: Option<Json<UpdateUserRequest>>,
) -> Result<Json<UpdatedUser>, ApiError> {
    if identity.role != Role::SuperAdmin {
        return Err(ApiError::Forbidden(
            "Only SUPER_ADMIN can manage administrative roles",
        ));
    }

    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();

    let Some(user_id) = payload.user_id else {
        return Err(ApiError::Validation("User ID is required".to_string()));
    };
    let user_id = Uuid::parse_str(user_id.trim())
        .map_err(|_| ApiError::Validation("Invalid user ID".to_string()))?;

    // Server-side self-service exclusion, keyed off the verified identity.
    if user_id == identity.id {
        return Err(ApiError::Forbidden("Cannot modify your own account"));
    }

    let role = match payload.role.as_deref() {
        Some(value) => Some(
            value
                .parse::<Role>()
                .map_err(|_| ApiError::Validation("Invalid role".to_string()))?,
        ),
        None => None,
    };

    if role.is_none() && payload.is_blocked.is_none() {
        return Err(ApiError::Validation("No updates provided".to_string()));
    }

    let user = apply_user_update(&pool, user_id, role, payload.is_blocked).await?;

    let mut changes = Vec::new();
    if let Some(role) = role {
        changes.push(format!("role={role}"));
    }
    if let Some(blocked) = payload.is_blocked {
        changes.push(format!("is_blocked={blocked}"));
    }

    activity::record(
        &pool,
        identity.id,
        "UPDATE_ADMIN",
        Some(format!("Updated {}: {}", user.email, changes.join(", "))),
        client_ip(&headers),
    )
    .await;

    Ok(Json(user))
}

async fn fetch_users(
    pool: &PgPool,
    role: Option<Role>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<UserSummary>, i64), ApiError> {
    let (users, total) = if let Some(role) = role {
        let query = r"
            SELECT id, name, email, role, phone, is_blocked, created_at
            FROM users
            WHERE role = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let users = sqlx::query_as::<_, UserSummary>(query)
            .bind(role)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to list users")?;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM users WHERE role = $1")
            .bind(role)
            .fetch_one(pool)
            .await
            .context("failed to count users")?
            .get("total");

        (users, total)
    } else {
        let query = r"
            SELECT id, name, email, role, phone, is_blocked, created_at
            FROM users
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let users = sqlx::query_as::<_, UserSummary>(query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .instrument(span)
            .await
            .context("failed to list users")?;

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM users")
            .fetch_one(pool)
            .await
            .context("failed to count users")?
            .get("total");

        (users, total)
    };

    Ok((users, total))
}

async fn insert_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    digest: &str,
    role: Role,
    phone: Option<String>,
) -> Result<CreatedUser, ApiError> {
    let query = r"
        INSERT INTO users
            (name, email, password_hash, role, phone)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(email)
        .bind(digest)
        .bind(role)
        .bind(&phone)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(CreatedUser {
            id: row.get("id"),
            name: name.to_string(),
            email: email.to_string(),
            role,
        }),
        Err(err) if is_unique_violation(&err) => Err(ApiError::Conflict("Email")),
        Err(err) => Err(err.into()),
    }
}

async fn apply_user_update(
    pool: &PgPool,
    user_id: Uuid,
    role: Option<Role>,
    is_blocked: Option<bool>,
) -> Result<UpdatedUser, ApiError> {
    let query = r"
        UPDATE users
        SET
            role = COALESCE($2, role),
            is_blocked = COALESCE($3, is_blocked)
        WHERE id = $1
        RETURNING id, name, email, role, is_blocked
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(role)
        .bind(is_blocked)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update user")?;

    let Some(row) = row else {
        return Err(ApiError::NotFound("User"));
    };

    Ok(UpdatedUser {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: row.get("role"),
        is_blocked: row.get("is_blocked"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
