//! Access gate for privileged routes.
//!
//! Verifies the bearer token, enforces the admin role allow-list, and injects
//! the verified identity into the request for downstream handlers. The gate
//! itself performs no database round-trip.

use crate::ryanella::{auth::token::TokenKeys, error::ApiError, models::Role};
use axum::{
    extract::{Extension, Request},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Verified identity attached to the request after the gate admits it.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
}

pub async fn access_gate(
    keys: Extension<Arc<TokenKeys>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::AuthenticationRequired)?;

    let claims = keys.verify(token).map_err(|err| {
        debug!("Token verification failed: {err}");

        ApiError::InvalidToken
    })?;

    if !claims.role.is_admin() {
        return Err(ApiError::Forbidden("Insufficient permissions"));
    }

    let identity = Identity {
        id: claims.sub,
        role: claims.role,
    };

    // Propagate the verified identity as headers for handlers that read the
    // request directly, and as an extension for extractors.
    if let Ok(value) = HeaderValue::from_str(&identity.id.to_string()) {
        req.headers_mut().insert("x-user-id", value);
    }
    req.headers_mut()
        .insert("x-user-role", HeaderValue::from_static(identity.role.as_str()));
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ryanella::{auth::token::Claims, models::User};
    use axum::{
        body::Body,
        http::{HeaderMap, Request as HttpRequest, StatusCode},
        middleware,
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use chrono::Utc;
    use http_body_util::BodyExt;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn keys() -> Arc<TokenKeys> {
        Arc::new(TokenKeys::new(&SecretString::from("gate-test-secret"), 1))
    }

    async fn whoami(identity: Extension<Identity>, headers: HeaderMap) -> impl IntoResponse {
        Json(json!({
            "id": identity.id,
            "role": identity.role,
            "x_user_id": headers.get("x-user-id").and_then(|v| v.to_str().ok()),
            "x_user_role": headers.get("x-user-role").and_then(|v| v.to_str().ok()),
        }))
    }

    fn app(keys: Arc<TokenKeys>) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route_layer(middleware::from_fn(access_gate))
            .layer(Extension(keys))
    }

    fn token_for(keys: &TokenKeys, role: Role) -> String {
        let user = User {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            email: "t@x.com".to_string(),
            password_hash: String::new(),
            role,
            is_blocked: false,
        };
        keys.issue(&user).unwrap()
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().uri("/whoami");
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, body)
    }

    #[tokio::test]
    async fn missing_header_is_unauthenticated() {
        let (status, body) = call(app(keys()), None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn malformed_scheme_is_unauthenticated() {
        let (status, body) = call(app(keys()), Some("Basic dXNlcjpwYXNz")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let (status, body) = call(app(keys()), Some("Bearer not-a-token")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let keys = keys();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "t@x.com".to_string(),
            role: Role::Admin,
            iat: now - 7200,
            exp: now - 1,
        };
        let token = keys.sign(&claims).unwrap();

        let (status, body) = call(app(keys.clone()), Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn valid_token_with_user_role_is_forbidden() {
        let keys = keys();
        let token = token_for(&keys, Role::User);

        let (status, body) = call(app(keys.clone()), Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden: Insufficient permissions");
    }

    #[tokio::test]
    async fn admin_token_reaches_the_handler_with_identity() {
        let keys = keys();
        let token = token_for(&keys, Role::Admin);

        let (status, body) = call(app(keys.clone()), Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "ADMIN");
        assert_eq!(body["x_user_role"], "ADMIN");
        assert_eq!(body["x_user_id"], body["id"]);
    }

    #[tokio::test]
    async fn super_admin_token_is_admitted() {
        let keys = keys();
        let token = token_for(&keys, Role::SuperAdmin);

        let (status, body) = call(app(keys.clone()), Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "SUPER_ADMIN");
    }
}
