use crate::ryanella::{
    auth::{access_gate, token::TokenKeys},
    handlers::{
        forgot_password, forgot_password::__path_forgot_password, login, login::__path_login,
        reset_password, reset_password::__path_reset_password, users, users::__path_create_user,
        users::__path_list_users, users::__path_update_user,
    },
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post},
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod activity;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod models;

#[derive(OpenApi)]
#[openapi(
    paths(
        login,
        forgot_password,
        reset_password,
        list_users,
        create_user,
        update_user
    ),
    components(schemas(
        login::LoginRequest,
        login::LoginResponse,
        forgot_password::ForgotPasswordRequest,
        forgot_password::MessageResponse,
        reset_password::ResetPasswordRequest,
        users::CreateUserRequest,
        users::CreatedUser,
        users::UpdateUserRequest,
        users::UpdatedUser,
        users::UserListResponse,
        users::Pagination,
    )),
    tags(
        (name = "auth", description = "Admin authentication and password recovery"),
        (name = "users", description = "Admin user management")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the application router. The `/admin` subtree sits behind the access
/// gate; `/auth` and `/health` are open.
#[must_use]
pub fn router(pool: PgPool, keys: Arc<TokenKeys>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_origin(Any);

    let admin = Router::new()
        .route(
            "/users",
            get(handlers::list_users)
                .post(handlers::create_user)
                .patch(handlers::update_user),
        )
        .route_layer(middleware::from_fn(access_gate));

    Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/forgot-password", post(handlers::forgot_password))
        .route("/auth/reset-password", post(handlers::reset_password))
        .nest("/admin", admin)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(keys))
                .layer(Extension(pool.clone())),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(Extension(pool))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, keys: Arc<TokenKeys>) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let app = router(pool, keys);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
