use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    routing::{get, patch, post},
};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{follows, users};
use crate::auth::token::TokenIssuer;
use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::media::{LocalMediaStore, MediaStore};

pub const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

pub struct AppState {
    pub db: SqlitePool,
    pub tokens: TokenIssuer,
    pub media: Arc<dyn MediaStore>,
}

async fn health() -> Json<Value> {
    Json(json!({ "message": "Social Media API is running!" }))
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/users", get(users::list_users))
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/users/me", get(users::me))
        .route("/users/me/profile", patch(users::update_profile))
        .route("/users/me/password", patch(users::update_password))
        .route(
            "/users/me/picture",
            patch(users::update_picture).layer(DefaultBodyLimit::max(MAX_PICTURE_BYTES)),
        )
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}/role", patch(users::update_role))
        .route("/users/{id}/follow", post(follows::follow).delete(follows::unfollow))
        .route("/users/{id}/followers", get(follows::followers))
        .route("/users/{id}/following", get(follows::following))
        .fallback(not_found)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
    info!("shutting down");
}

pub async fn start_server(config: Config) -> Result<(), AppError> {
    let pool = db::connect(&config.database_url).await?;

    let state = Arc::new(AppState {
        db: pool.clone(),
        tokens: TokenIssuer::new(&config.jwt_secret),
        media: Arc::new(LocalMediaStore::new(&config.upload_dir, &config.public_base_url)),
    });

    let app = router(state).nest_service("/uploads", ServeDir::new(&config.upload_dir));

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Server running on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    Ok(())
}
