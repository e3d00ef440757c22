use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use crate::api::ApiPath;
use crate::api::auth::AuthUser;
use crate::api::server::AppState;
use crate::api::validation;
use crate::db::follows;
use crate::db::models::{FollowRecord, UserSummary};
use crate::error::AppError;

#[derive(Serialize)]
pub struct FollowResponse {
    pub message: &'static str,
    pub follow: FollowRecord,
}

pub async fn follow(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let following_id = validation::user_id(&id)?;
    let follow = follows::follow(&state.db, identity.user_id, following_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(FollowResponse {
            message: "User followed successfully",
            follow,
        }),
    ))
}

pub async fn unfollow(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    ApiPath(id): ApiPath<String>,
) -> Result<StatusCode, AppError> {
    let following_id = validation::user_id(&id)?;
    follows::unfollow(&state.db, identity.user_id, following_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn followers(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    let user_id = validation::user_id(&id)?;
    Ok(Json(follows::list_followers(&state.db, user_id).await?))
}

pub async fn following(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    let user_id = validation::user_id(&id)?;
    Ok(Json(follows::list_following(&state.db, user_id).await?))
}
