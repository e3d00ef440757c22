use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiJson, ApiPath, ApiQuery};
use crate::api::auth::{Admin, AuthUser, RequireRole};
use crate::api::server::AppState;
use crate::api::validation;
use crate::db::models::{PictureUpdate, ProfileUpdate, PublicProfile, Registration, UserPage, UserWithRoles};
use crate::db::users;
use crate::error::AppError;
use crate::media::Upload;

pub const PICTURE_FIELD: &str = "profilePicture";
const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChange {
    pub role_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: UserWithRoles,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
    pub user: UserWithRoles,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<Registration>,
) -> Result<impl IntoResponse, AppError> {
    validation::registration(&payload)?;
    let user = users::register(&state.db, &payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<LoginPayload>,
) -> Result<Json<LoginResponse>, AppError> {
    validation::login(&payload.email, &payload.password)?;
    let user = users::login(&state.db, &payload.email, &payload.password).await?;
    let token = state
        .tokens
        .issue(user.profile.id, &user.profile.username, &user.roles)?;

    Ok(Json(LoginResponse {
        message: "Login successful",
        token,
        user,
    }))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: RequireRole<Admin>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<UserPage>, AppError> {
    let page = validation::query_number("page", query.page.as_deref(), 1)?;
    let limit = validation::query_number("limit", query.limit.as_deref(), DEFAULT_PAGE_SIZE)?;

    let result = users::list_paginated(&state.db, page, limit, query.search.as_deref()).await?;
    Ok(Json(result))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<PublicProfile>, AppError> {
    let id = validation::user_id(&id)?;
    Ok(Json(users::get_by_id(&state.db, id).await?))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<PublicProfile>, AppError> {
    Ok(Json(users::get_by_id(&state.db, identity.user_id).await?))
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    RequireRole(admin, _): RequireRole<Admin>,
    ApiPath(id): ApiPath<String>,
    ApiJson(payload): ApiJson<RoleChange>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = validation::user_id(&id)?;
    if payload.role_name.trim().is_empty() {
        return Err(AppError::Validation("\"roleName\" is required".to_string()));
    }
    info!(admin_id = admin.user_id, user_id = id, role = %payload.role_name, "role change requested");

    users::update_role(&state.db, id, &payload.role_name).await?;
    Ok(Json(MessageResponse {
        message: format!("User role updated to {}", payload.role_name),
    }))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    ApiJson(payload): ApiJson<ProfileUpdate>,
) -> Result<Json<PublicProfile>, AppError> {
    validation::profile_update(&payload)?;
    if payload.is_empty() {
        return Ok(Json(users::get_by_id(&state.db, identity.user_id).await?));
    }

    Ok(Json(users::update_profile(&state.db, identity.user_id, &payload).await?))
}

pub async fn update_password(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    ApiJson(payload): ApiJson<PasswordChange>,
) -> Result<Json<MessageResponse>, AppError> {
    validation::password("newPassword", &payload.new_password)?;
    users::update_password(
        &state.db,
        identity.user_id,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;

    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}

pub async fn update_picture(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PictureUpdate>, AppError> {
    let mut multipart = multipart?;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() != Some(PICTURE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        upload = Some(Upload {
            file_name,
            content_type,
            bytes,
        });
        break;
    }

    let upload = upload
        .ok_or_else(|| AppError::Validation("Profile picture file is required".to_string()))?;
    let url = state.media.store(identity.user_id, &upload).await?;

    Ok(Json(users::update_profile_picture(&state.db, identity.user_id, &url).await?))
}
