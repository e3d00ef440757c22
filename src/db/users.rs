use chrono::Utc;
use sqlx::{Sqlite, SqliteExecutor, SqlitePool, Transaction};
use tracing::{info, warn};

use crate::auth::password::{hash_password, verify_password};
use crate::db::models::{
    PictureUpdate, ProfileUpdate, PublicProfile, Registration, Role, UserPage, UserRow,
    UserWithRoles,
};
use crate::db::schema::DEFAULT_ROLE;
use crate::error::{AppError, conflict_on_unique};

pub const MAX_PAGE_SIZE: i64 = 100;

/// Login failures say the same thing whether the email or the password was wrong.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password.";
const DUPLICATE_USER: &str = "Email or username already exists.";
const TAKEN: &str = "Username or email already taken.";
const USER_NOT_FOUND: &str = "User not found";

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, bio, profile_picture, created_at";

async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(email)
        .fetch_optional(pool)
        .await
}

async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn roles_for(pool: &SqlitePool, user_id: i64) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT r.name FROM roles r
        JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = ?
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

async fn role_by_name<'e>(
    executor: impl SqliteExecutor<'e>,
    name: &str,
) -> Result<Option<Role>, sqlx::Error> {
    sqlx::query_as::<_, Role>("SELECT id, name FROM roles WHERE name = ?")
        .bind(name)
        .fetch_optional(executor)
        .await
}

async fn assign_role(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    role_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(role_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Creates the user together with the default role, in one transaction.
pub async fn register(pool: &SqlitePool, reg: &Registration) -> Result<UserWithRoles, AppError> {
    if reg.password != reg.confirm_password {
        return Err(AppError::Validation("Passwords do not match.".to_string()));
    }

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE email = ? OR username = ? LIMIT 1")
            .bind(&reg.email)
            .bind(&reg.username)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        warn!(username = %reg.username, "registration rejected, duplicate username or email");
        return Err(AppError::Conflict(DUPLICATE_USER.to_string()));
    }

    let password_hash = hash_password(&reg.password)?;
    let created_at = Utc::now().timestamp_millis();

    // Dropping the transaction on any early return rolls the insert back.
    let mut tx = pool.begin().await?;

    let id = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, full_name, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&reg.username)
    .bind(&reg.email)
    .bind(&password_hash)
    .bind(&reg.full_name)
    .bind(created_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, DUPLICATE_USER))?
    .last_insert_rowid();

    let role = role_by_name(&mut *tx, DEFAULT_ROLE).await?.ok_or_else(|| {
        AppError::Config(format!("Default '{DEFAULT_ROLE}' role not found. Please check your database."))
    })?;
    assign_role(&mut tx, id, role.id).await?;

    tx.commit().await?;
    info!(user_id = id, username = %reg.username, email = %reg.email, "new user registered");

    let row = UserRow {
        id,
        username: reg.username.clone(),
        email: reg.email.clone(),
        password_hash,
        full_name: reg.full_name.clone(),
        bio: None,
        profile_picture: None,
        created_at,
    };
    Ok(UserWithRoles {
        profile: row.into_public(),
        roles: vec![role.name],
    })
}

pub async fn login(pool: &SqlitePool, email: &str, password: &str) -> Result<UserWithRoles, AppError> {
    let Some(row) = find_by_email(pool, email).await? else {
        warn!("login failed, unknown email");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    };

    if !verify_password(password, &row.password_hash) {
        warn!(user_id = row.id, "login failed, wrong password");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let roles = roles_for(pool, row.id).await?;
    info!(user_id = row.id, "user logged in");
    Ok(UserWithRoles {
        profile: row.into_public(),
        roles,
    })
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Newest users first. `search` matches username, email or full name.
pub async fn list_paginated(
    pool: &SqlitePool,
    page: i64,
    limit: i64,
    search: Option<&str>,
) -> Result<UserPage, AppError> {
    if page < 1 {
        return Err(AppError::Validation("\"page\" must be greater than or equal to 1".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::Validation(format!(
            "\"limit\" must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let pattern = search.filter(|s| !s.trim().is_empty()).map(like_pattern);
    let filter = r"(?1 IS NULL OR username LIKE ?1 ESCAPE '\' OR email LIKE ?1 ESCAPE '\' OR full_name LIKE ?1 ESCAPE '\')";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {filter}"))
        .bind(&pattern)
        .fetch_one(pool)
        .await?;

    // An offset past i64 is past every row there could be.
    let rows = match (page - 1).checked_mul(limit) {
        Some(offset) => {
            sqlx::query_as::<_, UserRow>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE {filter} ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
            ))
            .bind(&pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        None => Vec::new(),
    };

    let mut users = Vec::with_capacity(rows.len());
    for row in rows {
        let roles = roles_for(pool, row.id).await?;
        users.push(UserWithRoles {
            profile: row.into_public(),
            roles,
        });
    }

    Ok(UserPage {
        users,
        total_pages: (total + limit - 1) / limit,
        current_page: page,
    })
}

pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<PublicProfile, AppError> {
    find_by_id(pool, id)
        .await?
        .map(UserRow::into_public)
        .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))
}

pub async fn exists(pool: &SqlitePool, id: i64) -> Result<bool, AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Replaces every role the user holds with `role_name`.
pub async fn update_role(pool: &SqlitePool, user_id: i64, role_name: &str) -> Result<(), AppError> {
    let Some(role) = role_by_name(pool, role_name).await? else {
        warn!(role = role_name, "role change rejected, unknown role");
        return Err(AppError::NotFound("Role not found".to_string()));
    };
    if !exists(pool, user_id).await? {
        return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    assign_role(&mut tx, user_id, role.id).await?;
    tx.commit().await?;

    info!(user_id, role = role_name, "user role updated");
    Ok(())
}

pub async fn update_profile(
    pool: &SqlitePool,
    user_id: i64,
    update: &ProfileUpdate,
) -> Result<PublicProfile, AppError> {
    if update.username.is_some() || update.email.is_some() {
        let clash: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM users WHERE (username = ? OR email = ?) AND id <> ? LIMIT 1",
        )
        .bind(&update.username)
        .bind(&update.email)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        if clash.is_some() {
            warn!(user_id, "profile update rejected, username or email taken");
            return Err(AppError::Conflict(TAKEN.to_string()));
        }
    }

    let result = sqlx::query(
        r#"
        UPDATE users SET
            username = COALESCE(?, username),
            email = COALESCE(?, email),
            bio = COALESCE(?, bio)
        WHERE id = ?
        "#,
    )
    .bind(&update.username)
    .bind(&update.email)
    .bind(&update.bio)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_unique(e, TAKEN))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
    }

    info!(user_id, "profile updated");
    get_by_id(pool, user_id).await
}

pub async fn update_password(
    pool: &SqlitePool,
    user_id: i64,
    current_password: &str,
    new_password: &str,
) -> Result<(), AppError> {
    let Some(row) = find_by_id(pool, user_id).await? else {
        return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
    };

    if !verify_password(current_password, &row.password_hash) {
        warn!(user_id, "password change rejected, current password incorrect");
        return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
    }

    let password_hash = hash_password(new_password)?;
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

    info!(user_id, "password updated");
    Ok(())
}

pub async fn update_profile_picture(
    pool: &SqlitePool,
    user_id: i64,
    url: &str,
) -> Result<PictureUpdate, AppError> {
    let result = sqlx::query("UPDATE users SET profile_picture = ? WHERE id = ?")
        .bind(url)
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
    }

    info!(user_id, "profile picture updated");
    let updated = sqlx::query_as::<_, PictureUpdate>(
        "SELECT id, username, profile_picture FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(updated)
}
