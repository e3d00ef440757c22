use sqlx::SqlitePool;
use tracing::debug;

pub const DEFAULT_ROLE: &str = "User";
pub const ADMIN_ROLE: &str = "Admin";

// Follows and role assignments go away with the user they reference.
const TABLES: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        full_name TEXT,
        bio TEXT,
        profile_picture TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS follows (
        follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        following_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (follower_id, following_id),
        CHECK (follower_id <> following_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_follows_following ON follows (following_id)",
];

/// Creates the tables if needed and seeds the two built-in roles.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in TABLES {
        sqlx::query(statement).execute(pool).await?;
    }

    for role in [DEFAULT_ROLE, ADMIN_ROLE] {
        sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
            .bind(role)
            .execute(pool)
            .await?;
    }

    debug!("schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::db;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let pool = db::connect_in_memory().await.unwrap();
        super::migrate(&pool).await.unwrap();

        let roles: Vec<String> = sqlx::query_scalar("SELECT name FROM roles ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(roles, vec!["Admin".to_string(), "User".to_string()]);
    }
}
