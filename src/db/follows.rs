use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::models::{FollowRecord, UserSummary, from_millis};
use crate::db::users;
use crate::error::{AppError, conflict_on_unique};

const ALREADY_FOLLOWING: &str = "You are already following this user.";

pub async fn follow(
    pool: &SqlitePool,
    follower_id: i64,
    following_id: i64,
) -> Result<FollowRecord, AppError> {
    if follower_id == following_id {
        return Err(AppError::SelfFollow);
    }

    if !users::exists(pool, follower_id).await? {
        warn!(follower_id, "follow rejected, follower does not exist");
        return Err(AppError::NotFound("User not found".to_string()));
    }
    if !users::exists(pool, following_id).await? {
        warn!(follower_id, following_id, "follow rejected, target does not exist");
        return Err(AppError::NotFound("User to follow not found.".to_string()));
    }

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT created_at FROM follows WHERE follower_id = ? AND following_id = ?",
    )
    .bind(follower_id)
    .bind(following_id)
    .fetch_optional(pool)
    .await?;
    if existing.is_some() {
        warn!(follower_id, following_id, "follow rejected, already following");
        return Err(AppError::Conflict(ALREADY_FOLLOWING.to_string()));
    }

    let created_at = Utc::now().timestamp_millis();
    sqlx::query("INSERT INTO follows (follower_id, following_id, created_at) VALUES (?, ?, ?)")
        .bind(follower_id)
        .bind(following_id)
        .bind(created_at)
        .execute(pool)
        .await
        .map_err(|e| conflict_on_unique(e, ALREADY_FOLLOWING))?;

    info!(follower_id, following_id, "user followed");
    Ok(FollowRecord {
        follower_id,
        following_id,
        created_at: from_millis(created_at),
    })
}

pub async fn unfollow(pool: &SqlitePool, follower_id: i64, following_id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND following_id = ?")
        .bind(follower_id)
        .bind(following_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        warn!(follower_id, following_id, "unfollow rejected, not following");
        return Err(AppError::NotFound("You are not following this user.".to_string()));
    }

    info!(follower_id, following_id, "user unfollowed");
    Ok(())
}

/// Users who follow `user_id`, most recent first.
pub async fn list_followers(pool: &SqlitePool, user_id: i64) -> Result<Vec<UserSummary>, AppError> {
    let followers = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT u.id, u.username, u.full_name, u.profile_picture
        FROM follows f
        JOIN users u ON u.id = f.follower_id
        WHERE f.following_id = ?
        ORDER BY f.created_at DESC, u.id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(followers)
}

/// Users that `user_id` follows, most recent first.
pub async fn list_following(pool: &SqlitePool, user_id: i64) -> Result<Vec<UserSummary>, AppError> {
    let following = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT u.id, u.username, u.full_name, u.profile_picture
        FROM follows f
        JOIN users u ON u.id = f.following_id
        WHERE f.follower_id = ?
        ORDER BY f.created_at DESC, u.id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(following)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::users::tests::insert_user;

    fn names(list: Vec<UserSummary>) -> Vec<String> {
        list.into_iter().map(|u| u.username).collect()
    }

    #[tokio::test]
    async fn test_cannot_follow_self() {
        let pool = db::connect_in_memory().await.unwrap();
        let a = insert_user(&pool, "alice", 1).await;

        assert!(matches!(follow(&pool, a, a).await, Err(AppError::SelfFollow)));
    }

    #[tokio::test]
    async fn test_follow_missing_user() {
        let pool = db::connect_in_memory().await.unwrap();
        let a = insert_user(&pool, "alice", 1).await;

        assert!(matches!(follow(&pool, a, a + 1).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_follow_from_deleted_user() {
        let pool = db::connect_in_memory().await.unwrap();
        let a = insert_user(&pool, "alice", 1).await;
        let b = insert_user(&pool, "bob", 2).await;
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(a)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(follow(&pool, a, b).await, Err(AppError::NotFound(_))));
        assert!(list_followers(&pool, b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_follow_twice_conflicts() {
        let pool = db::connect_in_memory().await.unwrap();
        let a = insert_user(&pool, "alice", 1).await;
        let b = insert_user(&pool, "bob", 2).await;

        let record = follow(&pool, a, b).await.unwrap();
        assert_eq!(record.follower_id, a);
        assert_eq!(record.following_id, b);
        assert!(matches!(follow(&pool, a, b).await, Err(AppError::Conflict(_))));

        // The reverse edge is a different relation.
        follow(&pool, b, a).await.unwrap();
    }

    #[tokio::test]
    async fn test_unfollow() {
        let pool = db::connect_in_memory().await.unwrap();
        let a = insert_user(&pool, "alice", 1).await;
        let b = insert_user(&pool, "bob", 2).await;

        assert!(matches!(unfollow(&pool, a, b).await, Err(AppError::NotFound(_))));

        follow(&pool, a, b).await.unwrap();
        unfollow(&pool, a, b).await.unwrap();
        assert!(list_following(&pool, a).await.unwrap().is_empty());
        assert!(matches!(unfollow(&pool, a, b).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_followers_and_following() {
        let pool = db::connect_in_memory().await.unwrap();
        let a = insert_user(&pool, "alice", 1).await;
        let b = insert_user(&pool, "bob", 2).await;
        let c = insert_user(&pool, "carol", 3).await;

        follow(&pool, a, c).await.unwrap();
        follow(&pool, b, c).await.unwrap();
        follow(&pool, c, a).await.unwrap();

        let mut followers = names(list_followers(&pool, c).await.unwrap());
        followers.sort();
        assert_eq!(followers, vec!["alice", "bob"]);
        assert_eq!(names(list_following(&pool, c).await.unwrap()), vec!["alice"]);
        assert!(list_following(&pool, b + 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleting_user_cascades_follows() {
        let pool = db::connect_in_memory().await.unwrap();
        let a = insert_user(&pool, "alice", 1).await;
        let b = insert_user(&pool, "bob", 2).await;
        follow(&pool, a, b).await.unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(b)
            .execute(&pool)
            .await
            .unwrap();

        assert!(list_following(&pool, a).await.unwrap().is_empty());
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
