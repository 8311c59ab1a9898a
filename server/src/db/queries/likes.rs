use sqlx::SqlitePool;

/// Record a like for (message, user). The UNIQUE constraint makes a repeat
/// like a no-op; returns true only when a new row was actually inserted.
pub async fn insert_like(
    pool: &SqlitePool,
    message_id: i64,
    user: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO likes (message_id, user) VALUES (?, ?)")
        .bind(message_id)
        .bind(user)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Current total like count for a message.
pub async fn count_likes(pool: &SqlitePool, message_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE message_id = ?")
        .bind(message_id)
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_duplicate_like_does_not_double_count() {
        let pool = setup_db().await;

        assert!(insert_like(&pool, 7, "alice").await.unwrap());
        assert!(!insert_like(&pool, 7, "alice").await.unwrap());
        assert_eq!(count_likes(&pool, 7).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_likes_are_per_user_per_message() {
        let pool = setup_db().await;

        assert!(insert_like(&pool, 7, "alice").await.unwrap());
        assert!(insert_like(&pool, 7, "bob").await.unwrap());
        assert!(insert_like(&pool, 8, "alice").await.unwrap());
        assert_eq!(count_likes(&pool, 7).await.unwrap(), 2);
        assert_eq!(count_likes(&pool, 8).await.unwrap(), 1);
        assert_eq!(count_likes(&pool, 9).await.unwrap(), 0);
    }
}
