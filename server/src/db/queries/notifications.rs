use sqlx::SqlitePool;

/// Append a typed, JSON-shaped notification for a username.
pub async fn append_notification(
    pool: &SqlitePool,
    username: &str,
    kind: &str,
    data: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO notifications (username, type, data) VALUES (?, ?, ?)")
        .bind(username)
        .bind(kind)
        .bind(data.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Unread-or-not notification count for a username.
pub async fn count_for_user(pool: &SqlitePool, username: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE username = ?")
        .bind(username)
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};

    #[tokio::test]
    async fn test_append_notification() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        append_notification(
            &pool,
            "alice",
            "like",
            &serde_json::json!({"from": "bob", "messageId": 3}),
        )
        .await
        .unwrap();

        let (kind, data): (String, String) =
            sqlx::query_as("SELECT type, data FROM notifications WHERE username = 'alice'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(kind, "like");
        let parsed: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(parsed["from"], "bob");
        assert_eq!(parsed["messageId"], 3);
    }
}
