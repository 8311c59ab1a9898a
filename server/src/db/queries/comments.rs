use sqlx::SqlitePool;

/// Insert a comment on a message. Returns the assigned comment id.
pub async fn insert_comment(
    pool: &SqlitePool,
    message_id: i64,
    user: &str,
    text: &str,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query("INSERT INTO comments (message_id, user, text) VALUES (?, ?, ?)")
        .bind(message_id)
        .bind(user)
        .bind(text)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}
