use sqlx::SqlitePool;

/// Look up a user's profile picture by username. A missing user (or a user
/// without a picture) yields None; neither is an error.
pub async fn get_profile_pic(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<String>, sqlx::Error> {
    let pic: Option<Option<String>> =
        sqlx::query_scalar("SELECT profile_pic FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;
    Ok(pic.flatten())
}
