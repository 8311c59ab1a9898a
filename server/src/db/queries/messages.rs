use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::db::models::{ChatMessageRow, CommentRow, LikeCountRow};

/// A chat message assembled for history replay: the row plus its derived
/// like count and ordered comments.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub message: ChatMessageRow,
    pub likes: i64,
    pub comments: Vec<CommentRow>,
}

/// Insert a new chat message. Returns the assigned row id.
pub async fn insert_message(
    pool: &SqlitePool,
    user: &str,
    room: Option<&str>,
    text: &str,
    image: Option<&str>,
    file: Option<&str>,
    file_name: Option<&str>,
    file_type: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO chat_messages (user, room, message, image, file, file_name, file_type) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user)
    .bind(room)
    .bind(text)
    .bind(image)
    .bind(file)
    .bind(file_name)
    .bind(file_type)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Delete a message and its dependent comments and likes.
/// Deleting an already-absent message is a no-op.
pub async fn delete_message(pool: &SqlitePool, message_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM comments WHERE message_id = ?")
        .bind(message_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM likes WHERE message_id = ?")
        .bind(message_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM chat_messages WHERE id = ?")
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Look up a message's author. Returns None if the message does not exist.
pub async fn get_author(pool: &SqlitePool, message_id: i64) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT user FROM chat_messages WHERE id = ?")
        .bind(message_id)
        .fetch_optional(pool)
        .await
}

/// Load ordered message history, optionally scoped to a room (None selects
/// the global feed, i.e. rows with NULL room). Each entry carries the
/// author's current profile picture, the like count and ordered comments.
pub async fn load_history(
    pool: &SqlitePool,
    room: Option<&str>,
) -> Result<Vec<HistoryEntry>, sqlx::Error> {
    let rows: Vec<ChatMessageRow> = match room {
        Some(room) => {
            sqlx::query_as(
                "SELECT c.id, c.user, u.profile_pic, c.room, c.message, c.image, c.file, \
                 c.file_name, c.file_type, strftime('%s', c.timestamp) * 1000 AS ts \
                 FROM chat_messages c LEFT JOIN users u ON c.user = u.username \
                 WHERE c.room = ? ORDER BY c.id",
            )
            .bind(room)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT c.id, c.user, u.profile_pic, c.room, c.message, c.image, c.file, \
                 c.file_name, c.file_type, strftime('%s', c.timestamp) * 1000 AS ts \
                 FROM chat_messages c LEFT JOIN users u ON c.user = u.username \
                 WHERE c.room IS NULL ORDER BY c.id",
            )
            .fetch_all(pool)
            .await?
        }
    };

    let comment_rows: Vec<CommentRow> = sqlx::query_as(
        "SELECT id, message_id, user, text, strftime('%s', timestamp) * 1000 AS ts \
         FROM comments ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let like_rows: Vec<LikeCountRow> = sqlx::query_as(
        "SELECT message_id, COUNT(*) AS count FROM likes GROUP BY message_id",
    )
    .fetch_all(pool)
    .await?;

    let mut comments: HashMap<i64, Vec<CommentRow>> = HashMap::new();
    for c in comment_rows {
        comments.entry(c.message_id).or_default().push(c);
    }
    let likes: HashMap<i64, i64> = like_rows.into_iter().map(|l| (l.message_id, l.count)).collect();

    Ok(rows
        .into_iter()
        .map(|message| HistoryEntry {
            likes: likes.get(&message.id).copied().unwrap_or(0),
            comments: comments.remove(&message.id).unwrap_or_default(),
            message,
        })
        .collect())
}
