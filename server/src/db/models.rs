use sqlx::FromRow;

/// A stored chat message, joined with the author's profile picture.
/// `ts` is Unix milliseconds (derived from the stored timestamp).
#[derive(Debug, Clone, FromRow)]
pub struct ChatMessageRow {
    pub id: i64,
    pub user: String,
    pub profile_pic: Option<String>,
    pub room: Option<String>,
    pub message: String,
    pub image: Option<String>,
    pub file: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub ts: i64,
}

/// A stored comment on a chat message.
#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub message_id: i64,
    pub user: String,
    pub text: String,
    pub ts: i64,
}

/// Per-message like tally used when assembling history.
#[derive(Debug, Clone, FromRow)]
pub struct LikeCountRow {
    pub message_id: i64,
    pub count: i64,
}
