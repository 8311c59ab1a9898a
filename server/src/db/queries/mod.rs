pub mod comments;
pub mod likes;
pub mod messages;
pub mod notifications;
pub mod users;
