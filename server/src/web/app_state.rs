use sqlx::SqlitePool;

use crate::hub::HubHandle;

/// Shared state handed to every request handler.
pub struct AppState {
    pub hub: HubHandle,
    pub db: SqlitePool,
}
