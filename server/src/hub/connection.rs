use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::mpsc;

use super::frames::HubEvent;

/// Maximum queued outbound events per connection (prevents memory exhaustion
/// from slow clients).
pub const MAX_OUTBOUND_QUEUE: usize = 1024;

/// Length of generated connection ids.
const CONN_ID_LEN: usize = 7;

/// Opaque connection identifier, unique for the connection lifetime.
pub type ConnId = String;

/// Generate a short random connection id.
pub fn generate_conn_id() -> ConnId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CONN_ID_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

/// A connected client as seen by the hub: identity plus the outbound queue
/// to its write loop.
#[derive(Debug)]
pub struct ConnHandle {
    pub id: ConnId,
    /// Claimed username; empty until a `join` frame arrives. Never verified.
    pub username: String,
    /// Profile picture cached from the user directory at `join` time.
    pub profile_pic: Option<String>,
    outbound: mpsc::Sender<HubEvent>,
}

impl ConnHandle {
    pub fn new(id: ConnId, outbound: mpsc::Sender<HubEvent>) -> Self {
        Self {
            id,
            username: String::new(),
            profile_pic: None,
            outbound,
        }
    }

    /// True once the client has claimed a (non-empty) identity.
    pub fn has_identity(&self) -> bool {
        !self.username.is_empty()
    }

    /// Send an event to this connection. Fire-and-forget: returns false if
    /// the write loop is gone or its queue is full, and never blocks the hub.
    pub fn send(&self, event: HubEvent) -> bool {
        self.outbound.try_send(event).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_short_and_lowercase() {
        for _ in 0..64 {
            let id = generate_conn_id();
            assert_eq!(id.len(), CONN_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(!id.chars().any(|c| c.is_ascii_uppercase()));
        }
    }

    #[tokio::test]
    async fn test_send_is_fire_and_forget() {
        let (tx, mut rx) = mpsc::channel(2);
        let conn = ConnHandle::new(generate_conn_id(), tx);

        assert!(conn.send(HubEvent::JoinDenied));
        assert!(conn.send(HubEvent::JoinDenied));
        // queue full: dropped, not blocked
        assert!(!conn.send(HubEvent::JoinDenied));

        rx.recv().await.unwrap();
        drop(rx);
        // receiver gone: dropped
        assert!(!conn.send(HubEvent::JoinDenied));
    }
}
