use tokio::sync::{mpsc, oneshot};

use super::connection::ConnId;
use super::frames::{ClientFrame, HubEvent};

/// Commands submitted to the hub actor. All hub state is owned by one task;
/// WebSocket read loops and deferred timers talk to it only through these.
#[derive(Debug)]
pub enum HubCommand {
    /// A new client connected; `outbound` feeds its write loop.
    Connect {
        outbound: mpsc::Sender<HubEvent>,
        reply: oneshot::Sender<ConnId>,
    },

    /// A decoded frame from a connected client.
    Frame { conn_id: ConnId, frame: ClientFrame },

    /// The client's socket closed.
    Disconnect { conn_id: ConnId },

    /// A self-destruct timer fired for a stored message.
    SelfDestruct { message_id: i64, author: String },
}
