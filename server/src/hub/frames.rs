use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::models::CommentRow;
use crate::db::queries::messages::HistoryEntry;

/// Inbound frame from a connected client. Decoded once at the WebSocket
/// boundary; frames that fail to parse (malformed structure or unknown
/// `type`) are silently dropped there.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Claim an identity for this connection.
    Join {
        #[serde(default)]
        user: Option<String>,
    },

    /// Request the primary broadcaster role.
    Broadcaster,

    /// Start an audio-only broadcast (not gated by the approval slot).
    MicBroadcaster,

    /// Stop broadcasting.
    EndBroadcast,

    /// Ask the host `id` to co-host (video). Gated by the single guest slot.
    JoinRequest { id: String },

    /// Ask the host `id` to co-host (audio only). Not slot-gated.
    MicRequest { id: String },

    /// Host invites all of its current listeners to come on stage.
    Invite {
        #[serde(default)]
        mode: Option<String>,
    },

    /// Host approves a pending video co-host request.
    ApproveJoin { id: String },

    /// Host approves a pending mic request.
    ApproveMic { id: String },

    /// Host denies a pending video co-host request.
    DenyJoin { id: String },

    /// Host denies a pending mic request.
    DenyMic { id: String },

    /// Start watching the broadcaster `id`.
    Watcher { id: String },

    /// Stop watching the broadcaster `id`.
    Unwatcher { id: String },

    /// Broadcaster publishes a stream thumbnail.
    Thumb { thumb: String },

    /// Broadcaster publishes a live caption to its listeners.
    Caption { text: String },

    /// Comment on a stored chat message.
    #[serde(rename_all = "camelCase")]
    Comment {
        message_id: i64,
        #[serde(default)]
        user: Option<String>,
        text: String,
    },

    /// Like a stored chat message.
    #[serde(rename_all = "camelCase")]
    Like {
        message_id: i64,
        #[serde(default)]
        user: Option<String>,
    },

    /// WebRTC offer addressed to connection `id`.
    Offer {
        id: String,
        #[serde(default)]
        sdp: Option<Value>,
        #[serde(default)]
        candidate: Option<Value>,
    },

    /// WebRTC answer addressed to connection `id`.
    Answer {
        id: String,
        #[serde(default)]
        sdp: Option<Value>,
        #[serde(default)]
        candidate: Option<Value>,
    },

    /// ICE candidate addressed to connection `id`.
    Candidate {
        id: String,
        #[serde(default)]
        sdp: Option<Value>,
        #[serde(default)]
        candidate: Option<Value>,
    },

    /// Teardown notice addressed to connection `id`.
    Bye {
        id: String,
        #[serde(default)]
        sdp: Option<Value>,
        #[serde(default)]
        candidate: Option<Value>,
    },

    /// Post a chat message (global feed or room-scoped).
    #[serde(rename_all = "camelCase")]
    Chat {
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        room: Option<String>,
        #[serde(default)]
        text: Option<String>,
        /// Legacy field name accepted alongside `text`.
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        image: Option<String>,
        #[serde(default)]
        file: Option<String>,
        #[serde(default, alias = "file_name")]
        file_name: Option<String>,
        #[serde(default, alias = "file_type")]
        file_type: Option<String>,
        #[serde(default)]
        ts: Option<i64>,
        /// Delete the message after this many milliseconds.
        #[serde(default)]
        self_destruct: Option<u64>,
    },
}

/// Outbound event pushed to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HubEvent {
    /// Greeting sent first on connect.
    System { text: String },

    /// The connection's assigned id.
    Id { id: String },

    /// Message history replay (global on connect, room-scoped on watch).
    History { messages: Vec<ChatPayload> },

    /// Full presence snapshot, pushed to everyone on membership change.
    Users {
        users: Vec<PresenceEntry>,
        count: usize,
    },

    /// Current listener count for one host, pushed to everyone.
    Listeners { id: String, count: usize },

    /// A broadcaster went away.
    Bye { id: String },

    /// A stored chat message, fanned out to its audience.
    Chat(ChatPayload),

    Thumb { id: String, thumb: String },

    Caption { id: String, text: String },

    #[serde(rename_all = "camelCase")]
    Comment {
        id: i64,
        message_id: i64,
        user: String,
        text: String,
        ts: i64,
    },

    /// Like-count refresh for one message.
    #[serde(rename_all = "camelCase")]
    Like { message_id: i64, count: i64 },

    /// Co-host request forwarded to the host.
    JoinRequest { id: String, user: String },

    /// Mic request forwarded to the host.
    MicRequest { id: String, user: String },

    JoinApproved,

    JoinDenied,

    MicApproved,

    MicDenied,

    /// Host (or newly-broadcasting approved guest) invites listeners.
    Invite {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
        user: String,
    },

    /// A new watcher arrived, delivered to the host.
    Watcher { id: String },

    /// Relayed WebRTC offer; `id` is the sender.
    Offer {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        candidate: Option<Value>,
    },

    /// Relayed WebRTC answer; `id` is the sender.
    Answer {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        candidate: Option<Value>,
    },

    /// Relayed ICE candidate; `id` is the sender.
    Candidate {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        candidate: Option<Value>,
    },

    /// A message was deleted (broadcast to everyone).
    Delete { id: i64 },

    /// Self-destruct receipt, sent only to the author's connections.
    SelfDestruct { id: i64 },
}

/// One entry in the presence snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub name: String,
    pub id: String,
    pub live: bool,
    pub mic: bool,
    pub profile_pic: Option<String>,
}

/// A chat message as delivered on the wire: the stored row plus derived
/// like/comment state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub id: i64,
    pub user: String,
    pub profile_pic: Option<String>,
    pub room: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    pub ts: i64,
    pub likes: i64,
    pub comments: Vec<CommentPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    pub id: i64,
    pub user: String,
    pub text: String,
    pub ts: i64,
}

impl From<CommentRow> for CommentPayload {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            user: row.user,
            text: row.text,
            ts: row.ts,
        }
    }
}

impl From<HistoryEntry> for ChatPayload {
    fn from(entry: HistoryEntry) -> Self {
        let m = entry.message;
        Self {
            id: m.id,
            user: m.user,
            profile_pic: m.profile_pic,
            room: m.room,
            text: m.message,
            image: m.image,
            file: m.file,
            file_name: m.file_name,
            file_type: m.file_type,
            ts: m.ts,
            likes: entry.likes,
            comments: entry.comments.into_iter().map(Into::into).collect(),
        }
    }
}
