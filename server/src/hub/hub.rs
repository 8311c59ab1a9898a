use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::db::queries::{comments, likes, messages, notifications, users};

use super::commands::HubCommand;
use super::connection::{ConnHandle, ConnId, MAX_OUTBOUND_QUEUE, generate_conn_id};
use super::frames::{ChatPayload, ClientFrame, HubEvent, PresenceEntry};
use super::listeners::ListenerGraph;

/// Greeting sent as the very first frame on every new connection.
const GREETING: &str = "Connected to Stagecast";

/// Attachment size ceilings for inbound chat frames. Sized above the raw
/// byte targets because data URLs inflate ~33% over the original binary.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentLimits {
    pub max_image_bytes: usize,
    pub max_file_bytes: usize,
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: 20_000_000, // ~15MB images
            max_file_bytes: 50_000_000,  // ~35MB files
        }
    }
}

/// Cloneable handle for submitting commands to the hub actor.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Register a new connection. Returns its assigned id, or None if the
    /// hub actor has shut down.
    pub async fn connect(&self, outbound: mpsc::Sender<HubEvent>) -> Option<ConnId> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(HubCommand::Connect { outbound, reply }).ok()?;
        rx.await.ok()
    }

    /// Submit a decoded client frame.
    pub fn frame(&self, conn_id: ConnId, frame: ClientFrame) {
        let _ = self.tx.send(HubCommand::Frame { conn_id, frame });
    }

    /// Report a closed connection.
    pub fn disconnect(&self, conn_id: ConnId) {
        let _ = self.tx.send(HubCommand::Disconnect { conn_id });
    }
}

/// The realtime connection hub: one actor owning every mutable map, fed by
/// a command channel so event handling is fully serialized.
pub struct Hub {
    connections: HashMap<ConnId, ConnHandle>,
    /// Connections currently broadcasting (video or audio-only).
    broadcasters: HashSet<ConnId>,
    /// Subset of broadcasters streaming audio only.
    mic_guests: HashSet<ConnId>,
    /// The single system-wide approved video co-host, if any.
    approved_guest: Option<ConnId>,
    /// guest id -> host id, recorded when a join is approved.
    guest_hosts: HashMap<ConnId, ConnId>,
    /// Latest thumbnail per broadcaster, replayed to new connections.
    thumbnails: HashMap<ConnId, String>,
    listeners: ListenerGraph,
    db: SqlitePool,
    limits: AttachmentLimits,
    rx: mpsc::UnboundedReceiver<HubCommand>,
    /// Kept so deferred timers can re-enter the command queue.
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl Hub {
    pub fn new(db: SqlitePool, limits: AttachmentLimits) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            connections: HashMap::new(),
            broadcasters: HashSet::new(),
            mic_guests: HashSet::new(),
            approved_guest: None,
            guest_hosts: HashMap::new(),
            thumbnails: HashMap::new(),
            listeners: ListenerGraph::new(),
            db,
            limits,
            rx,
            tx: tx.clone(),
        };
        (hub, HubHandle { tx })
    }

    /// Run the actor loop until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            self.dispatch(cmd).await;
        }
        info!("hub actor stopped");
    }

    pub(crate) async fn dispatch(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { outbound, reply } => {
                let conn_id = self.handle_connect(outbound).await;
                let _ = reply.send(conn_id);
            }
            HubCommand::Frame { conn_id, frame } => self.handle_frame(conn_id, frame).await,
            HubCommand::Disconnect { conn_id } => self.handle_disconnect(conn_id),
            HubCommand::SelfDestruct { message_id, author } => {
                self.handle_self_destruct(message_id, &author).await
            }
        }
    }

    // ── Connection lifecycle ────────────────────────────────────────

    async fn handle_connect(&mut self, outbound: mpsc::Sender<HubEvent>) -> ConnId {
        let mut conn_id = generate_conn_id();
        while self.connections.contains_key(&conn_id) {
            conn_id = generate_conn_id();
        }

        let conn = ConnHandle::new(conn_id.clone(), outbound);
        conn.send(HubEvent::System {
            text: GREETING.to_string(),
        });
        conn.send(HubEvent::Id {
            id: conn_id.clone(),
        });
        match messages::load_history(&self.db, None).await {
            Ok(history) => {
                conn.send(HubEvent::History {
                    messages: history.into_iter().map(Into::into).collect(),
                });
            }
            Err(e) => error!(error = %e, "failed to load global history"),
        }
        for (id, thumb) in &self.thumbnails {
            conn.send(HubEvent::Thumb {
                id: id.clone(),
                thumb: thumb.clone(),
            });
        }

        self.connections.insert(conn_id.clone(), conn);
        info!(%conn_id, "connection registered");
        self.publish_presence();
        conn_id
    }

    fn handle_disconnect(&mut self, conn_id: ConnId) {
        if self.connections.remove(&conn_id).is_none() {
            return;
        }

        let was_broadcaster = self.broadcasters.remove(&conn_id);
        if was_broadcaster {
            self.mic_guests.remove(&conn_id);
            self.broadcast(HubEvent::Bye {
                id: conn_id.clone(),
            });
            if self.broadcasters.len() < 2 {
                self.approved_guest = None;
            }
            if self.listeners.remove_host(&conn_id) {
                self.publish_listener_count(&conn_id);
            }
            self.thumbnails.remove(&conn_id);
        }
        if self.approved_guest.as_ref() == Some(&conn_id) {
            self.approved_guest = None;
        }

        for host in self.listeners.remove_watcher(&conn_id) {
            self.publish_listener_count(&host);
        }

        // Drop guest-host associations on either side
        self.guest_hosts
            .retain(|guest, host| guest != &conn_id && host != &conn_id);

        info!(%conn_id, "connection removed");
        self.publish_presence();
    }

    // ── Frame dispatch ──────────────────────────────────────────────

    async fn handle_frame(&mut self, conn_id: ConnId, frame: ClientFrame) {
        if !self.connections.contains_key(&conn_id) {
            return;
        }
        match frame {
            ClientFrame::Join { user } => self.set_identity(&conn_id, user.unwrap_or_default()).await,
            ClientFrame::Broadcaster => self.request_broadcast(&conn_id),
            ClientFrame::MicBroadcaster => self.request_mic_broadcast(&conn_id),
            ClientFrame::EndBroadcast => self.end_broadcast(&conn_id),
            ClientFrame::JoinRequest { id } => self.request_join(&conn_id, &id).await,
            ClientFrame::MicRequest { id } => self.request_mic(&conn_id, &id).await,
            ClientFrame::Invite { mode } => self.invite_listeners(&conn_id, mode),
            ClientFrame::ApproveJoin { id } => self.approve_join(&conn_id, &id),
            ClientFrame::ApproveMic { id } => self.approve_mic(&conn_id, &id),
            ClientFrame::DenyJoin { id } => self.send_to(&id, HubEvent::JoinDenied),
            ClientFrame::DenyMic { id } => self.send_to(&id, HubEvent::MicDenied),
            ClientFrame::Watcher { id } => self.watch(&conn_id, &id).await,
            ClientFrame::Unwatcher { id } => self.unwatch(&conn_id, &id),
            ClientFrame::Thumb { thumb } => self.publish_thumbnail(&conn_id, thumb),
            ClientFrame::Caption { text } => self.publish_caption(&conn_id, text),
            ClientFrame::Comment {
                message_id,
                user,
                text,
            } => self.post_comment(message_id, user.unwrap_or_default(), text).await,
            ClientFrame::Like { message_id, user } => {
                self.post_like(message_id, user.unwrap_or_default()).await
            }
            ClientFrame::Offer { id, sdp, candidate } => {
                self.relay_signal(&conn_id, &id, SignalKind::Offer, sdp, candidate)
            }
            ClientFrame::Answer { id, sdp, candidate } => {
                self.relay_signal(&conn_id, &id, SignalKind::Answer, sdp, candidate)
            }
            ClientFrame::Candidate { id, sdp, candidate } => {
                self.relay_signal(&conn_id, &id, SignalKind::Candidate, sdp, candidate)
            }
            ClientFrame::Bye { id, .. } => {
                self.send_to(&id, HubEvent::Bye { id: conn_id })
            }
            ClientFrame::Chat {
                user,
                room,
                text,
                message,
                image,
                file,
                file_name,
                file_type,
                ts,
                self_destruct,
            } => {
                self.post_chat(
                    &conn_id,
                    ChatSubmission {
                        user: user.unwrap_or_default(),
                        room,
                        text: text.or(message).unwrap_or_default(),
                        image,
                        file,
                        file_name,
                        file_type,
                        ts,
                        self_destruct,
                    },
                )
                .await
            }
        }
    }

    // ── Connection registry ─────────────────────────────────────────

    async fn set_identity(&mut self, conn_id: &ConnId, username: String) {
        // Missing user directory entry is not an error; the picture stays unset.
        let profile_pic = match users::get_profile_pic(&self.db, &username).await {
            Ok(pic) => pic,
            Err(e) => {
                error!(error = %e, %username, "profile picture lookup failed");
                None
            }
        };
        if let Some(conn) = self.connections.get_mut(conn_id) {
            conn.username = username;
            conn.profile_pic = profile_pic;
        }
        self.publish_presence();
    }

    // ── Broadcast directory ─────────────────────────────────────────

    fn request_broadcast(&mut self, conn_id: &ConnId) {
        if !self.broadcasters.is_empty() && self.approved_guest.as_ref() != Some(conn_id) {
            self.send_to(conn_id, HubEvent::JoinDenied);
            return;
        }
        self.broadcasters.insert(conn_id.clone());
        info!(%conn_id, "broadcast started");
        self.invite_host_listeners_of_guest(conn_id);
        self.publish_presence();
    }

    fn request_mic_broadcast(&mut self, conn_id: &ConnId) {
        self.broadcasters.insert(conn_id.clone());
        self.mic_guests.insert(conn_id.clone());
        info!(%conn_id, "mic broadcast started");
        self.invite_host_listeners_of_guest(conn_id);
        self.publish_presence();
    }

    /// An approved guest that starts its own broadcast pulls its host's
    /// current listeners over with an invite.
    fn invite_host_listeners_of_guest(&self, guest_id: &ConnId) {
        let Some(host_id) = self.guest_hosts.get(guest_id) else {
            return;
        };
        let user = self.username_of(guest_id);
        for watcher in self.listeners.listeners(host_id) {
            self.send_to(
                &watcher,
                HubEvent::Invite {
                    id: guest_id.clone(),
                    mode: None,
                    user: user.clone(),
                },
            );
        }
    }

    fn end_broadcast(&mut self, conn_id: &ConnId) {
        if !self.broadcasters.remove(conn_id) {
            return;
        }
        for (id, conn) in &self.connections {
            if id != conn_id {
                conn.send(HubEvent::Bye {
                    id: conn_id.clone(),
                });
            }
        }
        self.mic_guests.remove(conn_id);
        self.thumbnails.remove(conn_id);
        // A lone remaining broadcaster no longer needs an approval gate.
        if self.approved_guest.as_ref() == Some(conn_id) || self.broadcasters.len() < 2 {
            self.approved_guest = None;
        }
        if self.listeners.remove_host(conn_id) {
            self.publish_listener_count(conn_id);
        }
        info!(%conn_id, "broadcast ended");
        self.publish_presence();
    }

    async fn request_join(&mut self, conn_id: &ConnId, host_id: &ConnId) {
        // Only one pending/approved video co-host hub-wide.
        if self.approved_guest.is_some() {
            self.send_to(conn_id, HubEvent::JoinDenied);
            return;
        }
        if !self.broadcasters.contains(host_id) || !self.connections.contains_key(host_id) {
            self.send_to(conn_id, HubEvent::JoinDenied);
            return;
        }
        let user = self.username_of(conn_id);
        self.send_to(
            host_id,
            HubEvent::JoinRequest {
                id: conn_id.clone(),
                user: user.clone(),
            },
        );
        self.record_broadcast_request(host_id, &user, "join").await;
    }

    async fn request_mic(&mut self, conn_id: &ConnId, host_id: &ConnId) {
        // Unlike join-request, an unreachable host is silently dropped and
        // there is no slot to contend for.
        if !self.broadcasters.contains(host_id) || !self.connections.contains_key(host_id) {
            return;
        }
        let user = self.username_of(conn_id);
        self.send_to(
            host_id,
            HubEvent::MicRequest {
                id: conn_id.clone(),
                user: user.clone(),
            },
        );
        self.record_broadcast_request(host_id, &user, "mic").await;
    }

    async fn record_broadcast_request(&self, host_id: &ConnId, from: &str, mode: &str) {
        let host_user = self.username_of(host_id);
        if let Err(e) = notifications::append_notification(
            &self.db,
            &host_user,
            "broadcast",
            &serde_json::json!({ "from": from, "mode": mode }),
        )
        .await
        {
            error!(error = %e, "failed to record broadcast request notification");
        }
    }

    fn invite_listeners(&self, conn_id: &ConnId, mode: Option<String>) {
        let user = self.username_of(conn_id);
        for watcher in self.listeners.listeners(conn_id) {
            self.send_to(
                &watcher,
                HubEvent::Invite {
                    id: conn_id.clone(),
                    mode: mode.clone(),
                    user: user.clone(),
                },
            );
        }
    }

    fn approve_join(&mut self, conn_id: &ConnId, guest_id: &ConnId) {
        if self.approved_guest.is_some() {
            return;
        }
        if !self.connections.contains_key(guest_id) || !self.broadcasters.contains(conn_id) {
            return;
        }
        self.approved_guest = Some(guest_id.clone());
        self.guest_hosts
            .insert(guest_id.clone(), conn_id.clone());
        info!(guest = %guest_id, host = %conn_id, "co-host approved");
        self.send_to(guest_id, HubEvent::JoinApproved);
    }

    fn approve_mic(&self, conn_id: &ConnId, guest_id: &ConnId) {
        if !self.connections.contains_key(guest_id) || !self.broadcasters.contains(conn_id) {
            return;
        }
        self.send_to(guest_id, HubEvent::MicApproved);
    }

    // ── Listener graph ──────────────────────────────────────────────

    async fn watch(&mut self, conn_id: &ConnId, host_id: &ConnId) {
        if !self.broadcasters.contains(host_id) || !self.connections.contains_key(host_id) {
            return;
        }
        self.send_to(
            host_id,
            HubEvent::Watcher {
                id: conn_id.clone(),
            },
        );
        self.listeners.watch(host_id, conn_id);
        self.publish_listener_count(host_id);

        match messages::load_history(&self.db, Some(host_id)).await {
            Ok(history) if !history.is_empty() => {
                self.send_to(
                    conn_id,
                    HubEvent::History {
                        messages: history.into_iter().map(Into::into).collect(),
                    },
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "failed to load room history"),
        }
    }

    fn unwatch(&mut self, conn_id: &ConnId, host_id: &ConnId) {
        if self.listeners.unwatch(host_id, conn_id) {
            self.publish_listener_count(host_id);
        }
    }

    // ── Stream metadata ─────────────────────────────────────────────

    fn publish_thumbnail(&mut self, conn_id: &ConnId, thumb: String) {
        self.thumbnails.insert(conn_id.clone(), thumb.clone());
        self.broadcast(HubEvent::Thumb {
            id: conn_id.clone(),
            thumb,
        });
    }

    fn publish_caption(&self, conn_id: &ConnId, text: String) {
        if text.is_empty() {
            return;
        }
        for watcher in self.listeners.listeners(conn_id) {
            self.send_to(
                &watcher,
                HubEvent::Caption {
                    id: conn_id.clone(),
                    text: text.clone(),
                },
            );
        }
    }

    // ── Signaling relay ─────────────────────────────────────────────

    fn relay_signal(
        &self,
        sender: &ConnId,
        dest: &ConnId,
        kind: SignalKind,
        sdp: Option<Value>,
        candidate: Option<Value>,
    ) {
        // Fire-and-forget: an unreachable destination drops the message
        // without informing the sender.
        let Some(dest) = self.connections.get(dest) else {
            return;
        };
        let id = sender.clone();
        let event = match kind {
            SignalKind::Offer => HubEvent::Offer { id, sdp, candidate },
            SignalKind::Answer => HubEvent::Answer { id, sdp, candidate },
            SignalKind::Candidate => HubEvent::Candidate { id, sdp, candidate },
        };
        dest.send(event);
    }

    // ── Message store & fanout ──────────────────────────────────────

    async fn post_chat(&mut self, conn_id: &ConnId, msg: ChatSubmission) {
        if msg.image.as_ref().is_some_and(|i| i.len() > self.limits.max_image_bytes) {
            warn!(%conn_id, "dropping chat with oversized image");
            return;
        }
        if msg.file.as_ref().is_some_and(|f| f.len() > self.limits.max_file_bytes) {
            warn!(%conn_id, "dropping chat with oversized file");
            return;
        }

        let ts = msg.ts.unwrap_or_else(|| Utc::now().timestamp_millis());
        let profile_pic = match users::get_profile_pic(&self.db, &msg.user).await {
            Ok(pic) => pic,
            Err(e) => {
                error!(error = %e, "profile picture lookup failed");
                None
            }
        };

        // A failed insert assigns no id and triggers no fanout.
        let id = match messages::insert_message(
            &self.db,
            &msg.user,
            msg.room.as_deref(),
            &msg.text,
            msg.image.as_deref(),
            msg.file.as_deref(),
            msg.file_name.as_deref(),
            msg.file_type.as_deref(),
        )
        .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "failed to persist chat message");
                return;
            }
        };

        let payload = ChatPayload {
            id,
            user: msg.user.clone(),
            profile_pic,
            room: msg.room.clone(),
            text: msg.text,
            image: msg.image,
            file: msg.file,
            file_name: msg.file_name,
            file_type: msg.file_type,
            ts,
            likes: 0,
            comments: Vec::new(),
        };

        match &msg.room {
            Some(room) => {
                // Point-to-point set: room host, room listeners, the sender.
                let mut audience: HashSet<ConnId> = HashSet::new();
                if self.broadcasters.contains(room) && self.connections.contains_key(room) {
                    audience.insert(room.clone());
                }
                audience.extend(self.listeners.listeners(room));
                audience.insert(conn_id.clone());
                for target in audience {
                    self.send_to(&target, HubEvent::Chat(payload.clone()));
                }
            }
            None => {
                // Global feed: everyone not currently inside a room.
                for (id, conn) in &self.connections {
                    if !self.listeners.is_watching_any(id) {
                        conn.send(HubEvent::Chat(payload.clone()));
                    }
                }
            }
        }

        if let Some(delay) = msg.self_destruct.filter(|d| *d > 0) {
            let tx = self.tx.clone();
            let author = msg.user;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                // Re-enter the serialized actor; never touch hub state here.
                let _ = tx.send(HubCommand::SelfDestruct {
                    message_id: id,
                    author,
                });
            });
        }
    }

    async fn handle_self_destruct(&mut self, message_id: i64, author: &str) {
        // Idempotent: the row (or its author's connections) may already be gone.
        if let Err(e) = messages::delete_message(&self.db, message_id).await {
            error!(error = %e, message_id, "self-destruct deletion failed");
            return;
        }
        self.broadcast(HubEvent::Delete { id: message_id });
        for conn in self.connections.values() {
            if conn.username == author {
                conn.send(HubEvent::SelfDestruct { id: message_id });
            }
        }
        info!(message_id, "message self-destructed");
    }

    async fn post_comment(&self, message_id: i64, user: String, text: String) {
        if message_id == 0 || text.is_empty() {
            return;
        }
        let id = match comments::insert_comment(&self.db, message_id, &user, &text).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "failed to persist comment");
                return;
            }
        };
        self.broadcast(HubEvent::Comment {
            id,
            message_id,
            user,
            text,
            ts: Utc::now().timestamp_millis(),
        });
    }

    async fn post_like(&self, message_id: i64, user: String) {
        if message_id == 0 {
            return;
        }
        match likes::insert_like(&self.db, message_id, &user).await {
            Ok(true) => {
                // First-time like: notify the author, unless self-like.
                match messages::get_author(&self.db, message_id).await {
                    Ok(Some(author)) if !author.is_empty() && author != user => {
                        if let Err(e) = notifications::append_notification(
                            &self.db,
                            &author,
                            "like",
                            &serde_json::json!({ "from": user, "messageId": message_id }),
                        )
                        .await
                        {
                            error!(error = %e, "failed to record like notification");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "failed to look up message author"),
                }
            }
            Ok(false) => {} // duplicate: count unchanged, still refresh below
            Err(e) => {
                error!(error = %e, "failed to persist like");
                return;
            }
        }
        // Always rebroadcast the authoritative count so clients cannot drift.
        match likes::count_likes(&self.db, message_id).await {
            Ok(count) => self.broadcast(HubEvent::Like { message_id, count }),
            Err(e) => error!(error = %e, "failed to count likes"),
        }
    }

    // ── Presence publisher ──────────────────────────────────────────

    /// Push the full presence snapshot to every connection.
    fn publish_presence(&self) {
        let users: Vec<PresenceEntry> = self
            .connections
            .values()
            .filter(|conn| conn.has_identity())
            .map(|conn| PresenceEntry {
                name: conn.username.clone(),
                id: conn.id.clone(),
                live: self.broadcasters.contains(&conn.id),
                mic: self.mic_guests.contains(&conn.id),
                profile_pic: conn.profile_pic.clone(),
            })
            .collect();
        let count = users.len();
        self.broadcast(HubEvent::Users { users, count });
    }

    /// Push one host's current listener count to every connection.
    fn publish_listener_count(&self, host_id: &ConnId) {
        self.broadcast(HubEvent::Listeners {
            id: host_id.clone(),
            count: self.listeners.listener_count(host_id),
        });
    }

    // ── Utility ─────────────────────────────────────────────────────

    fn username_of(&self, conn_id: &ConnId) -> String {
        self.connections
            .get(conn_id)
            .map(|c| c.username.clone())
            .unwrap_or_default()
    }

    fn send_to(&self, conn_id: &ConnId, event: HubEvent) {
        if let Some(conn) = self.connections.get(conn_id) {
            if !conn.send(event) {
                warn!(%conn_id, "dropped event for slow or closed connection");
            }
        }
    }

    fn broadcast(&self, event: HubEvent) {
        for conn in self.connections.values() {
            conn.send(event.clone());
        }
    }
}

enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

/// Normalized fields of an inbound chat frame.
struct ChatSubmission {
    user: String,
    room: Option<String>,
    text: String,
    image: Option<String>,
    file: Option<String>,
    file_name: Option<String>,
    file_type: Option<String>,
    ts: Option<i64>,
    self_destruct: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};

    async fn setup_hub() -> Hub {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        Hub::new(pool, AttachmentLimits::default()).0
    }

    /// Register a connection directly against the hub, returning its id and
    /// event receiver drained of the connect-time frames.
    async fn connect(hub: &mut Hub) -> (ConnId, mpsc::Receiver<HubEvent>) {
        let (tx, mut rx) = mpsc::channel(MAX_OUTBOUND_QUEUE);
        let id = hub.handle_connect(tx).await;
        while rx.try_recv().is_ok() {}
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<HubEvent>) -> Vec<HubEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_connect_sends_greeting_id_history_in_order() {
        let mut hub = setup_hub().await;
        let (tx, mut rx) = mpsc::channel(MAX_OUTBOUND_QUEUE);
        let id = hub.handle_connect(tx).await;

        match rx.try_recv().unwrap() {
            HubEvent::System { text } => assert_eq!(text, GREETING),
            other => panic!("expected greeting first, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            HubEvent::Id { id: sent } => assert_eq!(sent, id),
            other => panic!("expected id second, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            HubEvent::History { messages } => assert!(messages.is_empty()),
            other => panic!("expected history third, got {other:?}"),
        }
        // presence snapshot follows (no identities yet, still pushed)
        match rx.try_recv().unwrap() {
            HubEvent::Users { users, count } => {
                assert!(users.is_empty());
                assert_eq!(count, 0);
            }
            other => panic!("expected presence, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_thumbnails_replayed_to_new_connections() {
        let mut hub = setup_hub().await;
        let (host, _rx) = connect(&mut hub).await;
        hub.handle_frame(host.clone(), ClientFrame::Broadcaster).await;
        hub.handle_frame(
            host.clone(),
            ClientFrame::Thumb {
                thumb: "data:image/jpeg;base64,xyz".into(),
            },
        )
        .await;

        let (tx, mut rx) = mpsc::channel(MAX_OUTBOUND_QUEUE);
        hub.handle_connect(tx).await;
        let thumbs: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, HubEvent::Thumb { .. }))
            .collect();
        assert_eq!(thumbs.len(), 1);
        match &thumbs[0] {
            HubEvent::Thumb { id, thumb } => {
                assert_eq!(id, &host);
                assert_eq!(thumb, "data:image/jpeg;base64,xyz");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_second_broadcaster_denied_unless_approved_guest() {
        let mut hub = setup_hub().await;
        let (a, _rx_a) = connect(&mut hub).await;
        let (b, mut rx_b) = connect(&mut hub).await;

        hub.handle_frame(a.clone(), ClientFrame::Broadcaster).await;
        assert!(hub.broadcasters.contains(&a));

        drain(&mut rx_b);
        hub.handle_frame(b.clone(), ClientFrame::Broadcaster).await;
        assert!(!hub.broadcasters.contains(&b));
        assert!(drain(&mut rx_b).contains(&HubEvent::JoinDenied));

        // approve b, then it may broadcast
        hub.handle_frame(a.clone(), ClientFrame::ApproveJoin { id: b.clone() }).await;
        hub.handle_frame(b.clone(), ClientFrame::Broadcaster).await;
        assert!(hub.broadcasters.contains(&b));
    }

    #[tokio::test]
    async fn test_single_guest_slot_hub_wide() {
        let mut hub = setup_hub().await;
        let (host, _rx_h) = connect(&mut hub).await;
        let (b, mut rx_b) = connect(&mut hub).await;
        let (c, mut rx_c) = connect(&mut hub).await;
        hub.handle_frame(host.clone(), ClientFrame::Broadcaster).await;

        drain(&mut rx_b);
        hub.handle_frame(b.clone(), ClientFrame::JoinRequest { id: host.clone() }).await;
        hub.handle_frame(host.clone(), ClientFrame::ApproveJoin { id: b.clone() }).await;
        assert!(drain(&mut rx_b).contains(&HubEvent::JoinApproved));
        assert_eq!(hub.approved_guest, Some(b.clone()));

        // second request while the slot is taken is always denied
        drain(&mut rx_c);
        hub.handle_frame(c.clone(), ClientFrame::JoinRequest { id: host.clone() }).await;
        assert!(drain(&mut rx_c).contains(&HubEvent::JoinDenied));

        // approving a second guest is a no-op
        hub.handle_frame(host.clone(), ClientFrame::ApproveJoin { id: c.clone() }).await;
        assert_eq!(hub.approved_guest, Some(b));
    }

    #[tokio::test]
    async fn test_mic_flow_ignores_guest_slot() {
        let mut hub = setup_hub().await;
        let (host, mut rx_h) = connect(&mut hub).await;
        let (b, mut rx_b) = connect(&mut hub).await;
        let (c, mut rx_c) = connect(&mut hub).await;
        hub.handle_frame(host.clone(), ClientFrame::Broadcaster).await;
        hub.handle_frame(host.clone(), ClientFrame::ApproveJoin { id: b.clone() }).await;

        // slot occupied by b, but mic requests still flow
        drain(&mut rx_h);
        drain(&mut rx_c);
        hub.handle_frame(c.clone(), ClientFrame::MicRequest { id: host.clone() }).await;
        assert!(
            drain(&mut rx_h)
                .iter()
                .any(|e| matches!(e, HubEvent::MicRequest { id, .. } if id == &c))
        );
        hub.handle_frame(host.clone(), ClientFrame::ApproveMic { id: c.clone() }).await;
        assert!(drain(&mut rx_c).contains(&HubEvent::MicApproved));

        // and mic-broadcaster always succeeds
        drain(&mut rx_b);
        hub.handle_frame(c.clone(), ClientFrame::MicBroadcaster).await;
        assert!(hub.broadcasters.contains(&c));
        assert!(hub.mic_guests.contains(&c));
        let _ = rx_b;
    }

    #[tokio::test]
    async fn test_end_broadcast_clears_roles_and_slot() {
        let mut hub = setup_hub().await;
        let (a, _rx_a) = connect(&mut hub).await;
        let (b, _rx_b) = connect(&mut hub).await;
        let (w, mut rx_w) = connect(&mut hub).await;
        hub.handle_frame(a.clone(), ClientFrame::Broadcaster).await;
        hub.handle_frame(a.clone(), ClientFrame::ApproveJoin { id: b.clone() }).await;
        hub.handle_frame(b.clone(), ClientFrame::Broadcaster).await;
        hub.handle_frame(w.clone(), ClientFrame::Watcher { id: a.clone() }).await;
        hub.handle_frame(
            a.clone(),
            ClientFrame::Thumb {
                thumb: "t".into(),
            },
        )
        .await;

        drain(&mut rx_w);
        hub.handle_frame(a.clone(), ClientFrame::EndBroadcast).await;

        assert!(!hub.broadcasters.contains(&a));
        assert!(hub.thumbnails.is_empty());
        // one broadcaster left: the approval slot is cleared too
        assert!(hub.approved_guest.is_none());
        assert_eq!(hub.listeners.listener_count(&a), 0);

        let events = drain(&mut rx_w);
        assert!(events.iter().any(|e| matches!(e, HubEvent::Bye { id } if id == &a)));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, HubEvent::Listeners { id, count: 0 } if id == &a))
        );
    }

    #[tokio::test]
    async fn test_end_broadcast_without_role_is_noop() {
        let mut hub = setup_hub().await;
        let (a, _rx_a) = connect(&mut hub).await;
        let (b, mut rx_b) = connect(&mut hub).await;
        drain(&mut rx_b);
        hub.handle_frame(a, ClientFrame::EndBroadcast).await;
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_watch_requires_active_broadcaster() {
        let mut hub = setup_hub().await;
        let (a, _rx_a) = connect(&mut hub).await;
        let (w, mut rx_w) = connect(&mut hub).await;

        drain(&mut rx_w);
        hub.handle_frame(w.clone(), ClientFrame::Watcher { id: a.clone() }).await;
        assert_eq!(hub.listeners.listener_count(&a), 0);
        assert!(drain(&mut rx_w).is_empty());
    }

    #[tokio::test]
    async fn test_watcher_notifies_host_and_publishes_count() {
        let mut hub = setup_hub().await;
        let (host, mut rx_h) = connect(&mut hub).await;
        let (w, _rx_w) = connect(&mut hub).await;
        hub.handle_frame(host.clone(), ClientFrame::Broadcaster).await;

        drain(&mut rx_h);
        hub.handle_frame(w.clone(), ClientFrame::Watcher { id: host.clone() }).await;

        let events = drain(&mut rx_h);
        assert!(events.iter().any(|e| matches!(e, HubEvent::Watcher { id } if id == &w)));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, HubEvent::Listeners { id, count: 1 } if id == &host))
        );
    }

    #[tokio::test]
    async fn test_disconnecting_watcher_decrements_count_once() {
        let mut hub = setup_hub().await;
        let (host, mut rx_h) = connect(&mut hub).await;
        let (w, _rx_w) = connect(&mut hub).await;
        hub.handle_frame(host.clone(), ClientFrame::Broadcaster).await;
        hub.handle_frame(w.clone(), ClientFrame::Watcher { id: host.clone() }).await;
        assert_eq!(hub.listeners.listener_count(&host), 1);

        drain(&mut rx_h);
        hub.handle_disconnect(w);
        assert_eq!(hub.listeners.listener_count(&host), 0);
        let counts: Vec<_> = drain(&mut rx_h)
            .into_iter()
            .filter(|e| matches!(e, HubEvent::Listeners { .. }))
            .collect();
        assert_eq!(counts.len(), 1);
        assert!(matches!(&counts[0], HubEvent::Listeners { id, count: 0 } if id == &host));
    }

    #[tokio::test]
    async fn test_presence_lists_only_identified_connections() {
        let mut hub = setup_hub().await;
        let (a, mut rx_a) = connect(&mut hub).await;
        let (_b, _rx_b) = connect(&mut hub).await;

        hub.handle_frame(
            a.clone(),
            ClientFrame::Join {
                user: Some("alice".into()),
            },
        )
        .await;
        hub.handle_frame(a.clone(), ClientFrame::Broadcaster).await;

        let last_users = drain(&mut rx_a)
            .into_iter()
            .filter_map(|e| match e {
                HubEvent::Users { users, count } => Some((users, count)),
                _ => None,
            })
            .next_back()
            .expect("presence snapshot");
        assert_eq!(last_users.1, 1);
        assert_eq!(last_users.0[0].name, "alice");
        assert_eq!(last_users.0[0].id, a);
        assert!(last_users.0[0].live);
        assert!(!last_users.0[0].mic);
    }

    #[tokio::test]
    async fn test_signal_relay_substitutes_sender_id() {
        let mut hub = setup_hub().await;
        let (a, _rx_a) = connect(&mut hub).await;
        let (b, mut rx_b) = connect(&mut hub).await;

        drain(&mut rx_b);
        hub.handle_frame(
            a.clone(),
            ClientFrame::Offer {
                id: b.clone(),
                sdp: Some(serde_json::json!({"type": "offer", "sdp": "v=0"})),
                candidate: None,
            },
        )
        .await;

        let events = drain(&mut rx_b);
        assert_eq!(events.len(), 1);
        match &events[0] {
            HubEvent::Offer { id, sdp, candidate } => {
                assert_eq!(id, &a);
                assert!(sdp.is_some());
                assert!(candidate.is_none());
            }
            other => panic!("expected relayed offer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signal_to_unknown_destination_is_dropped() {
        let mut hub = setup_hub().await;
        let (a, mut rx_a) = connect(&mut hub).await;

        drain(&mut rx_a);
        hub.handle_frame(
            a,
            ClientFrame::Candidate {
                id: "missing".into(),
                sdp: None,
                candidate: Some(serde_json::json!({"candidate": "c"})),
            },
        )
        .await;
        // no error, no echo back to the sender
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn test_caption_reaches_listeners_only() {
        let mut hub = setup_hub().await;
        let (host, _rx_h) = connect(&mut hub).await;
        let (w, mut rx_w) = connect(&mut hub).await;
        let (other, mut rx_o) = connect(&mut hub).await;
        hub.handle_frame(host.clone(), ClientFrame::Broadcaster).await;
        hub.handle_frame(w.clone(), ClientFrame::Watcher { id: host.clone() }).await;

        drain(&mut rx_w);
        drain(&mut rx_o);
        hub.handle_frame(
            host.clone(),
            ClientFrame::Caption {
                text: "hello".into(),
            },
        )
        .await;

        assert!(
            drain(&mut rx_w)
                .iter()
                .any(|e| matches!(e, HubEvent::Caption { id, text } if id == &host && text == "hello"))
        );
        assert!(drain(&mut rx_o).is_empty());
        let _ = other;
    }

    #[tokio::test]
    async fn test_oversized_attachment_is_dropped() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let mut hub = Hub::new(
            pool,
            AttachmentLimits {
                max_image_bytes: 8,
                max_file_bytes: 16,
            },
        )
        .0;
        let (a, mut rx_a) = connect(&mut hub).await;

        drain(&mut rx_a);
        hub.handle_frame(
            a.clone(),
            ClientFrame::Chat {
                user: Some("alice".into()),
                room: None,
                text: Some("pic".into()),
                message: None,
                image: Some("123456789".into()),
                file: None,
                file_name: None,
                file_type: None,
                ts: None,
                self_destruct: None,
            },
        )
        .await;

        assert!(drain(&mut rx_a).is_empty());
        let history = messages::load_history(hub.db(), None).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_guest_broadcast_invites_host_listeners() {
        let mut hub = setup_hub().await;
        let (host, _rx_h) = connect(&mut hub).await;
        let (guest, _rx_g) = connect(&mut hub).await;
        let (w, mut rx_w) = connect(&mut hub).await;
        hub.handle_frame(host.clone(), ClientFrame::Broadcaster).await;
        hub.handle_frame(w.clone(), ClientFrame::Watcher { id: host.clone() }).await;
        hub.handle_frame(guest.clone(), ClientFrame::Join { user: Some("gia".into()) }).await;
        hub.handle_frame(host.clone(), ClientFrame::ApproveJoin { id: guest.clone() }).await;

        drain(&mut rx_w);
        hub.handle_frame(guest.clone(), ClientFrame::Broadcaster).await;

        assert!(
            drain(&mut rx_w)
                .iter()
                .any(|e| matches!(e, HubEvent::Invite { id, user, .. } if id == &guest && user == "gia"))
        );
    }
}

impl Hub {
    #[cfg(test)]
    pub(crate) fn db(&self) -> &SqlitePool {
        &self.db
    }
}
