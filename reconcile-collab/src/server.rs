//! WebSocket authority with room-based document routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐                       ┌── ConversationStore (shared)
//!            ├── Room (document_id) ─┤        transform, append, advance
//! Client B ──┘                       └── BroadcastGroup
//!                                             │
//!                                  ┌──────────┼───────────┐
//!                                  ▼          ▼           ▼
//!                               Client A   Client B    Client C
//! ```
//!
//! A connection joins exactly one room. Each edit it sends is committed
//! through the store; the committed edit is fanned out to the room while the
//! document is still locked, so every peer sees commits in log order. The
//! sender gets an `Ack` carrying the post-commit clock instead of its echo.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use reconcile_core::{Author, ConversationStore, DocumentId, Edit};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::api::ManagementApi;
use crate::broadcast::{BroadcastGroup, Frame, RoomManager};
use crate::protocol::{Ack, PeerInfo, ProtocolError, WireMessage};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How the authority picks an author for a joining connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorAssignment {
    /// Pseudo-random per connection.
    #[default]
    Random,
    /// Alice, Bob, Alice, ... in join order within a room.
    Alternate,
}

impl AuthorAssignment {
    fn assign(self, room: &BroadcastGroup) -> Author {
        match self {
            AuthorAssignment::Random => Author::from_seat(rand::random::<u64>()),
            AuthorAssignment::Alternate => Author::from_seat(room.take_seat()),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum peers per room
    pub max_peers_per_room: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    pub author_assignment: AuthorAssignment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_peers_per_room: 100,
            broadcast_capacity: 256,
            author_assignment: AuthorAssignment::Random,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub total_commits: u64,
    pub dropped_frames: u64,
    pub active_rooms: usize,
}

/// Room membership of one connection.
struct Session {
    peer: PeerInfo,
    document_id: DocumentId,
    room: Arc<BroadcastGroup>,
}

/// Everything a connection task needs from the server.
#[derive(Clone)]
struct ConnectionContext {
    config: ServerConfig,
    store: Arc<ConversationStore>,
    room_manager: Arc<RoomManager>,
    stats: Arc<RwLock<ServerStats>>,
}

/// The authority server.
pub struct SyncServer {
    config: ServerConfig,
    store: Arc<ConversationStore>,
    room_manager: Arc<RoomManager>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(ConversationStore::new()))
    }

    /// Serve documents from an existing store, e.g. one shared with the
    /// management API.
    pub fn with_store(config: ServerConfig, store: Arc<ConversationStore>) -> Self {
        let room_manager = Arc::new(RoomManager::new(config.broadcast_capacity));
        Self {
            config,
            store,
            room_manager,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind to the configured address and serve forever.
    pub async fn run(&self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        log::info!("Sync server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let ctx = self.context();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, ctx).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    fn context(&self) -> ConnectionContext {
        ConnectionContext {
            config: self.config.clone(),
            store: self.store.clone(),
            room_manager: self.room_manager.clone(),
            stats: self.stats.clone(),
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        ctx: ConnectionContext,
    ) -> Result<(), BoxError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = ctx.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let mut session: Option<Session> = None;
        let mut broadcast_rx: Option<broadcast::Receiver<Arc<Frame>>> = None;

        let result: Result<(), BoxError> = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                {
                                    let mut s = ctx.stats.write().await;
                                    s.total_messages += 1;
                                    s.total_bytes += data.len() as u64;
                                }

                                let message = match WireMessage::decode(&data) {
                                    Ok(message) => message,
                                    Err(e) => {
                                        log::warn!("Dropping undecodable frame from {addr}: {e}");
                                        continue;
                                    }
                                };

                                let reply = Self::handle_message(
                                    &ctx,
                                    &mut session,
                                    &mut broadcast_rx,
                                    message,
                                )
                                .await?;

                                if let Some(reply) = reply {
                                    // The Ack's clock counts every edit committed before it;
                                    // those frames must reach the peer first.
                                    if let (WireMessage::Ack(_), Some(rx), Some(s)) =
                                        (&reply, broadcast_rx.as_mut(), session.as_ref())
                                    {
                                        let (frames, lagged) = Self::pending_frames(rx, s);
                                        if lagged > 0 {
                                            log::warn!("Peer at {addr} lagged by {lagged} frames");
                                            s.room.record_dropped(lagged);
                                            ctx.stats.write().await.dropped_frames += lagged;
                                        }
                                        for frame in frames {
                                            ws_sender.send(Message::Binary(frame.bytes.clone().into())).await?;
                                        }
                                    }
                                    ws_sender.send(Message::Binary(reply.encode()?.into())).await?;
                                }
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection closed from {addr}");
                                break;
                            }

                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                            }

                            Some(Err(e)) => {
                                log::error!("WebSocket error from {addr}: {e}");
                                break;
                            }

                            _ => {}
                        }
                    }

                    frame = async {
                        match broadcast_rx.as_mut() {
                            Some(rx) => rx.recv().await,
                            // Not joined yet
                            None => std::future::pending().await,
                        }
                    } => {
                        match frame {
                            Ok(frame) => {
                                if session.as_ref().is_some_and(|s| s.peer.peer_id == frame.sender) {
                                    continue;
                                }
                                ws_sender.send(Message::Binary(frame.bytes.clone().into())).await?;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                log::warn!("Peer at {addr} lagged by {n} frames");
                                if let Some(s) = session.as_ref() {
                                    s.room.record_dropped(n);
                                }
                                ctx.stats.write().await.dropped_frames += n;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        // Cleanup: leave the room; the document itself stays in the store.
        if let Some(session) = session {
            session.room.remove_peer(&session.peer.peer_id).await;
            if let Err(e) = session.room.broadcast(
                session.peer.peer_id,
                &WireMessage::UserDisconnected { user: session.peer },
            ) {
                log::warn!("Presence update for {} failed: {e}", session.document_id);
            }
            if ctx.room_manager.remove_if_empty(&session.document_id).await {
                log::info!("Room {} removed (empty)", session.document_id);
            }
            log::info!(
                "{} ({}) left {}",
                session.peer.author,
                session.peer.peer_id,
                session.document_id
            );
        }

        {
            let room_count = ctx.room_manager.room_count().await;
            let mut s = ctx.stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = room_count;
        }

        result
    }

    /// Process one decoded message; returns the direct reply, if any.
    async fn handle_message(
        ctx: &ConnectionContext,
        session: &mut Option<Session>,
        broadcast_rx: &mut Option<broadcast::Receiver<Arc<Frame>>>,
        message: WireMessage,
    ) -> Result<Option<WireMessage>, BoxError> {
        match message {
            WireMessage::Join { document_id } => {
                if let Some(current) = session.as_ref() {
                    log::warn!(
                        "Ignoring join for {document_id}: already in {}",
                        current.document_id
                    );
                    return Ok(None);
                }

                let room = ctx.room_manager.get_or_create(&document_id).await;
                if room.peer_count().await >= ctx.config.max_peers_per_room {
                    ctx.room_manager.remove_if_empty(&document_id).await;
                    return Err(ProtocolError::InvalidMessage(format!(
                        "room {document_id} is full ({} peers)",
                        ctx.config.max_peers_per_room
                    ))
                    .into());
                }

                let author = ctx.config.author_assignment.assign(&room);
                let peer = PeerInfo::new(author);
                *broadcast_rx = Some(room.add_peer(peer).await);

                let info = WireMessage::Info {
                    id: author,
                    connected_users: room.peers().await,
                    origin: ctx.store.origin(&document_id),
                };
                if let Err(e) = room.broadcast(peer.peer_id, &WireMessage::UserConnected { user: peer }) {
                    log::warn!("Presence update for {document_id} failed: {e}");
                }

                ctx.stats.write().await.active_rooms = ctx.room_manager.room_count().await;
                log::info!("{author} ({}) joined {document_id}", peer.peer_id);

                *session = Some(Session {
                    peer,
                    document_id,
                    room,
                });
                Ok(Some(info))
            }

            WireMessage::Insert(_)
            | WireMessage::Delete(_)
            | WireMessage::Undo(_)
            | WireMessage::Redo(_) => {
                let Some(current) = session.as_ref() else {
                    log::warn!("Dropping {} before join: {}", message.event(), ProtocolError::NotJoined);
                    return Ok(None);
                };

                let edit = match message.into_edit() {
                    Ok(edit) => edit,
                    Err(e) => {
                        log::warn!("Dropping edit from {}: {e}", current.peer.peer_id);
                        return Ok(None);
                    }
                };
                if edit.document_id != current.document_id || edit.author != current.peer.author {
                    log::warn!(
                        "Dropping edit for {} by {} on a connection joined to {} as {}",
                        edit.document_id,
                        edit.author,
                        current.document_id,
                        current.peer.author
                    );
                    return Ok(None);
                }

                let ack = Self::commit(ctx, current, &edit)?;
                ctx.stats.write().await.total_commits += 1;
                Ok(Some(WireMessage::Ack(ack)))
            }

            WireMessage::Ping => Ok(Some(WireMessage::Pong)),

            other => {
                log::debug!("Ignoring client-bound message {}", other.event());
                Ok(None)
            }
        }
    }

    /// Take every frame already queued for `session`, minus its own.
    ///
    /// Returns the frames in arrival order and the number skipped by lag.
    fn pending_frames(
        rx: &mut broadcast::Receiver<Arc<Frame>>,
        session: &Session,
    ) -> (Vec<Arc<Frame>>, u64) {
        let mut frames = Vec::new();
        let mut lagged = 0;
        loop {
            match rx.try_recv() {
                Ok(frame) if frame.sender == session.peer.peer_id => {}
                Ok(frame) => frames.push(frame),
                Err(broadcast::error::TryRecvError::Lagged(n)) => lagged += n,
                Err(_) => return (frames, lagged),
            }
        }
    }

    /// Commit and fan out under the document lock.
    fn commit(
        ctx: &ConnectionContext,
        session: &Session,
        edit: &Edit,
    ) -> Result<Ack, ProtocolError> {
        let (receipt, fanned_out) = ctx.store.commit_with(edit, |receipt| {
            session
                .room
                .broadcast(session.peer.peer_id, &WireMessage::edit(receipt.edit.clone()))
        });
        fanned_out?;

        Ok(Ack {
            author: receipt.edit.author,
            document_id: receipt.edit.document_id,
            payload: receipt.edit.payload,
            origin: receipt.origin,
        })
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn room_manager(&self) -> &Arc<RoomManager> {
        &self.room_manager
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Management API over this server's documents. Its mutations are
    /// fanned out to connected editors.
    pub fn management_api(&self) -> ManagementApi {
        ManagementApi::with_rooms(self.store.clone(), self.room_manager.clone())
    }
}
