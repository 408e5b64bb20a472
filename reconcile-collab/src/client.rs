//! WebSocket client for an authority-hosted document.
//!
//! Provides:
//! - Connection lifecycle with the `Join` / `Info` handshake
//! - Optimistic local edits stamped with the last observed clock
//! - Remote committed edits fed into the local apply loop
//! - Offline queue for edits made while disconnected

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use reconcile_core::{
    Author, ClientReconciler, CursorOffset, DocumentId, Edit, EditPayload, Origin,
};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::apply_loop::spawn_apply_loop;
use crate::protocol::{Ack, PeerInfo, ProtocolError, WireMessage};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    /// Handshake completed
    Info {
        author: Author,
        connected_users: Vec<PeerInfo>,
        origin: Origin,
    },
    /// One of our edits was committed
    Ack(Ack),
    /// A committed edit from another peer, already queued for apply
    RemoteEdit(Edit),
    UserConnected(PeerInfo),
    UserDisconnected(PeerInfo),
    Pong,
}

/// Client tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Apply loop period; one edit per tick
    pub tick_interval: Duration,
    pub offline_capacity: usize,
    pub event_capacity: usize,
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            offline_capacity: 10_000,
            event_capacity: 256,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Edits made while disconnected, replayed in order on reconnect.
pub struct OfflineQueue {
    queue: VecDeque<Edit>,
    max_size: usize,
}

impl OfflineQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Returns false when the queue is full.
    pub fn enqueue(&mut self, edit: Edit) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(edit);
        true
    }

    pub fn drain(&mut self) -> Vec<Edit> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// State the reader task shares with the client.
#[derive(Clone)]
struct Shared {
    document_id: DocumentId,
    state: Arc<RwLock<ConnectionState>>,
    observed: Arc<Mutex<Origin>>,
    reconciler: Arc<Mutex<ClientReconciler>>,
    event_tx: mpsc::Sender<SyncEvent>,
    generation: Arc<AtomicU64>,
}

impl Shared {
    fn emit(&self, event: SyncEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            log::trace!("Event dropped: {e}");
        }
    }
}

/// The sync client.
pub struct SyncClient {
    author: Option<Author>,
    server_url: String,
    config: ClientConfig,
    shared: Shared,
    offline_queue: Arc<tokio::sync::Mutex<OfflineQueue>>,
    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
}

impl SyncClient {
    pub fn new(document_id: impl Into<DocumentId>, server_url: impl Into<String>) -> Self {
        Self::with_config(document_id, server_url, ClientConfig::default())
    }

    pub fn with_config(
        document_id: impl Into<DocumentId>,
        server_url: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        let document_id = document_id.into();
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        Self {
            author: None,
            server_url: server_url.into(),
            offline_queue: Arc::new(tokio::sync::Mutex::new(OfflineQueue::new(
                config.offline_capacity,
            ))),
            shared: Shared {
                reconciler: Arc::new(Mutex::new(ClientReconciler::new(document_id.clone()))),
                document_id,
                state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
                observed: Arc::new(Mutex::new(Origin::ZERO)),
                event_tx,
                generation: Arc::new(AtomicU64::new(0)),
            },
            config,
            outgoing_tx: None,
            event_rx: Some(event_rx),
        }
    }

    /// Edit as `author` before the first handshake. The authority's
    /// assignment replaces it on connect.
    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect, join the document and wait for the handshake.
    ///
    /// Returns the author assigned by the authority. Edits queued while
    /// offline are re-stamped with that author and sent in order.
    pub async fn connect(&mut self) -> Result<Author, ProtocolError> {
        *self.shared.state.write().await = ConnectionState::Connecting;

        match self.establish().await {
            Ok(author) => Ok(author),
            Err(e) => {
                log::warn!("Connecting to {} failed: {e}", self.server_url);
                *self.shared.state.write().await = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<Author, ProtocolError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.server_url.as_str())
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let join = WireMessage::Join {
            document_id: self.shared.document_id.clone(),
        };
        ws_writer
            .send(Message::Binary(join.encode()?.into()))
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)?;

        let (author, connected_users, origin) =
            tokio::time::timeout(self.config.handshake_timeout, await_info(&mut ws_reader))
                .await
                .map_err(|_| ProtocolError::Timeout)??;

        self.author = Some(author);
        self.shared.observed.lock().merge(&origin);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Writer task: forward outgoing channel to WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                    return;
                }
            }
            let _ = ws_writer.close().await;
        });
        self.outgoing_tx = Some(out_tx);

        *self.shared.state.write().await = ConnectionState::Connected;
        self.shared.emit(SyncEvent::Connected);
        self.shared.emit(SyncEvent::Info {
            author,
            connected_users,
            origin,
        });
        log::info!(
            "Joined {} as {author} at {origin}",
            self.shared.document_id
        );

        self.replay_offline(author).await?;

        let shared = self.shared.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => match WireMessage::decode(&data) {
                        Ok(message) => shared.receive(message),
                        Err(e) => log::warn!("Dropping undecodable frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost; a newer connection owns the state otherwise.
            if shared.generation.load(Ordering::SeqCst) == generation {
                *shared.state.write().await = ConnectionState::Disconnected;
            }
            shared.emit(SyncEvent::Disconnected);
        });

        Ok(author)
    }

    async fn replay_offline(&self, author: Author) -> Result<(), ProtocolError> {
        let queued = self.offline_queue.lock().await.drain();
        if queued.is_empty() {
            return Ok(());
        }

        log::info!("Replaying {} queued edits", queued.len());
        for mut edit in queued {
            edit.author = author;
            self.send(WireMessage::edit(edit).encode()?).await?;
        }
        Ok(())
    }

    async fn send(&self, bytes: Vec<u8>) -> Result<(), ProtocolError> {
        match self.outgoing_tx {
            Some(ref tx) => tx
                .send(bytes)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Close the connection. Later edits go to the offline queue.
    pub async fn disconnect(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.outgoing_tx = None;
        *self.shared.state.write().await = ConnectionState::Disconnected;
    }

    pub async fn insert(&self, position: usize, text: impl Into<String>) -> Result<Edit, ProtocolError> {
        self.submit(EditPayload::insert(position, text)).await
    }

    pub async fn delete(&self, position: usize, length: usize) -> Result<Edit, ProtocolError> {
        self.submit(EditPayload::delete(position, length)).await
    }

    pub async fn undo(&self, position: usize) -> Result<Edit, ProtocolError> {
        self.submit(EditPayload::undo(position)).await
    }

    pub async fn redo(&self, position: usize) -> Result<Edit, ProtocolError> {
        self.submit(EditPayload::redo(position)).await
    }

    /// Stamp, send (or queue offline) and apply locally.
    async fn submit(&self, payload: EditPayload) -> Result<Edit, ProtocolError> {
        let author = self.author.ok_or(ProtocolError::NotJoined)?;
        let origin = *self.shared.observed.lock();
        let edit = Edit::new(author, self.shared.document_id.clone(), payload, origin);

        let connected = *self.shared.state.read().await == ConnectionState::Connected;
        let sent = connected && self.send(WireMessage::edit(edit.clone()).encode()?).await.is_ok();
        if !sent {
            let mut queue = self.offline_queue.lock().await;
            if !queue.enqueue(edit.clone()) {
                return Err(ProtocolError::ConnectionClosed);
            }
            log::debug!("Queued {} offline ({} pending)", edit.kind(), queue.len());
        }

        self.shared.reconciler.lock().enqueue(edit.clone());
        Ok(edit)
    }

    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        self.send(WireMessage::Ping.encode()?).await
    }

    /// Register the callback fired each time the apply loop drains.
    pub fn on_content(&self, callback: impl FnMut(&str, &[CursorOffset]) + Send + 'static) {
        self.shared.reconciler.lock().on_content(callback);
    }

    /// Start ticking the local apply loop.
    pub fn start_apply_loop(&self) -> JoinHandle<()> {
        spawn_apply_loop(self.shared.reconciler.clone(), self.config.tick_interval)
    }

    /// Text as applied so far by the apply loop.
    pub fn text(&self) -> String {
        self.shared.reconciler.lock().text().to_string()
    }

    pub fn reconciler(&self) -> &Arc<Mutex<ClientReconciler>> {
        &self.shared.reconciler
    }

    /// Last clock observed from the authority.
    pub fn observed(&self) -> Origin {
        *self.shared.observed.lock()
    }

    pub fn author(&self) -> Option<Author> {
        self.author
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.shared.document_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    pub async fn offline_queue_len(&self) -> usize {
        self.offline_queue.lock().await.len()
    }
}

impl Shared {
    /// Handle one frame from the authority.
    ///
    /// The authority never echoes a connection's own edits, so every
    /// committed edit arriving here belongs to another peer, possibly one
    /// sharing our author.
    fn receive(&self, message: WireMessage) {
        match message {
            WireMessage::Ack(ack) => {
                self.observed.lock().merge(&ack.origin);
                self.emit(SyncEvent::Ack(ack));
            }
            WireMessage::Insert(_)
            | WireMessage::Delete(_)
            | WireMessage::Undo(_)
            | WireMessage::Redo(_) => {
                let edit = match message.into_edit() {
                    Ok(edit) => edit,
                    Err(e) => {
                        log::warn!("Dropping committed edit: {e}");
                        return;
                    }
                };
                if edit.document_id != self.document_id {
                    log::warn!("Dropping edit for foreign document {}", edit.document_id);
                    return;
                }

                self.observed
                    .lock()
                    .merge(&edit.origin.advanced(edit.author));
                self.reconciler.lock().enqueue(edit.clone());
                self.emit(SyncEvent::RemoteEdit(edit));
            }
            WireMessage::UserConnected { user } => self.emit(SyncEvent::UserConnected(user)),
            WireMessage::UserDisconnected { user } => self.emit(SyncEvent::UserDisconnected(user)),
            WireMessage::Pong => self.emit(SyncEvent::Pong),
            WireMessage::Info { origin, .. } => {
                self.observed.lock().merge(&origin);
            }
            other => log::debug!("Ignoring server-bound message {}", other.event()),
        }
    }
}

/// Read frames until the handshake reply arrives.
async fn await_info<S>(reader: &mut S) -> Result<(Author, Vec<PeerInfo>, Origin), ProtocolError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = reader.next().await {
        match msg {
            Ok(Message::Binary(data)) => match WireMessage::decode(&data)? {
                WireMessage::Info {
                    id,
                    connected_users,
                    origin,
                } => return Ok((id, connected_users, origin)),
                other => log::debug!("Ignoring {} before handshake", other.event()),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
    Err(ProtocolError::ConnectionClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_core::OperationKind;

    fn client() -> SyncClient {
        SyncClient::new("doc", "ws://localhost:9090")
    }

    fn committed(author: Author, payload: EditPayload, origin: Origin) -> WireMessage {
        WireMessage::edit(Edit::new(author, "doc", payload, origin))
    }

    #[test]
    fn test_client_creation() {
        let client = client();
        assert_eq!(client.document_id().as_str(), "doc");
        assert_eq!(client.server_url(), "ws://localhost:9090");
        assert_eq!(client.author(), None);
        assert_eq!(client.observed(), Origin::ZERO);
    }

    #[tokio::test]
    async fn test_client_initial_state() {
        let client = client();
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
        assert_eq!(client.offline_queue_len().await, 0);
        assert_eq!(client.text(), "");
    }

    #[tokio::test]
    async fn test_edit_without_author_is_rejected() {
        let client = client();
        assert_eq!(client.insert(0, "x").await, Err(ProtocolError::NotJoined));
    }

    #[tokio::test]
    async fn test_offline_edits_queue_and_apply_locally() {
        let client = client().with_author(Author::Bob);

        let first = client.insert(0, "ab").await.unwrap();
        client.delete(0, 1).await.unwrap();
        assert_eq!(first.author, Author::Bob);
        assert_eq!(first.origin, Origin::ZERO);
        assert_eq!(client.offline_queue_len().await, 2);

        let mut reconciler = client.reconciler().lock();
        assert_eq!(reconciler.pending(), 2);
        while reconciler.tick() != reconcile_core::Tick::Flushed {}
        assert_eq!(reconciler.text(), "b");
    }

    #[tokio::test]
    async fn test_offline_queue_full_rejects_edit() {
        let config = ClientConfig {
            offline_capacity: 1,
            ..ClientConfig::default()
        };
        let client = SyncClient::with_config("doc", "ws://localhost:9090", config)
            .with_author(Author::Alice);

        client.insert(0, "a").await.unwrap();
        assert_eq!(client.insert(1, "b").await, Err(ProtocolError::ConnectionClosed));
        // The rejected edit never reaches the local text.
        assert_eq!(client.reconciler().lock().pending(), 1);
    }

    #[test]
    fn test_remote_edit_is_queued_and_advances_origin() {
        let client = client();
        let seen = Origin::ZERO.with(Author::Alice, 2);
        client
            .shared
            .receive(committed(Author::Alice, EditPayload::insert(0, "hi"), seen));

        assert_eq!(client.observed(), seen.advanced(Author::Alice));
        assert_eq!(client.reconciler().lock().pending(), 1);
    }

    #[test]
    fn test_same_author_edit_from_other_peer_is_queued() {
        let mut client = client();
        let mut events = client.take_event_rx().unwrap();
        client.author = Some(Author::Bob);
        client
            .shared
            .receive(committed(Author::Bob, EditPayload::insert(0, "theirs"), Origin::ZERO));

        assert_eq!(client.reconciler().lock().pending(), 1);
        assert_eq!(client.observed(), Origin::ZERO.with(Author::Bob, 1));
        assert!(matches!(events.try_recv().unwrap(), SyncEvent::RemoteEdit(_)));
    }

    #[test]
    fn test_ack_merges_origin() {
        let mut client = client();
        let mut events = client.take_event_rx().unwrap();
        let ack = Ack {
            author: Author::Alice,
            document_id: "doc".into(),
            payload: EditPayload::insert(0, "x"),
            origin: Origin::ZERO.with(Author::Alice, 1).with(Author::Bob, 4),
        };
        client.shared.receive(WireMessage::Ack(ack.clone()));

        assert_eq!(client.observed(), ack.origin);
        assert_eq!(events.try_recv().unwrap(), SyncEvent::Ack(ack));
    }

    #[test]
    fn test_foreign_document_edit_is_dropped() {
        let client = client();
        client.shared.receive(WireMessage::edit(Edit::new(
            Author::Alice,
            "elsewhere",
            EditPayload::delete(0, 1),
            Origin::ZERO,
        )));
        assert_eq!(client.reconciler().lock().pending(), 0);
        assert_eq!(client.observed(), Origin::ZERO);
    }

    #[test]
    fn test_remote_edit_event() {
        let mut client = client();
        let mut events = client.take_event_rx().unwrap();
        client
            .shared
            .receive(committed(Author::Bob, EditPayload::undo(0), Origin::ZERO));

        match events.try_recv().unwrap() {
            SyncEvent::RemoteEdit(edit) => assert_eq!(edit.kind(), OperationKind::Undo),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_offline_queue() {
        let mut queue = OfflineQueue::new(100);
        assert!(queue.is_empty());

        queue.enqueue(Edit::new(Author::Alice, "doc", EditPayload::insert(0, "a"), Origin::ZERO));
        queue.enqueue(Edit::new(Author::Alice, "doc", EditPayload::delete(0, 1), Origin::ZERO));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained[0].kind(), OperationKind::Insert);
        assert_eq!(drained[1].kind(), OperationKind::Delete);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_offline_queue_capacity_and_clear() {
        let mut queue = OfflineQueue::new(2);
        let edit = Edit::new(Author::Bob, "doc", EditPayload::redo(0), Origin::ZERO);

        assert!(queue.enqueue(edit.clone()));
        assert!(queue.enqueue(edit.clone()));
        assert!(!queue.enqueue(edit));
        queue.clear();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_take_event_rx() {
        let mut client = client();
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
    }

    #[tokio::test]
    async fn test_connect_to_nothing_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = SyncClient::new("doc", format!("ws://{addr}"));
        assert!(client.connect().await.is_err());
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }
}
