//! Per-document fan-out of committed edits and presence.
//!
//! Each document room owns one tokio broadcast channel. Frames are encoded
//! once and shared as `Arc<Frame>`; every connection holds its own receiver
//! and skips frames it sent itself. A receiver that falls more than
//! `capacity` frames behind lags and loses the oldest frames.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reconcile_core::DocumentId;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{PeerInfo, ProtocolError, WireMessage};

/// One encoded message plus the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sender: Uuid,
    pub bytes: Vec<u8>,
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// The broadcast group of a single document room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Frame>>,
    peers: RwLock<HashMap<Uuid, PeerInfo>>,
    capacity: usize,
    stats: AtomicBroadcastStats,
    /// Join counter used for alternating author assignment
    next_seat: AtomicU64,
}

impl BroadcastGroup {
    /// `capacity` is the number of frames buffered per receiver before it lags.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: RwLock::new(HashMap::new()),
            capacity,
            stats: AtomicBroadcastStats::default(),
            next_seat: AtomicU64::new(0),
        }
    }

    /// Register a peer and return its receiver.
    pub async fn add_peer(&self, info: PeerInfo) -> broadcast::Receiver<Arc<Frame>> {
        let mut peers = self.peers.write().await;
        peers.insert(info.peer_id, info);
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, peer_id: &Uuid) -> Option<PeerInfo> {
        self.peers.write().await.remove(peer_id)
    }

    /// Encode `msg` once and fan it out to every receiver, sender included.
    ///
    /// Returns the number of receivers; filtering the sender is the
    /// receiving side's job.
    pub fn broadcast(&self, sender: Uuid, msg: &WireMessage) -> Result<usize, ProtocolError> {
        let bytes = msg.encode()?;
        Ok(self.broadcast_raw(Arc::new(Frame { sender, bytes })))
    }

    /// Fan out an already encoded frame.
    pub fn broadcast_raw(&self, frame: Arc<Frame>) -> usize {
        let count = self.sender.send(frame).unwrap_or(0);
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Account for frames a lagging receiver skipped.
    pub fn record_dropped(&self, count: u64) {
        self.stats.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Next join ordinal in this room, starting at zero.
    pub fn take_seat(&self) -> u64 {
        self.next_seat.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().copied().collect()
    }

    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Maps document ids to their broadcast groups.
///
/// Frames never cross rooms.
pub struct RoomManager {
    rooms: RwLock<HashMap<DocumentId, Arc<BroadcastGroup>>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    pub async fn get_or_create(&self, document_id: &DocumentId) -> Arc<BroadcastGroup> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(document_id) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(document_id) {
            return room.clone();
        }

        let room = Arc::new(BroadcastGroup::new(self.default_capacity));
        rooms.insert(document_id.clone(), room.clone());
        room
    }

    pub async fn get(&self, document_id: &DocumentId) -> Option<Arc<BroadcastGroup>> {
        self.rooms.read().await.get(document_id).cloned()
    }

    /// Drop the room once its last peer has left.
    pub async fn remove_if_empty(&self, document_id: &DocumentId) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(document_id) {
            if room.peer_count().await == 0 {
                rooms.remove(document_id);
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_documents(&self) -> Vec<DocumentId> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
