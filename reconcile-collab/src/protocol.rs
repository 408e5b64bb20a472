//! Binary wire protocol between editors and the authority.
//!
//! Every WebSocket binary frame carries one bincode-encoded [`WireMessage`]:
//! ```text
//! client ── Join ─────────────────────────▸ server
//! client ◂──────────────────────── Info ─── server   (author, peers, origin)
//! client ── Insert/Delete/Undo/Redo ──────▸ server
//! client ◂──────────────────────── Ack ──── server   (post-commit origin)
//! others ◂──────── Insert/Delete/Undo/Redo  server   (committed edit)
//! others ◂──────── UserConnected / UserDisconnected
//! ```
//!
//! Presence messages are best-effort and never touch document state.

use reconcile_core::{Author, DocumentId, Edit, EditPayload, OperationKind, Origin};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A connected editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Connection-scoped id
    pub peer_id: Uuid,
    /// Author identity assigned by the authority
    pub author: Author,
}

impl PeerInfo {
    pub fn new(author: Author) -> Self {
        Self {
            peer_id: Uuid::new_v4(),
            author,
        }
    }
}

/// Acknowledgement sent to the committing client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub author: Author,
    pub document_id: DocumentId,
    /// Payload as committed (transformed and clamped)
    pub payload: EditPayload,
    /// Document clock after the commit
    pub origin: Origin,
}

impl Ack {
    pub const EVENT: &'static str = "ack";
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// First client message: select the document room.
    Join { document_id: DocumentId },
    /// Handshake reply: assigned author, peers in the room, document clock.
    Info {
        id: Author,
        connected_users: Vec<PeerInfo>,
        origin: Origin,
    },
    Insert(Edit),
    Delete(Edit),
    Undo(Edit),
    Redo(Edit),
    Ack(Ack),
    UserConnected { user: PeerInfo },
    UserDisconnected { user: PeerInfo },
    Ping,
    Pong,
}

impl WireMessage {
    /// Wrap an edit in the variant matching its operation.
    pub fn edit(edit: Edit) -> Self {
        match edit.kind() {
            OperationKind::Insert => WireMessage::Insert(edit),
            OperationKind::Delete => WireMessage::Delete(edit),
            OperationKind::Undo => WireMessage::Undo(edit),
            OperationKind::Redo => WireMessage::Redo(edit),
        }
    }

    /// Event name as used on the wire.
    pub fn event(&self) -> &'static str {
        match self {
            WireMessage::Join { .. } => "join",
            WireMessage::Info { .. } => "info",
            WireMessage::Insert(_) => "insert",
            WireMessage::Delete(_) => "delete",
            WireMessage::Undo(_) => "undo",
            WireMessage::Redo(_) => "redo",
            WireMessage::Ack(_) => Ack::EVENT,
            WireMessage::UserConnected { .. } => "userConnected",
            WireMessage::UserDisconnected { .. } => "userDisconnected",
            WireMessage::Ping => "ping",
            WireMessage::Pong => "pong",
        }
    }

    /// Borrow the carried edit, if any.
    pub fn as_edit(&self) -> Option<&Edit> {
        match self {
            WireMessage::Insert(edit)
            | WireMessage::Delete(edit)
            | WireMessage::Undo(edit)
            | WireMessage::Redo(edit) => Some(edit),
            _ => None,
        }
    }

    /// Take the carried edit, checking that its operation matches the variant.
    pub fn into_edit(self) -> Result<Edit, ProtocolError> {
        let event = self.event();
        match self {
            WireMessage::Insert(edit)
            | WireMessage::Delete(edit)
            | WireMessage::Undo(edit)
            | WireMessage::Redo(edit) => {
                if edit.kind().as_str() != event {
                    return Err(ProtocolError::InvalidMessage(format!(
                        "{} edit sent as {event}",
                        edit.kind()
                    )));
                }
                Ok(edit)
            }
            _ => Err(ProtocolError::InvalidMessageType),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    InvalidMessage(String),
    /// No author assigned yet
    NotJoined,
    ConnectionClosed,
    Timeout,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::InvalidMessage(e) => write!(f, "Invalid message: {e}"),
            Self::NotJoined => write!(f, "No author assigned; join a document first"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Timeout => write!(f, "Connection timeout"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_edit(payload: EditPayload) -> Edit {
        Edit::new(
            Author::Bob,
            "doc-1",
            payload,
            Origin::ZERO.with(Author::Alice, 3),
        )
    }

    #[test]
    fn test_edit_roundtrip() {
        let msg = WireMessage::edit(sample_edit(EditPayload::insert(4, "héllo")));
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.event(), "insert");
    }

    #[test]
    fn test_edit_variant_follows_kind() {
        assert!(matches!(
            WireMessage::edit(sample_edit(EditPayload::delete(0, 1))),
            WireMessage::Delete(_)
        ));
        assert!(matches!(
            WireMessage::edit(sample_edit(EditPayload::undo(0))),
            WireMessage::Undo(_)
        ));
        assert!(matches!(
            WireMessage::edit(sample_edit(EditPayload::redo(0))),
            WireMessage::Redo(_)
        ));
    }

    #[test]
    fn test_into_edit_rejects_mismatched_variant() {
        let msg = WireMessage::Delete(sample_edit(EditPayload::insert(0, "x")));
        assert!(matches!(msg.into_edit(), Err(ProtocolError::InvalidMessage(_))));

        let ok = WireMessage::Undo(sample_edit(EditPayload::undo(2)));
        assert_eq!(ok.into_edit().unwrap().payload, EditPayload::undo(2));

        assert_eq!(WireMessage::Ping.into_edit(), Err(ProtocolError::InvalidMessageType));
    }

    #[test]
    fn test_info_roundtrip() {
        let peer = PeerInfo::new(Author::Alice);
        let msg = WireMessage::Info {
            id: Author::Alice,
            connected_users: vec![peer],
            origin: Origin::ZERO.with(Author::Bob, 2),
        };
        let decoded = WireMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_ack_event_name() {
        let ack = WireMessage::Ack(Ack {
            author: Author::Alice,
            document_id: "doc".into(),
            payload: EditPayload::insert(0, "a"),
            origin: Origin::ZERO.with(Author::Alice, 1),
        });
        assert_eq!(ack.event(), "ack");
        assert!(ack.as_edit().is_none());
        assert_eq!(WireMessage::decode(&ack.encode().unwrap()).unwrap(), ack);
    }

    #[test]
    fn test_presence_event_names() {
        let user = PeerInfo::new(Author::Bob);
        assert_eq!(WireMessage::UserConnected { user }.event(), "userConnected");
        assert_eq!(WireMessage::UserDisconnected { user }.event(), "userDisconnected");
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(matches!(
            WireMessage::decode(&garbage),
            Err(ProtocolError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_ping_is_small() {
        let encoded = WireMessage::Ping.encode().unwrap();
        assert!(encoded.len() <= 2, "Ping encoded to {} bytes", encoded.len());
    }
}
