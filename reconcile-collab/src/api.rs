//! Request/response layer for document management.
//!
//! Transport-agnostic: an HTTP binding maps each method to a route
//! (`GET /ping`, `GET /info`, `POST /mutations`, `GET /conversations`,
//! `DELETE /conversations/{id}`) and [`ApiError::status_code`] to the
//! response status.
//!
//! Built with [`ManagementApi::with_rooms`] (or
//! [`SyncServer::management_api`](crate::server::SyncServer::management_api)),
//! submitted mutations are also fanned out to the document's connected
//! editors, exactly like edits arriving over WebSocket.

use std::sync::Arc;

use reconcile_core::{
    Author, ConversationStore, DocumentId, DocumentSnapshot, Edit, EditPayload, Origin, StoreError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broadcast::RoomManager;
use crate::protocol::WireMessage;

/// Errors surfaced to API callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conversation doesn't exist: {0}")]
    NotFound(DocumentId),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound(_) => 404,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ApiError::NotFound(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub authors: Vec<Author>,
    pub conversations: usize,
}

/// Body of a mutation submission. `payload` and `origin` are required;
/// they are optional here so that their absence is a `BadRequest` rather
/// than a decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    pub author: Author,
    pub document_id: DocumentId,
    #[serde(default)]
    pub payload: Option<EditPayload>,
    #[serde(default)]
    pub origin: Option<Origin>,
}

impl MutationRequest {
    pub fn from_json(body: &str) -> Result<Self, ApiError> {
        serde_json::from_str(body)
            .map_err(|e| ApiError::BadRequest(format!("Mutation payload is invalid: {e}")))
    }

    pub fn into_edit(self) -> Result<Edit, ApiError> {
        match (self.payload, self.origin) {
            (Some(payload), Some(origin)) => {
                Ok(Edit::new(self.author, self.document_id, payload, origin))
            }
            (None, _) => Err(ApiError::BadRequest("Mutation payload is missing".into())),
            (_, None) => Err(ApiError::BadRequest("Mutation origin is missing".into())),
        }
    }
}

impl From<Edit> for MutationRequest {
    fn from(edit: Edit) -> Self {
        Self {
            author: edit.author,
            document_id: edit.document_id,
            payload: Some(edit.payload),
            origin: Some(edit.origin),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<DocumentSnapshot>,
}

/// Frame sender for mutations that did not come from a connection.
const API_SENDER: Uuid = Uuid::nil();

/// Management operations over the shared store.
#[derive(Clone)]
pub struct ManagementApi {
    store: Arc<ConversationStore>,
    rooms: Option<Arc<RoomManager>>,
}

impl ManagementApi {
    /// Store-only API; nobody is notified of mutations.
    pub fn new(store: Arc<ConversationStore>) -> Self {
        Self { store, rooms: None }
    }

    /// API whose mutations also reach the editors connected to `rooms`.
    pub fn with_rooms(store: Arc<ConversationStore>, rooms: Arc<RoomManager>) -> Self {
        Self {
            store,
            rooms: Some(rooms),
        }
    }

    pub fn ping(&self) -> PingResponse {
        PingResponse { msg: "pong".into() }
    }

    pub fn info(&self) -> InfoResponse {
        InfoResponse {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            authors: Author::ALL.to_vec(),
            conversations: self.store.len(),
        }
    }

    /// Commit a mutation and return the document text afterwards.
    pub async fn submit_mutation(
        &self,
        request: MutationRequest,
    ) -> Result<MutationResponse, ApiError> {
        let edit = request.into_edit()?;
        let room = match self.rooms {
            Some(ref rooms) => rooms.get(&edit.document_id).await,
            None => None,
        };

        let (receipt, fanned_out) = self.store.commit_with(&edit, |receipt| match room {
            Some(ref room) => room.broadcast(API_SENDER, &WireMessage::edit(receipt.edit.clone())),
            None => Ok(0),
        });
        match fanned_out {
            Ok(peers) => log::info!(
                "Mutation {} by {} committed to {} ({peers} peers notified)",
                edit.kind(),
                edit.author,
                edit.document_id
            ),
            Err(e) => log::warn!("Mutation on {} not fanned out: {e}", edit.document_id),
        }
        Ok(MutationResponse { text: receipt.text })
    }

    /// Decode a JSON body and submit it.
    pub async fn submit_mutation_json(&self, body: &str) -> Result<MutationResponse, ApiError> {
        self.submit_mutation(MutationRequest::from_json(body)?).await
    }

    pub fn conversations(&self) -> ConversationsResponse {
        ConversationsResponse {
            conversations: self.store.list_snapshots(),
        }
    }

    /// Delete a conversation; unknown ids leave the store untouched.
    pub fn delete_conversation(&self, id: &DocumentId) -> Result<(), ApiError> {
        self.store.delete(id)?;
        Ok(())
    }
}
