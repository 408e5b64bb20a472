//! # reconcile-collab — Networked authority and clients for reconcile-core
//!
//! Hosts shared documents behind a WebSocket authority. Clients send edits
//! stamped with the clock they last observed; the authority commits them
//! through a [`ConversationStore`](reconcile_core::ConversationStore) and fans
//! the committed edits out to every other editor of the document.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ SyncClient  │ ◄─────────────────► │ SyncServer  │
//! │ (per user)  │     Binary Proto    │ (authority) │
//! └──────┬──────┘                     └──────┬──────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌──────────────────┐             ┌───────────────────┐
//! │ ClientReconciler │             │ ConversationStore │ ◄── ManagementApi
//! │ + apply loop     │             └─────────┬─────────┘
//! └──────────────────┘                       │
//!                                    ┌───────┴───────┐
//!                                    │ BroadcastGroup│
//!                                    │ (fan-out)     │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded `WireMessage`)
//! - [`broadcast`] — Room-based fan-out with backpressure
//! - [`server`] — WebSocket authority
//! - [`client`] — WebSocket client with offline queue
//! - [`apply_loop`] — Timer-driven client apply loop
//! - [`api`] — Management operations (ping, info, mutations, conversations)

pub mod api;
pub mod apply_loop;
pub mod broadcast;
pub mod client;
pub mod protocol;
pub mod server;

// Re-exports for convenience
pub use api::{ApiError, ManagementApi, MutationRequest};
pub use apply_loop::spawn_apply_loop;
pub use broadcast::{BroadcastGroup, BroadcastStats, Frame, RoomManager};
pub use client::{ClientConfig, ConnectionState, OfflineQueue, SyncClient, SyncEvent};
pub use protocol::{Ack, PeerInfo, ProtocolError, WireMessage};
pub use server::{AuthorAssignment, ServerConfig, ServerStats, SyncServer};
