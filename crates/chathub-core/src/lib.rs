//! # chathub-core
//!
//! Shared vocabulary for the chat hub crates:
//!
//! - **Branded IDs**: [`ConnectionId`], [`MessageId`] as newtypes
//! - **Models**: [`PersistedMessage`], [`MessageRequest`], [`Identity`]
//! - **Wire events**: inbound client frames and outbound hub events
//! - **Errors**: collaborator error types via `thiserror`
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod models;
pub mod wire;

pub use errors::{AuthError, StoreError, WireError};
pub use ids::{ConnectionId, MessageId};
pub use models::{Identity, MessageRequest, PersistedMessage};
pub use wire::{DeliveryTarget, InboundEvent, OutboundEvent};
