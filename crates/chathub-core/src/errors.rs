//! Error types for the hub's collaborators and wire protocol.
//!
//! - [`WireError`]: an inbound frame could not be decoded (never fatal)
//! - [`StoreError`]: the persistence collaborator refused a message
//! - [`AuthError`]: a connection or request could not be authenticated

use thiserror::Error;

/// Inbound frame decoding failure.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame was not a JSON object of the expected shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame had a `type` the hub does not handle.
    #[error("unknown event type: {0}")]
    UnknownType(String),
}

/// Persistence collaborator failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The message was rejected before storage (e.g. empty content).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// The backing store could not accept writes.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Authentication collaborator failure.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer header and no `token` query parameter.
    #[error("missing credentials")]
    MissingToken,
    /// The token failed signature or claim validation.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// The token's `exp` has passed.
    #[error("token expired")]
    Expired,
}
