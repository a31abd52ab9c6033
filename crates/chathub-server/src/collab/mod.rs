//! Collaborators the hub depends on at its boundary: message persistence
//! and request authentication, with reference implementations.

pub mod auth;
pub mod store;

pub use auth::{Authenticator, Claims, JwtAuthenticator};
pub use store::{InMemoryMessageStore, MessageStore};
