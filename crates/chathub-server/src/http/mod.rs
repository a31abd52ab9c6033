//! HTTP boundary: authenticated REST endpoints next to the WebSocket route.

pub mod api;
pub mod error;
pub mod extract;

pub use error::ApiError;
pub use extract::AuthUser;
