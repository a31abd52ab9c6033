//! WebSocket connection management, registry, fan-out, liveness, and the
//! per-connection read/write loops.

pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod liveness;
pub mod registry;
pub mod session;
