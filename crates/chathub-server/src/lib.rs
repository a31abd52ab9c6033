//! # chathub-server
//!
//! Real-time chat connection hub behind an axum server.
//!
//! - Connection registry indexed by connection, user ID and display name
//! - Fan-out (broadcast, direct, room) with evict-on-overflow backpressure
//! - Per-connection read/write loops with ping/pong liveness
//! - Message persistence and authentication at trait boundaries
//! - REST endpoints, health check, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod collab;
pub mod config;
pub mod health;
pub mod http;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{HubConfig, ServerConfig};
pub use hub::Hub;
pub use server::ChatServer;
