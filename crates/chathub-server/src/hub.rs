//! The connection hub: registry, dispatcher and message store behind one
//! facade used by the WebSocket sessions and the HTTP API.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use chathub_core::{Identity, MessageRequest, OutboundEvent, PersistedMessage, StoreError};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::collab::MessageStore;
use crate::config::HubConfig;
use crate::metrics::{HUB_MESSAGES_PERSISTED_TOTAL, HUB_PERSIST_ERRORS_TOTAL};
use crate::websocket::connection::ClientConnection;
use crate::websocket::dispatch::{BroadcastReport, Dispatcher};
use crate::websocket::liveness::LivenessPolicy;
use crate::websocket::registry::{ConnectionRegistry, Registration};

/// A registered connection and the receiving end of its outbound queue.
pub struct Attached {
    /// The live connection.
    pub connection: Arc<ClientConnection>,
    /// Consumed by the write loop.
    pub outbound: mpsc::Receiver<Utf8Bytes>,
}

/// How the sender of a message is addressed for direct delivery.
#[derive(Clone, Copy, Debug)]
enum Addressing<'a> {
    /// WebSocket clients name recipients by display name.
    ByName(&'a str),
    /// HTTP callers name recipients by user ID.
    ByUser(&'a str),
}

/// Connection hub shared by every session.
pub struct Hub {
    config: HubConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher,
    store: Arc<dyn MessageStore>,
}

impl Hub {
    /// Create a hub persisting through `store`.
    pub fn new(config: HubConfig, store: Arc<dyn MessageStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.duplicate_policy));
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            store,
            config,
        }
    }

    /// Hub limits.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Liveness timing for sessions.
    pub fn liveness(&self) -> LivenessPolicy {
        self.config.liveness
    }

    /// Largest inbound message accepted.
    pub fn max_message_size(&self) -> usize {
        self.config.max_message_size
    }

    /// Connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Fan-out dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Message store.
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Create and register a connection for `identity`.
    ///
    /// On success the `connection` confirmation is already queued. Returns
    /// `None` when the duplicate-identity policy refuses the connection.
    pub fn connect(&self, identity: Identity) -> Option<Attached> {
        let (conn, outbound) = ClientConnection::new(identity, self.config.send_queue_capacity);
        let connection = Arc::new(conn);

        match self.registry.register(&connection) {
            Registration::Rejected => {
                let _ = connection.close();
                None
            }
            Registration::Registered { superseded } => {
                info!(
                    conn_id = %connection.id,
                    user = connection.username(),
                    superseded,
                    "client registered"
                );
                let _ = self
                    .dispatcher
                    .send_to_connection(&connection, &OutboundEvent::connected(&connection.identity));
                Some(Attached {
                    connection,
                    outbound,
                })
            }
        }
    }

    /// Remove a connection and close its queue. Idempotent.
    pub fn disconnect(&self, conn: &ClientConnection) -> bool {
        self.registry.unregister(conn)
    }

    /// Persist a message from a WebSocket client and fan it out.
    ///
    /// Recipients are display names. Nothing is delivered if persistence
    /// fails.
    pub async fn submit(
        &self,
        origin: &ClientConnection,
        request: MessageRequest,
    ) -> Result<PersistedMessage, StoreError> {
        let message = self.persist(&request, "ws").await?;
        self.route(&message, Addressing::ByName(origin.username()));
        Ok(message)
    }

    /// Persist a message posted over HTTP and fan it out.
    ///
    /// The sender is `identity`'s display name; recipients are user IDs.
    pub async fn post_message(
        &self,
        identity: &Identity,
        content: String,
        recipient: Option<String>,
        room_id: Option<String>,
    ) -> Result<PersistedMessage, StoreError> {
        let request = MessageRequest::new(identity.username.clone(), content, recipient, room_id);
        let message = self.persist(&request, "http").await?;
        self.route(&message, Addressing::ByUser(&identity.user_id));
        Ok(message)
    }

    /// Stored history.
    pub async fn messages(&self) -> Result<Vec<PersistedMessage>, StoreError> {
        self.store.messages().await
    }

    /// Deliver to every connected client.
    pub fn broadcast_all(&self, event: &OutboundEvent) -> BroadcastReport {
        self.dispatcher.broadcast_all(event)
    }

    /// Deliver to one user. `false` if they are not connected.
    pub fn send_to_user(&self, user_id: &str, event: &OutboundEvent) -> bool {
        self.dispatcher.send_to_user(user_id, event)
    }

    /// Sorted display names of connected clients.
    pub fn list_connected_names(&self) -> Vec<String> {
        self.registry.list_names()
    }

    /// Whether `user_id` has a live connection.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.registry.lookup_by_user(user_id).is_some()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Close every connection so their write loops send Close frames.
    pub fn shutdown(&self) -> usize {
        self.registry.close_all()
    }

    async fn persist(
        &self,
        request: &MessageRequest,
        origin: &'static str,
    ) -> Result<PersistedMessage, StoreError> {
        match self.store.persist(request).await {
            Ok(message) => {
                counter!(HUB_MESSAGES_PERSISTED_TOTAL, "origin" => origin).increment(1);
                Ok(message)
            }
            Err(e) => {
                counter!(HUB_PERSIST_ERRORS_TOTAL, "origin" => origin).increment(1);
                warn!(sender = %request.sender, origin, error = %e, "failed to persist message");
                Err(e)
            }
        }
    }

    fn route(&self, message: &PersistedMessage, sender: Addressing<'_>) {
        if let Some(room_id) = &message.room_id {
            let event = OutboundEvent::Message {
                message: message.clone(),
            };
            let _ = self.dispatcher.send_to_room(room_id, &event);
        } else if !message.recipient.is_empty() {
            let event = OutboundEvent::DirectMessage {
                message: message.clone(),
            };
            let recipient = message.recipient.as_str();
            match sender {
                Addressing::ByName(own) => {
                    let _ = self.dispatcher.send_to_name(recipient, &event);
                    if own != recipient {
                        let _ = self.dispatcher.send_to_name(own, &event);
                    }
                }
                Addressing::ByUser(own) => {
                    let _ = self.dispatcher.send_to_user(recipient, &event);
                    if own != recipient {
                        let _ = self.dispatcher.send_to_user(own, &event);
                    }
                }
            }
        } else {
            let event = OutboundEvent::Message {
                message: message.clone(),
            };
            let _ = self.dispatcher.broadcast_all(&event);
        }
    }
}
