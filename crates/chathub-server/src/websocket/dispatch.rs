//! Event fan-out to connected WebSocket clients.
//!
//! Every enqueue is non-blocking. A connection whose outbound queue is full
//! is evicted on the spot (unregistered and closed) and delivery continues
//! to the rest of the targets.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use chathub_core::{DeliveryTarget, OutboundEvent};
use metrics::counter;
use tracing::{debug, warn};

use super::connection::{ClientConnection, Enqueue};
use super::registry::ConnectionRegistry;
use crate::metrics::WS_EVICTIONS_TOTAL;

/// Per-call delivery summary for multi-recipient sends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot.
    pub recipients: usize,
    /// Connections whose queue accepted the payload.
    pub delivered: usize,
    /// Connections evicted because their queue was full.
    pub evicted: usize,
}

/// Routes serialized events into connection queues.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver to every connection registered at call time.
    pub fn broadcast_all(&self, event: &OutboundEvent) -> BroadcastReport {
        self.fan_out(&DeliveryTarget::All, event)
    }

    /// Deliver to the members of a room.
    ///
    /// Room membership is not tracked, so this reaches every connection.
    pub fn send_to_room(&self, room_id: &str, event: &OutboundEvent) -> BroadcastReport {
        self.fan_out(&DeliveryTarget::Room(room_id.to_owned()), event)
    }

    /// Deliver to the connection owned by `user_id`.
    ///
    /// Returns `false` without side effects when the user is not connected.
    pub fn send_to_user(&self, user_id: &str, event: &OutboundEvent) -> bool {
        let conn = self.registry.lookup_by_user(user_id);
        self.send_one(&DeliveryTarget::User(user_id.to_owned()), conn, event)
    }

    /// Deliver to the connection owned by display name `name`.
    pub fn send_to_name(&self, name: &str, event: &OutboundEvent) -> bool {
        let conn = self.registry.lookup_by_name(name);
        self.send_one(&DeliveryTarget::Name(name.to_owned()), conn, event)
    }

    /// Deliver to a connection the caller already holds.
    pub fn send_to_connection(&self, conn: &ClientConnection, event: &OutboundEvent) -> bool {
        encode(event).is_some_and(|payload| self.deliver(conn, payload))
    }

    /// Enqueue an already-serialized payload, evicting on overflow.
    pub fn deliver(&self, conn: &ClientConnection, payload: Utf8Bytes) -> bool {
        self.enqueue(conn, payload) == Enqueue::Queued
    }

    fn send_one(
        &self,
        target: &DeliveryTarget,
        conn: Option<Arc<ClientConnection>>,
        event: &OutboundEvent,
    ) -> bool {
        let Some(conn) = conn else {
            debug!(%target, event_type = event.kind(), "target not connected");
            return false;
        };
        let delivered = self.send_to_connection(&conn, event);
        debug!(%target, event_type = event.kind(), delivered, "direct send");
        delivered
    }

    fn fan_out(&self, target: &DeliveryTarget, event: &OutboundEvent) -> BroadcastReport {
        let Some(payload) = encode(event) else {
            return BroadcastReport::default();
        };
        let snapshot = self.registry.snapshot();
        let mut report = BroadcastReport {
            recipients: snapshot.len(),
            ..BroadcastReport::default()
        };
        for conn in &snapshot {
            match self.enqueue(conn, payload.clone()) {
                Enqueue::Queued => report.delivered += 1,
                Enqueue::Full => report.evicted += 1,
                Enqueue::Closed => {}
            }
        }
        debug!(
            %target,
            event_type = event.kind(),
            recipients = report.recipients,
            delivered = report.delivered,
            evicted = report.evicted,
            "broadcast event"
        );
        report
    }

    fn enqueue(&self, conn: &ClientConnection, payload: Utf8Bytes) -> Enqueue {
        let outcome = conn.try_enqueue(payload);
        if outcome == Enqueue::Full {
            warn!(
                conn_id = %conn.id,
                user = conn.username(),
                drops = conn.drop_count(),
                "outbound queue full, evicting slow client"
            );
            counter!(WS_EVICTIONS_TOTAL).increment(1);
            let _ = self.registry.unregister(conn);
        }
        outcome
    }
}

fn encode(event: &OutboundEvent) -> Option<Utf8Bytes> {
    match event.to_json() {
        Ok(json) => Some(json.into()),
        Err(e) => {
            warn!(event_type = event.kind(), error = %e, "failed to serialize event");
            None
        }
    }
}
