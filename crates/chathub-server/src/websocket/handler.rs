//! Inbound frame handling for one connection.

use chathub_core::{InboundEvent, MessageRequest, OutboundEvent};
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::hub::Hub;

/// Error text sent to the originating client when persistence fails.
pub const SAVE_FAILED: &str = "Failed to save message";

/// Decode and act on one text frame.
///
/// Undecodable frames are logged and skipped; the connection stays up.
pub async fn handle_frame(frame: &str, conn: &ClientConnection, hub: &Hub) {
    let event = match InboundEvent::decode(frame) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, len = frame.len(), "ignoring undecodable frame");
            return;
        }
    };

    match event {
        InboundEvent::Ping => {
            let _ = hub
                .dispatcher()
                .send_to_connection(conn, &OutboundEvent::pong());
        }
        InboundEvent::Message {
            content,
            recipient,
            room_id,
        } => {
            let request =
                MessageRequest::new(conn.username().to_owned(), content, recipient, room_id);
            match hub.submit(conn, request).await {
                Ok(message) => debug!(message_id = %message.id, "message dispatched"),
                Err(_) => {
                    let _ = hub
                        .dispatcher()
                        .send_to_connection(conn, &OutboundEvent::error(SAVE_FAILED));
                }
            }
        }
    }
}
