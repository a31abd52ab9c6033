//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.
//!
//! Each session runs two loops that share nothing but the outbound queue and
//! the connection's cancellation token:
//!
//! - the read loop decodes inbound frames and watches the read deadline;
//! - the write loop drains the queue into the socket and sends Pings.
//!
//! Whichever loop stops first tears the connection down through the
//! registry, which closes the queue and cancels the token so the other loop
//! follows.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use chathub_core::Identity;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{Instrument, debug, info, info_span, warn};

use super::connection::ClientConnection;
use super::handler::handle_frame;
use crate::hub::{Attached, Hub};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Why the read loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The peer sent a Close frame.
    PeerClosed,
    /// The stream ended without a Close frame.
    StreamEnded,
    /// The transport reported an error.
    TransportError,
    /// No Pong arrived within the pong wait.
    DeadlineExpired,
    /// The connection was closed from elsewhere (eviction, supersede,
    /// write failure, shutdown).
    Shutdown,
}

impl ReadOutcome {
    /// Label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::StreamEnded => "stream_ended",
            Self::TransportError => "transport_error",
            Self::DeadlineExpired => "pong_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Error)]
enum WriteError {
    #[error("write deadline of {0:?} exceeded")]
    Timeout(Duration),
    #[error("transport: {0}")]
    Transport(String),
}

/// Run a WebSocket session for an authenticated client.
///
/// Registers the client with the hub (its `connection` confirmation is the
/// first outbound frame), then runs the read and write loops until either
/// stops. A client refused by the duplicate-identity policy gets a Close
/// frame and nothing else.
pub async fn run_ws_session(socket: WebSocket, identity: Identity, hub: Arc<Hub>) {
    let Some(attached) = hub.connect(identity.clone()) else {
        info!(user = %identity.username, "duplicate connection refused");
        let (mut sink, _stream) = socket.split();
        let _ = time::timeout(hub.liveness().write_wait, sink.send(Message::Close(None))).await;
        return;
    };
    let (sink, stream) = socket.split();
    drive_session(stream, sink, attached, &hub).await;
}

/// Drive both loops of a registered connection over any frame stream/sink.
pub async fn drive_session<S, W, E>(stream: S, sink: W, attached: Attached, hub: &Hub)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let Attached {
        connection: conn,
        outbound,
    } = attached;
    let span = info_span!("ws_session", conn_id = %conn.id, user = %conn.username());

    async {
        info!("client connected");
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        let reader = async {
            let outcome = read_loop(stream, &conn, hub).await;
            // The one unregister on the read side; closes the queue so the
            // writer drains and sends Close.
            let _ = hub.disconnect(&conn);
            outcome
        };
        let writer = write_loop(sink, outbound, &conn, hub);
        let (outcome, ()) = tokio::join!(reader, writer);
        conn.mark_closed();

        info!(
            reason = outcome.as_str(),
            dropped = conn.drop_count(),
            "client disconnected"
        );
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => outcome.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
    }
    .instrument(span)
    .await;
}

async fn read_loop<S, E>(mut stream: S, conn: &ClientConnection, hub: &Hub) -> ReadOutcome
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let policy = hub.liveness();
    let max_size = hub.max_message_size();
    let shutdown = conn.shutdown_token().clone();

    loop {
        let deadline = policy.read_deadline(conn.last_pong());
        let frame = tokio::select! {
            () = shutdown.cancelled() => return ReadOutcome::Shutdown,
            () = time::sleep_until(deadline) => {
                // A Pong may have moved the deadline while we slept.
                if policy.is_expired(conn.last_pong(), Instant::now()) {
                    warn!(pong_wait = ?policy.pong_wait, "no pong within deadline, disconnecting");
                    return ReadOutcome::DeadlineExpired;
                }
                continue;
            }
            frame = stream.next() => frame,
        };

        let message = match frame {
            None => return ReadOutcome::StreamEnded,
            Some(Err(e)) => {
                debug!(error = %e, "read failed");
                return ReadOutcome::TransportError;
            }
            Some(Ok(message)) => message,
        };

        match message {
            Message::Text(text) => handle_text(text.as_str(), max_size, conn, hub).await,
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_text(text, max_size, conn, hub).await,
                Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Message::Pong(_) => conn.mark_alive(),
            // The transport answers Pings on its own.
            Message::Ping(_) => {}
            Message::Close(_) => {
                debug!("client sent close frame");
                return ReadOutcome::PeerClosed;
            }
        }
    }
}

async fn handle_text(text: &str, max_size: usize, conn: &ClientConnection, hub: &Hub) {
    if text.len() > max_size {
        warn!(len = text.len(), max_size, "dropping oversized frame");
        return;
    }
    handle_frame(text, conn, hub).await;
}

async fn write_loop<W>(
    mut sink: W,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    conn: &ClientConnection,
    hub: &Hub,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let policy = hub.liveness();
    let mut ping_ticker = policy.ping_ticker();

    loop {
        let result = tokio::select! {
            item = outbound.recv() => match item {
                Some(payload) => write_batch(&mut sink, &mut outbound, payload, policy.write_wait)
                    .await
                    .map(|written| debug!(written, "flushed outbound frames")),
                None => {
                    // Queue closed: say goodbye, best effort.
                    let _ = send_with_deadline(&mut sink, Message::Close(None), policy.write_wait)
                        .await;
                    break;
                }
            },
            _ = ping_ticker.tick() => {
                send_with_deadline(&mut sink, Message::Ping(Vec::new().into()), policy.write_wait).await
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "write failed, disconnecting");
            let _ = hub.disconnect(conn);
            break;
        }
    }
}

/// Write `first` plus whatever is already queued, then flush once.
async fn write_batch<W>(
    sink: &mut W,
    outbound: &mut mpsc::Receiver<Utf8Bytes>,
    first: Utf8Bytes,
    write_wait: Duration,
) -> Result<usize, WriteError>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let batch = async {
        sink.feed(Message::Text(first)).await.map_err(transport)?;
        let mut written = 1;
        while let Ok(next) = outbound.try_recv() {
            sink.feed(Message::Text(next)).await.map_err(transport)?;
            written += 1;
        }
        sink.flush().await.map_err(transport)?;
        Ok::<_, WriteError>(written)
    };
    time::timeout(write_wait, batch)
        .await
        .map_err(|_| WriteError::Timeout(write_wait))?
}

async fn send_with_deadline<W>(
    sink: &mut W,
    message: Message,
    write_wait: Duration,
) -> Result<(), WriteError>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    time::timeout(write_wait, sink.send(message))
        .await
        .map_err(|_| WriteError::Timeout(write_wait))?
        .map_err(transport)
}

fn transport<E: Display>(e: E) -> WriteError {
    WriteError::Transport(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::InMemoryMessageStore;
    use crate::config::HubConfig;
    use crate::websocket::connection::ConnectionState;
    use crate::websocket::liveness::LivenessPolicy;
    use futures::channel::mpsc as fmpsc;
    use serde_json::Value;

    type Inbound = fmpsc::UnboundedSender<Result<Message, String>>;
    type Outbound = fmpsc::UnboundedReceiver<Message>;

    fn hub(pong_wait: Duration) -> Arc<Hub> {
        let config = HubConfig {
            liveness: LivenessPolicy::from_pong_wait(pong_wait, Duration::from_secs(1)),
            ..HubConfig::default()
        };
        Arc::new(Hub::new(config, Arc::new(InMemoryMessageStore::new())))
    }

    /// Start a session over in-memory channels.
    fn start(
        hub: &Arc<Hub>,
        user_id: &str,
        name: &str,
    ) -> (Inbound, Outbound, Arc<ClientConnection>, tokio::task::JoinHandle<()>) {
        let (in_tx, in_rx) = fmpsc::unbounded();
        let (out_tx, out_rx) = fmpsc::unbounded();
        let attached = hub.connect(Identity::new(user_id, name)).unwrap();
        let conn = Arc::clone(&attached.connection);
        let hub = Arc::clone(hub);
        let handle = tokio::spawn(async move {
            drive_session(in_rx, out_tx, attached, &hub).await;
        });
        (in_tx, out_rx, conn, handle)
    }

    async fn next_text(out: &mut Outbound) -> Value {
        loop {
            match out.next().await.expect("socket closed") {
                Message::Text(t) => return serde_json::from_str(t.as_str()).unwrap(),
                Message::Ping(_) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    fn text(json: &str) -> Result<Message, String> {
        Ok(Message::Text(json.into()))
    }

    #[tokio::test]
    async fn confirmation_is_first_frame() {
        let hub = hub(Duration::from_secs(60));
        let (_in, mut out, _conn, _h) = start(&hub, "u1", "alice");
        let first = next_text(&mut out).await;
        assert_eq!(first["type"], "connection");
        assert_eq!(first["username"], "alice");
    }

    #[tokio::test]
    async fn ping_pong_round_trip() {
        let hub = hub(Duration::from_secs(60));
        let (input, mut out, _conn, _h) = start(&hub, "u1", "alice");
        let _ = next_text(&mut out).await;

        input.unbounded_send(text(r#"{"type":"ping"}"#)).unwrap();
        let reply = next_text(&mut out).await;
        assert_eq!(reply["type"], "pong");
    }

    #[tokio::test]
    async fn newline_in_frame_is_folded() {
        let hub = hub(Duration::from_secs(60));
        let (input, mut out, _conn, _h) = start(&hub, "u1", "alice");
        let _ = next_text(&mut out).await;

        input
            .unbounded_send(text("{\"type\":\"message\",\n\"content\":\"a\"}\n"))
            .unwrap();
        assert_eq!(next_text(&mut out).await["message"]["content"], "a");
    }

    #[tokio::test]
    async fn binary_utf8_treated_as_text() {
        let hub = hub(Duration::from_secs(60));
        let (input, mut out, _conn, _h) = start(&hub, "u1", "alice");
        let _ = next_text(&mut out).await;

        input
            .unbounded_send(Ok(Message::Binary(br#"{"type":"ping"}"#.to_vec().into())))
            .unwrap();
        assert_eq!(next_text(&mut out).await["type"], "pong");
    }

    #[tokio::test]
    async fn oversized_frame_dropped_connection_survives() {
        let hub = hub(Duration::from_secs(60));
        let (input, mut out, _conn, _h) = start(&hub, "u1", "alice");
        let _ = next_text(&mut out).await;

        let big = format!(
            r#"{{"type":"message","content":"{}"}}"#,
            "x".repeat(hub.max_message_size())
        );
        input.unbounded_send(text(&big)).unwrap();
        input.unbounded_send(text(r#"{"type":"ping"}"#)).unwrap();
        assert_eq!(next_text(&mut out).await["type"], "pong");
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn peer_close_unregisters_and_sends_close() {
        let hub = hub(Duration::from_secs(60));
        let (input, mut out, conn, handle) = start(&hub, "u1", "alice");
        let _ = next_text(&mut out).await;

        input.unbounded_send(Ok(Message::Close(None))).unwrap();
        handle.await.unwrap();

        assert_eq!(hub.connection_count(), 0);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(out.next().await, Some(Message::Close(_))));
    }

    #[tokio::test]
    async fn stream_end_tears_down() {
        let hub = hub(Duration::from_secs(60));
        let (input, _out, conn, handle) = start(&hub, "u1", "alice");
        drop(input);
        handle.await.unwrap();
        assert!(!hub.is_online("u1"));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn transport_error_tears_down() {
        let hub = hub(Duration::from_secs(60));
        let (input, _out, _conn, handle) = start(&hub, "u1", "alice");
        input.unbounded_send(Err("reset by peer".into())).unwrap();
        handle.await.unwrap();
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_pong_expires_read_deadline() {
        let hub = hub(Duration::from_secs(10));
        let (_input, mut out, conn, handle) = start(&hub, "u1", "alice");
        let _ = next_text(&mut out).await;

        handle.await.unwrap();
        assert!(!hub.is_online("u1"));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(Instant::now() - conn.connected_at >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn pong_extends_deadline() {
        let hub = hub(Duration::from_secs(10));
        let (input, mut out, _conn, handle) = start(&hub, "u1", "alice");
        let _ = next_text(&mut out).await;

        // The write loop pings every 9s; answer each one.
        for _ in 0..3 {
            loop {
                if let Some(Message::Ping(_)) = out.next().await {
                    break;
                }
            }
            input.unbounded_send(Ok(Message::Pong(Vec::new().into()))).unwrap();
        }
        assert!(hub.is_online("u1"));
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn eviction_closes_socket_after_draining() {
        let config = HubConfig {
            send_queue_capacity: 2,
            ..HubConfig::default()
        };
        let hub = Arc::new(Hub::new(config, Arc::new(InMemoryMessageStore::new())));

        // Build the session by hand so the write loop never starts.
        let attached = hub.connect(Identity::new("u1", "slow")).unwrap();
        let conn = Arc::clone(&attached.connection);
        for _ in 0..2 {
            let _ = hub.broadcast_all(&chathub_core::OutboundEvent::pong());
        }
        assert!(conn.is_closed());
        assert!(hub.list_connected_names().is_empty());

        // Starting the loops now drains the two queued frames then closes.
        let (_in_tx, in_rx) = fmpsc::unbounded::<Result<Message, String>>();
        let (out_tx, mut out_rx) = fmpsc::unbounded();
        drive_session(in_rx, out_tx, attached, &hub).await;

        let mut frames = Vec::new();
        while let Ok(Some(frame)) = out_rx.try_next() {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames.last(), Some(Message::Close(_))));
    }

    #[tokio::test]
    async fn batched_frames_reach_socket_in_queue_order() {
        let hub = hub(Duration::from_secs(60));
        let attached = hub.connect(Identity::new("u1", "alice")).unwrap();
        let conn = Arc::clone(&attached.connection);

        // Queue everything before the write loop exists so the first recv
        // finds a backlog and writes it as one batch.
        let expected: Vec<String> = (0..8).map(|i| format!("event-{i}")).collect();
        for reason in &expected {
            assert!(
                hub.dispatcher()
                    .send_to_connection(&conn, &chathub_core::OutboundEvent::error(reason))
            );
        }

        let (in_tx, in_rx) = fmpsc::unbounded::<Result<Message, String>>();
        let (out_tx, mut out_rx) = fmpsc::unbounded();
        let session = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { drive_session(in_rx, out_tx, attached, &hub).await })
        };

        assert_eq!(next_text(&mut out_rx).await["type"], "connection");
        let received: Vec<String> = {
            let mut seen = Vec::new();
            for _ in 0..expected.len() {
                let event = next_text(&mut out_rx).await;
                assert_eq!(event["type"], "error");
                seen.push(event["error"].as_str().unwrap().to_owned());
            }
            seen
        };
        assert_eq!(received, expected);

        drop(in_tx);
        session.await.unwrap();
        assert!(matches!(out_rx.next().await, Some(Message::Close(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_writer_hits_deadline() {
        let hub = hub(Duration::from_secs(60));
        let attached = hub.connect(Identity::new("u1", "alice")).unwrap();
        let conn = Arc::clone(&attached.connection);

        let (_in_tx, in_rx) = fmpsc::unbounded::<Result<Message, String>>();
        // Bounded sink that nobody reads: the second frame blocks.
        let (out_tx, _out_rx) = fmpsc::channel::<Message>(0);
        let _ = hub.dispatcher().send_to_connection(&conn, &chathub_core::OutboundEvent::pong());
        let _ = hub.dispatcher().send_to_connection(&conn, &chathub_core::OutboundEvent::pong());

        drive_session(in_rx, out_tx, attached, &hub).await;
        assert!(!hub.is_online("u1"));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn supersede_stops_old_session() {
        let hub = hub(Duration::from_secs(60));
        let (_in1, mut out1, old, handle) = start(&hub, "u1", "alice");
        let _ = next_text(&mut out1).await;

        let (_in2, mut out2, new, _h2) = start(&hub, "u1", "alice");
        let _ = next_text(&mut out2).await;

        handle.await.unwrap();
        assert_eq!(old.state(), ConnectionState::Closed);
        assert!(matches!(out1.next().await, Some(Message::Close(_))));
        assert_eq!(hub.registry().lookup_by_user("u1").unwrap().id, new.id);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(ReadOutcome::DeadlineExpired.as_str(), "pong_timeout");
        assert_eq!(ReadOutcome::PeerClosed.as_str(), "peer_closed");
    }
}
