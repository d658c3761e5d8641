//! Per-connection handling: receive, validate, dispatch, reply.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive a frame, closing the connection once it sits idle too long
//!   2. Decode it into a [`Packet`] (validation runs first)
//!   3. Pass the packet to the [`PacketHandler`]
//!   4. Encode and send the replies
//!
//! Any failure in steps 1 or 2 means the peer sent something it should
//! not have, so the connection is closed.

use std::future::Future;
use std::sync::Arc;

use tessera_protocol::{ConnectionStats, Packet, PacketCodec, PacketId, messages};
use tessera_transport::{Connection, ConnectionId, TcpConnection};

use crate::TesseraError;
use crate::server::ServerState;

/// What to do after a packet was handled.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Packets to send back, in order.
    pub replies: Vec<Packet>,
    /// Close the connection once the replies are sent.
    pub close: bool,
}

impl Outcome {
    /// No reply, keep the connection open.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn reply(packet: Packet) -> Self {
        Self {
            replies: vec![packet],
            close: false,
        }
    }

    pub fn close() -> Self {
        Self {
            replies: Vec::new(),
            close: true,
        }
    }
}

/// Application logic for validated inbound packets.
///
/// ## Trait bounds
///
/// One handler is shared by every connection task, hence `Send + Sync`.
/// The returned future must be `Send` so the task can move between
/// worker threads.
pub trait PacketHandler: Send + Sync + 'static {
    fn handle(&self, conn: ConnectionId, packet: Packet) -> impl Future<Output = Outcome> + Send;
}

/// Answers `Ping` with `Pong` and closes on `Disconnect`.
///
/// Everything else is accepted and ignored, which makes this handler a
/// validating sink for any registered packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl PacketHandler for EchoHandler {
    async fn handle(&self, conn: ConnectionId, packet: Packet) -> Outcome {
        match packet.id {
            PacketId::PING => {
                let pong = messages::pong_reply(&packet.record);
                Outcome::reply(Packet {
                    id: PacketId::PONG,
                    record: pong,
                })
            }
            PacketId::DISCONNECT => {
                tracing::debug!(%conn, "peer sent disconnect");
                Outcome::close()
            }
            _ => {
                match packet.to_json() {
                    Ok(json) => tracing::trace!(%conn, packet = %json, "ignored packet"),
                    Err(e) => tracing::trace!(%conn, error = %e, "ignored packet"),
                }
                Outcome::none()
            }
        }
    }
}

/// Handles a single connection from accept to close, returning its
/// packet counters.
pub(crate) async fn handle_connection<H: PacketHandler>(
    conn: TcpConnection,
    state: Arc<ServerState<H>>,
) -> Result<ConnectionStats, TesseraError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = ?conn.peer_addr(), "handling new connection");

    let mut codec = PacketCodec::new(Arc::clone(&state.registry))
        .with_stats(ConnectionStats::new())
        .with_max_frame_size(state.max_frame_size);

    let result = serve(&conn, &mut codec, &state).await;

    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }
    let stats = codec.into_stats();
    tracing::debug!(
        %conn_id,
        sent = stats.total_sent(),
        received = stats.total_received(),
        "connection closed"
    );
    result.map(|()| stats)
}

async fn serve<H: PacketHandler>(
    conn: &TcpConnection,
    codec: &mut PacketCodec<ConnectionStats>,
    state: &ServerState<H>,
) -> Result<(), TesseraError> {
    let conn_id = conn.id();

    loop {
        let frame = match tokio::time::timeout(state.idle_timeout, conn.recv_frame()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "peer closed connection");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "rejected inbound frame");
                return Ok(());
            }
            Err(_) => {
                tracing::debug!(%conn_id, "connection idle, closing");
                return Ok(());
            }
        };

        let packet = match codec.decode(frame) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "rejected inbound packet");
                return Ok(());
            }
        };

        let outcome = state.handler.handle(conn_id, packet).await;
        for reply in &outcome.replies {
            let frame = codec.encode(reply)?;
            conn.send_frame(&frame).await?;
        }
        if outcome.close {
            return Ok(());
        }
    }
}
