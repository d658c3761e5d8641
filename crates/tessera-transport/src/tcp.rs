//! TCP transport carrying length-prefixed frames.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;

use crate::frame::{FRAME_HEADER_LEN, MAX_PAYLOAD_SIZE, RawFrame, check_payload_len, parse_header};
use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    max_frame_size: usize,
    closed: AtomicBool,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local = listener.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(%local, "TCP transport listening");
        Ok(Self {
            listener,
            max_frame_size: MAX_PAYLOAD_SIZE,
            closed: AtomicBool::new(false),
        })
    }

    /// Largest payload accepted connections will read or write.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max.min(MAX_PAYLOAD_SIZE);
        self
    }

    /// The address actually bound, useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::AcceptFailed)
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let conn = TcpConnection::from_stream(stream, self.max_frame_size);
        tracing::debug!(id = %conn.id, %addr, "accepted TCP connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// A single framed TCP connection.
///
/// Reads and writes go through separate halves, so one task can wait in
/// [`recv_frame`](Connection::recv_frame) while another sends.
pub struct TcpConnection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    max_frame_size: usize,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpConnection {
    /// Opens a client connection.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(Self::from_stream(stream, MAX_PAYLOAD_SIZE))
    }

    fn from_stream(stream: TcpStream, max_frame_size: usize) -> Self {
        let peer = stream.peer_addr().ok();
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        let (reader, writer) = stream.into_split();
        Self {
            id: next_id(),
            peer,
            max_frame_size,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    /// Remote address, if the socket reported one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Writes raw bytes without framing. Lets tests and tools put
    /// arbitrary (including malformed) data on the wire.
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await.map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send_frame(&self, frame: &RawFrame) -> Result<(), Self::Error> {
        check_payload_len(frame.payload.len(), self.max_frame_size)?;
        self.send_raw(&frame.to_bytes()?).await
    }

    async fn recv_frame(&self) -> Result<Option<RawFrame>, Self::Error> {
        let mut reader = self.reader.lock().await;

        let mut header = [0u8; FRAME_HEADER_LEN];
        let mut filled = 0;
        while filled < FRAME_HEADER_LEN {
            let n = reader
                .read(&mut header[filled..])
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(TransportError::ConnectionClosed(format!(
                    "eof after {filled} of {FRAME_HEADER_LEN} header bytes"
                )));
            }
            filled += n;
        }

        let (len, packet_id) = parse_header(&header, self.max_frame_size)?;
        // Capacity follows the bytes received, not the declared length.
        let mut payload = Vec::with_capacity(len.min(64 * 1024));
        (&mut *reader)
            .take(len as u64)
            .read_to_end(&mut payload)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if payload.len() < len {
            return Err(TransportError::ConnectionClosed(format!(
                "eof after {} of {len} payload bytes",
                payload.len()
            )));
        }
        Ok(Some(RawFrame { packet_id, payload }))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
