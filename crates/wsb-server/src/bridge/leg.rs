//! The two legs of a pair, each wrapping the write side of its connection.
//!
//! Closing is idempotent on both: the first call does the transport work,
//! later calls return `false` and touch nothing.

use crate::config::OutboundKind;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;
use wsb_core::{BridgeError, BridgeResult};

/// Upper bound on how long a close may wait on a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Write side of the front-end WebSocket.
pub struct FrontEnd {
    sink: WsSink,
    outbound: OutboundKind,
    closed: bool,
}

impl FrontEnd {
    pub fn new(sink: WsSink, outbound: OutboundKind) -> Self {
        Self {
            sink,
            outbound,
            closed: false,
        }
    }

    /// Send one backend chunk as one WebSocket message.
    ///
    /// Resolves once the frame has been flushed to the socket, so a slow
    /// client suspends the backend read loop.
    pub async fn send_chunk(&mut self, chunk: &[u8]) -> BridgeResult<()> {
        if self.closed {
            return Err(BridgeError::Transport("front-end already closed".into()));
        }
        let msg = match self.outbound {
            OutboundKind::Binary => Message::Binary(chunk.to_vec().into()),
            OutboundKind::Text => match std::str::from_utf8(chunk) {
                Ok(text) => Message::Text(text.to_owned().into()),
                Err(_) => Message::Binary(chunk.to_vec().into()),
            },
        };
        self.sink
            .send(msg)
            .await
            .map_err(|e| BridgeError::Transport(format!("WS send failed: {e}")))
    }

    /// Send a Close frame (best effort, bounded wait). Returns `false` if
    /// the leg was already closed.
    pub async fn close(&mut self, code: CloseCode, reason: &'static str) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, self.sink.send(Message::Close(Some(frame)))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "front-end close frame not delivered"),
            Err(_) => debug!("front-end close timed out"),
        }
        true
    }

    /// Mark closed without touching the transport; the socket is released
    /// when the pair drops it.
    pub fn abort(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }
}

/// Write side of the backend TCP connection.
pub struct Backend {
    writer: OwnedWriteHalf,
    closed: bool,
}

impl Backend {
    pub fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    /// Write one front-end payload verbatim.
    pub async fn write(&mut self, payload: &[u8]) -> BridgeResult<()> {
        if self.closed {
            return Err(BridgeError::Transport("backend already closed".into()));
        }
        self.writer.write_all(payload).await?;
        Ok(())
    }

    /// Half-close: send FIN to the backend. Returns `false` if the leg was
    /// already closed.
    pub async fn shutdown(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        match tokio::time::timeout(CLOSE_TIMEOUT, self.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "backend shutdown failed"),
            Err(_) => debug!("backend shutdown timed out"),
        }
        true
    }

    /// Mark closed without waiting on the peer. The socket is fully closed
    /// (FIN, or RST if unread data remains) when the pair drops both halves,
    /// so no further backend data is relayed.
    pub fn abort(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::websocket::{start_listener, ws_config};
    use futures_util::StreamExt;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_front_end_close_is_idempotent() {
        let (addr, mut rx) = start_listener(
            "127.0.0.1:0".parse().unwrap(),
            ws_config(1024),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let conn = rx.recv().await.unwrap();
        let (sink, _stream) = conn.ws_stream.split();
        let mut front = FrontEnd::new(sink, OutboundKind::Binary);

        assert!(front.close(CloseCode::Normal, "").await);
        assert!(!front.close(CloseCode::Error, "").await);
        assert!(!front.abort());
        assert!(front.send_chunk(b"late").await.is_err());

        match client.next().await {
            Some(Ok(Message::Close(Some(frame)))) => assert_eq!(frame.code, CloseCode::Normal),
            other => panic!("expected one close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_outbound_falls_back_to_binary() {
        let (addr, mut rx) = start_listener(
            "127.0.0.1:0".parse().unwrap(),
            ws_config(1024),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        let conn = rx.recv().await.unwrap();
        let (sink, _stream) = conn.ws_stream.split();
        let mut front = FrontEnd::new(sink, OutboundKind::Text);

        front.send_chunk("héllo".as_bytes()).await.unwrap();
        front.send_chunk(&[0xff, 0xfe]).await.unwrap();

        match client.next().await {
            Some(Ok(Message::Text(t))) => assert_eq!(t.as_str(), "héllo"),
            other => panic!("expected text, got {other:?}"),
        }
        match client.next().await {
            Some(Ok(Message::Binary(b))) => assert_eq!(&b[..], &[0xff, 0xfe]),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backend_shutdown_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        let (_reader, writer) = stream.into_split();
        let mut backend = Backend::new(writer);
        backend.write(b"abc").await.unwrap();
        assert!(backend.shutdown().await);
        assert!(!backend.shutdown().await);
        assert!(!backend.abort());
        assert!(backend.write(b"more").await.is_err());

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"abc");
    }
}
