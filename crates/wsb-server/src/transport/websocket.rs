//! WebSocket listener using tokio-tungstenite.
//!
//! A single accept loop owns the TCP listener and hands every upgraded
//! connection to the engine through a bounded channel, so pair creation is
//! serialized while pairs themselves run independently.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use wsb_core::{BridgeError, BridgeResult};

/// Accepted connections waiting for the engine.
const ACCEPT_QUEUE: usize = 64;

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    /// The upgraded WebSocket stream.
    pub ws_stream: WebSocketStream<TcpStream>,
    /// Remote address.
    pub remote_addr: SocketAddr,
}

/// Build the tungstenite config that caps inbound message and frame size.
pub fn ws_config(max_message_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_size);
    config.max_frame_size = Some(max_message_size);
    config
}

/// Start the WebSocket listener.
///
/// Returns the bound address (useful when binding port 0) and a receiver
/// that yields accepted connections. The accept loop stops once the
/// receiver is dropped. Bind failure is returned immediately. A client
/// that has not finished the upgrade within `handshake_timeout` is dropped.
pub async fn start_listener(
    bind_addr: SocketAddr,
    config: WebSocketConfig,
    handshake_timeout: Duration,
) -> BridgeResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|source| BridgeError::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(ACCEPT_QUEUE);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => {
                    debug!("connection receiver dropped, accept loop ending");
                    break;
                }
                result = tcp_listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                let upgrade = tokio_tungstenite::accept_async_with_config(stream, Some(config));
                                match tokio::time::timeout(handshake_timeout, upgrade).await {
                                    Ok(Ok(ws_stream)) => {
                                        debug!(remote = %addr, "WebSocket connection accepted");
                                        let conn = WebSocketConnection {
                                            ws_stream,
                                            remote_addr: addr,
                                        };
                                        if tx.send(conn).await.is_err() {
                                            warn!(remote = %addr, "WebSocket connection channel closed");
                                        }
                                    }
                                    Ok(Err(e)) => {
                                        warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                                    }
                                    Err(_) => {
                                        warn!(remote = %addr, timeout = ?handshake_timeout, "WebSocket handshake timed out");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "TCP accept failed");
                        }
                    }
                }
            }
        }
    });

    Ok((local_addr, rx))
}
