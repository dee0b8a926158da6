//! The bridge chat client.
//!
//! One connection carries one request: the prompt goes out as a single
//! text message marked `eog`, and the response streams back as token
//! messages until one arrives with `eog` set.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use wsb_core::{BridgeError, BridgeResult, ChatMessage};

use crate::decoder::ResponseDecoder;

/// Client timeouts.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection (TCP + WebSocket handshake) timeout.
    pub connect_timeout: Duration,
    /// Longest wait for the next response message.
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// A single WebSocket connection to the bridge.
pub struct BridgeClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    decoder: ResponseDecoder,
    config: ClientConfig,
}

impl BridgeClient {
    /// Open a WebSocket connection to the bridge at `url`.
    pub async fn connect(url: &str, config: ClientConfig) -> BridgeResult<Self> {
        let (ws, _response) = time::timeout(config.connect_timeout, connect_async(url))
            .await
            .map_err(|_| BridgeError::Timeout)?
            .map_err(|e| BridgeError::Transport(format!("WS connect to {url} failed: {e}")))?;
        debug!(url, "connected to bridge");
        Ok(Self {
            ws,
            decoder: ResponseDecoder::new(),
            config,
        })
    }

    /// Send one chat message as a text frame.
    pub async fn send(&mut self, msg: &ChatMessage) -> BridgeResult<()> {
        let json = msg.to_json()?;
        self.ws
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| BridgeError::Transport(format!("WS send failed: {e}")))
    }

    /// Read messages until `eog`, concatenating their tokens.
    ///
    /// A connection closed before the marker ends the response early; the
    /// tokens seen so far are returned.
    pub async fn collect_response(&mut self) -> BridgeResult<String> {
        let mut text = String::new();
        loop {
            let next = time::timeout(self.config.read_timeout, self.ws.next())
                .await
                .map_err(|_| BridgeError::Timeout)?;
            let payload = match next {
                Some(Ok(Message::Text(t))) => t.as_bytes().to_vec(),
                Some(Ok(Message::Binary(b))) => b.to_vec(),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "bridge closed the connection");
                    return Ok(text);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(BridgeError::Transport(format!("WS recv failed: {e}")));
                }
                None => return Ok(text),
            };

            for msg in self.decoder.push(&payload)? {
                if msg.eog {
                    return Ok(text);
                }
                text.push_str(&msg.token);
            }
        }
    }

    /// Send `prompt`, collect the full response, then close.
    pub async fn request(mut self, prompt: &str) -> BridgeResult<String> {
        self.send(&ChatMessage::request(prompt)).await?;
        let response = self.collect_response().await;
        self.close().await;
        response
    }

    /// Close the connection (best effort).
    pub async fn close(mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "close handshake failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Spawn a one-shot WebSocket peer that answers the first request with
    /// `replies`, one message each, then closes.
    async fn fake_bridge(replies: Vec<&'static str>) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let request = match ws.next().await {
                Some(Ok(Message::Text(t))) => t.as_str().to_string(),
                other => panic!("expected text request, got {other:?}"),
            };
            for reply in replies {
                ws.send(Message::Binary(reply.as_bytes().to_vec().into()))
                    .await
                    .unwrap();
            }
            let _ = ws.close(None).await;
            request
        });
        (format!("ws://{addr}"), handle)
    }

    #[tokio::test]
    async fn test_request_collects_tokens_until_eog() {
        let (url, server) = fake_bridge(vec![
            r#"{"token":"Hel","eog":false}"#,
            r#"{"token":"lo","eog":false}{"token":" world","eog":false}"#,
            r#"{"token":"","eog":true}"#,
        ])
        .await;

        let client = BridgeClient::connect(&url, ClientConfig::default()).await.unwrap();
        let answer = client.request("Hello").await.unwrap();
        assert_eq!(answer, "Hello world");

        let request = server.await.unwrap();
        let sent = ChatMessage::from_json(request.as_bytes()).unwrap();
        assert_eq!(sent, ChatMessage::request("Hello"));
    }

    #[tokio::test]
    async fn test_response_split_mid_message() {
        let (url, _server) = fake_bridge(vec![
            r#"{"token":"par"#,
            r#"tial","eog":false}{"token":"","eog":true}"#,
        ])
        .await;

        let client = BridgeClient::connect(&url, ClientConfig::default()).await.unwrap();
        assert_eq!(client.request("x").await.unwrap(), "partial");
    }

    #[tokio::test]
    async fn test_close_before_eog_returns_partial_text() {
        let (url, server) = fake_bridge(vec![r#"{"token":"cut","eog":false}"#]).await;

        let mut client = BridgeClient::connect(&url, ClientConfig::default()).await.unwrap();
        client.send(&ChatMessage::request("x")).await.unwrap();
        server.await.unwrap();
        assert_eq!(client.collect_response().await.unwrap(), "cut");
    }

    #[tokio::test]
    async fn test_invalid_json_is_codec_error() {
        let (url, _server) = fake_bridge(vec!["not json at all"]).await;

        let client = BridgeClient::connect(&url, ClientConfig::default()).await.unwrap();
        let err = client.request("x").await.unwrap_err();
        assert!(matches!(err, BridgeError::Codec(_)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };
        let result = BridgeClient::connect(&format!("ws://{addr}"), ClientConfig::default()).await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));
    }
}
