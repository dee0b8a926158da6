//! wsb-client: example client for the WebSocket-to-TCP bridge.
//!
//! Sends one chat request per connection and collects the streamed
//! response tokens until the end-of-generation marker.
//!
//! # Quick Start
//!
//! ```no_run
//! use wsb_client::{BridgeClient, ClientConfig};
//!
//! # async fn example() -> wsb_core::BridgeResult<()> {
//! let client = BridgeClient::connect("ws://127.0.0.1:8080", ClientConfig::default()).await?;
//! let answer = client.request("Hello").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod decoder;

// Re-export primary public types.
pub use client::{BridgeClient, ClientConfig};
pub use decoder::ResponseDecoder;

// Re-export wsb-core types for convenience.
pub use wsb_core::{BridgeError, BridgeResult, ChatMessage};
