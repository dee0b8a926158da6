//! wsb-core: shared pieces of the WebSocket-to-TCP bridge.
//!
//! Provides the error type used across the workspace and the JSON chat
//! message model spoken by the example client. The bridge itself never
//! looks inside payloads.

pub mod error;
pub mod message;

// Re-export commonly used items at crate root.
pub use error::{BridgeError, BridgeResult};
pub use message::ChatMessage;
