//! Front-end transport: the WebSocket listener.

pub mod websocket;
