//! Chat message model used by the example request/response client.
//!
//! A message is a JSON object with a text `token` and an end-of-generation
//! flag `eog`. A request is a single message with `eog = true`; a response
//! is a sequence of token messages terminated by one with `eog = true`.

use crate::error::BridgeResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub token: String,
    #[serde(default)]
    pub eog: bool,
}

impl ChatMessage {
    /// A request: the whole prompt in one message, marked as final.
    pub fn request(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            eog: true,
        }
    }

    /// A partial response token.
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            eog: false,
        }
    }

    /// The end-of-response marker.
    pub fn end() -> Self {
        Self {
            token: String::new(),
            eog: true,
        }
    }

    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &[u8]) -> BridgeResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;

    #[test]
    fn request_is_marked_final() {
        let msg = ChatMessage::request("Hello");
        assert_eq!(msg.token, "Hello");
        assert!(msg.eog);
    }

    #[test]
    fn json_field_names() {
        let json = ChatMessage::request("Hello").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["token"], "Hello");
        assert_eq!(value["eog"], true);
    }

    #[test]
    fn parse_token_message() {
        let msg = ChatMessage::from_json(br#"{"token":" world","eog":false}"#).unwrap();
        assert_eq!(msg, ChatMessage::token(" world"));
    }

    #[test]
    fn missing_eog_defaults_to_false() {
        let msg = ChatMessage::from_json(br#"{"token":"x"}"#).unwrap();
        assert!(!msg.eog);
    }

    #[test]
    fn end_marker_has_empty_token() {
        let msg = ChatMessage::end();
        assert!(msg.token.is_empty());
        assert!(msg.eog);
    }

    #[test]
    fn garbage_is_codec_error() {
        let err = ChatMessage::from_json(b"not json").unwrap_err();
        assert!(matches!(err, BridgeError::Codec(_)));
    }
}
