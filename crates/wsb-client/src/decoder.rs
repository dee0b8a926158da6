//! Incremental decoder for streamed chat messages.
//!
//! The bridge forwards whatever each backend read returned, so one
//! WebSocket message may carry several JSON objects, or only part of one.
//! The decoder buffers bytes and yields every complete message.

use wsb_core::{BridgeError, BridgeResult, ChatMessage};

#[derive(Debug, Default)]
pub struct ResponseDecoder {
    buf: Vec<u8>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every message completed by them.
    ///
    /// A syntax error discards the buffered bytes.
    pub fn push(&mut self, data: &[u8]) -> BridgeResult<Vec<ChatMessage>> {
        self.buf.extend_from_slice(data);

        let mut messages = Vec::new();
        let mut consumed = 0;
        let mut failure = None;
        {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buf).into_iter::<ChatMessage>();
            loop {
                match stream.next() {
                    Some(Ok(msg)) => {
                        messages.push(msg);
                        consumed = stream.byte_offset();
                    }
                    // Incomplete trailing object: wait for more bytes.
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        failure = Some(e);
                        break;
                    }
                    None => {
                        consumed = self.buf.len();
                        break;
                    }
                }
            }
        }

        if let Some(e) = failure {
            self.buf.clear();
            return Err(BridgeError::from(e));
        }
        self.buf.drain(..consumed);
        Ok(messages)
    }

    /// Bytes held back waiting for the rest of a message.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
