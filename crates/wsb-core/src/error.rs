use thiserror::Error;

/// Errors produced by the bridge and its example client.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend connect to {addr} failed: {reason}")]
    BackendConnect { addr: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid pair transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Codec(e.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
