//! The bridged pair: one front-end WebSocket coupled with one backend TCP
//! connection, plus the explicit lifecycle state between them.

use std::fmt;
use std::net::SocketAddr;
use tracing::debug;
use wsb_core::{BridgeError, BridgeResult};

/// Lifecycle of a [`BridgedPair`].
///
/// ```text
/// Connecting --backend connect succeeds--> Active
/// Connecting --backend connect fails-----> Closed
/// Active     --either leg closes/errors--> Closing
/// Closing    --both legs released--------> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl PairState {
    pub fn as_str(self) -> &'static str {
        match self {
            PairState::Connecting => "connecting",
            PairState::Active => "active",
            PairState::Closing => "closing",
            PairState::Closed => "closed",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition(self, next: PairState) -> bool {
        matches!(
            (self, next),
            (PairState::Connecting, PairState::Active)
                | (PairState::Connecting, PairState::Closed)
                | (PairState::Active, PairState::Closing)
                | (PairState::Closing, PairState::Closed)
        )
    }
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pair reached [`PairState::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// The front-end closed cleanly; the backend was closed in turn.
    FrontEndClosed,
    /// The backend closed cleanly; the front-end was closed in turn.
    BackendClosed,
    FrontEndError(String),
    BackendError(String),
    /// Nothing crossed the pair for the configured idle timeout.
    IdleTimeout,
    /// The engine is shutting down.
    Shutdown,
    /// The pair was refused before a backend connect was attempted.
    Rejected,
    ConnectFailed(String),
}

impl PairOutcome {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            PairOutcome::FrontEndError(_)
                | PairOutcome::BackendError(_)
                | PairOutcome::ConnectFailed(_)
        )
    }
}

impl fmt::Display for PairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairOutcome::FrontEndClosed => f.write_str("front-end closed"),
            PairOutcome::BackendClosed => f.write_str("backend closed"),
            PairOutcome::FrontEndError(e) => write!(f, "front-end error: {e}"),
            PairOutcome::BackendError(e) => write!(f, "backend error: {e}"),
            PairOutcome::IdleTimeout => f.write_str("idle timeout"),
            PairOutcome::Shutdown => f.write_str("shutdown"),
            PairOutcome::Rejected => f.write_str("rejected"),
            PairOutcome::ConnectFailed(e) => write!(f, "backend connect failed: {e}"),
        }
    }
}

/// Bookkeeping for one bridged connection pair.
///
/// Owned exclusively by the task that runs the pair; nothing else reads or
/// mutates it.
#[derive(Debug)]
pub struct BridgedPair {
    /// Engine-assigned identifier, unique for the process lifetime.
    pub id: u64,
    /// Remote address of the front-end client.
    pub peer: SocketAddr,
    state: PairState,
    /// Payload bytes relayed front-end → backend.
    pub bytes_up: u64,
    /// Payload bytes relayed backend → front-end.
    pub bytes_down: u64,
}

impl BridgedPair {
    pub fn new(id: u64, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            state: PairState::Connecting,
            bytes_up: 0,
            bytes_down: 0,
        }
    }

    pub fn state(&self) -> PairState {
        self.state
    }

    /// Move to `next`, rejecting edges outside the lifecycle graph.
    pub fn transition(&mut self, next: PairState) -> BridgeResult<()> {
        if !self.state.can_transition(next) {
            return Err(BridgeError::InvalidTransition {
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        debug!(pair = self.id, from = %self.state, to = %next, "pair state change");
        self.state = next;
        Ok(())
    }

    /// Drive the pair to `Closed` from whatever state it is in.
    ///
    /// A no-op once already closed.
    pub fn finish(&mut self) -> BridgeResult<()> {
        match self.state {
            PairState::Closed => Ok(()),
            PairState::Active => {
                self.transition(PairState::Closing)?;
                self.transition(PairState::Closed)
            }
            PairState::Connecting | PairState::Closing => self.transition(PairState::Closed),
        }
    }
}
