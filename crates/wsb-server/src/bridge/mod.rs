//! Bridge engine — pairs every accepted WebSocket with a fresh TCP
//! connection to the backend and relays between them.
//!
//! # Submodule Architecture
//!
//! - **[`pair`]** — [`BridgedPair`] and its explicit [`PairState`] machine,
//!   plus the [`PairOutcome`] recorded when a pair closes.
//! - **[`leg`]** — write-side wrappers for the two legs with idempotent
//!   close semantics.
//! - **[`relay`]** — the two relay directions and the teardown that follows
//!   whichever ends first.
//! - **[`limit`]** — the live-pair cap.
//!
//! # Data Flow
//!
//! ```text
//! start_listener (transport/websocket.rs)
//!   → BridgeEngine::serve           single accept loop
//!     → spawn BridgeEngine::on_accept   one task per pair
//!         → PairLimiter::try_acquire
//!         → TcpStream::connect (backend, with timeout)
//!         → relay::run              both directions + idle + shutdown
//! ```

pub mod leg;
pub mod limit;
pub mod pair;
pub mod relay;

pub use pair::{BridgedPair, PairOutcome, PairState};

use crate::config::BridgeConfig;
use crate::transport::websocket::{self, WebSocketConnection};
use futures_util::StreamExt;
use leg::{Backend, FrontEnd};
use limit::PairLimiter;
use relay::RelaySettings;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};
use wsb_core::{BridgeError, BridgeResult};

/// The bridge engine. Shared by the accept loop and every pair task; holds
/// no per-pair state.
pub struct BridgeEngine {
    config: BridgeConfig,
    next_pair_id: AtomicU64,
    limiter: PairLimiter,
    /// Broadcast sender for engine shutdown notification.
    shutdown_tx: broadcast::Sender<()>,
}

impl BridgeEngine {
    pub fn new(config: BridgeConfig) -> Self {
        let limiter = PairLimiter::new(config.max_pairs);
        Self {
            config,
            next_pair_id: AtomicU64::new(1),
            limiter,
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Number of pairs currently holding a slot.
    pub fn active_pairs(&self) -> usize {
        self.limiter.active()
    }

    /// Bind the front-end listener. Failure here is fatal to the process.
    pub async fn listen(&self) -> BridgeResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
        let addr = self.config.listen_addr().await?;
        websocket::start_listener(
            addr,
            websocket::ws_config(self.config.max_message_size),
            self.config.handshake_timeout,
        )
        .await
    }

    /// Accept loop: one spawned task per accepted connection. Returns when
    /// the listener goes away.
    pub async fn serve(self: Arc<Self>, mut incoming: mpsc::Receiver<WebSocketConnection>) {
        info!(
            backend = %self.config.backend_addr(),
            max_pairs = self.limiter.max_pairs(),
            "bridge ready"
        );

        while let Some(conn) = incoming.recv().await {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.on_accept(conn).await;
            });
        }

        info!("listener closed, accept loop ending");
    }

    /// Run one pair from accept to `Closed` and report how it ended.
    pub async fn on_accept(&self, conn: WebSocketConnection) -> PairOutcome {
        let id = self.next_pair_id.fetch_add(1, Ordering::Relaxed);
        let mut pair = BridgedPair::new(id, conn.remote_addr);
        debug!(pair = id, peer = %pair.peer, "front-end accepted");

        // Subscribe before connecting so a shutdown sent while the pair is
        // still Connecting is seen as soon as the relay starts.
        let shutdown_rx = self.shutdown_tx.subscribe();
        let outcome = match self.bridge(&mut pair, conn, shutdown_rx).await {
            Ok(outcome) => outcome,
            Err(e) => PairOutcome::FrontEndError(e.to_string()),
        };
        if let Err(e) = pair.finish() {
            warn!(pair = id, error = %e, "pair lifecycle violation");
        }

        if outcome.is_error() {
            warn!(
                pair = id,
                peer = %pair.peer,
                outcome = %outcome,
                bytes_up = pair.bytes_up,
                bytes_down = pair.bytes_down,
                "pair closed"
            );
        } else {
            info!(
                pair = id,
                peer = %pair.peer,
                outcome = %outcome,
                bytes_up = pair.bytes_up,
                bytes_down = pair.bytes_down,
                "pair closed"
            );
        }
        outcome
    }

    async fn bridge(
        &self,
        pair: &mut BridgedPair,
        conn: WebSocketConnection,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> BridgeResult<PairOutcome> {
        let (sink, front_rx) = conn.ws_stream.split();
        let mut front = FrontEnd::new(sink, self.config.outbound);

        let Some(_guard) = self.limiter.try_acquire() else {
            warn!(pair = pair.id, max_pairs = self.limiter.max_pairs(), "pair limit reached");
            front.close(CloseCode::Again, "too many connections").await;
            return Ok(PairOutcome::Rejected);
        };

        let backend_addr = self.config.backend_addr();
        let stream = match connect_backend(&backend_addr, self.config.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(pair = pair.id, backend = %backend_addr, error = %e, "backend connect failed");
                front.close(CloseCode::Error, "backend unavailable").await;
                return Ok(PairOutcome::ConnectFailed(e.to_string()));
            }
        };

        pair.transition(PairState::Active)?;
        info!(pair = pair.id, peer = %pair.peer, backend = %backend_addr, "pair established");

        let (backend_rx, writer) = stream.into_split();
        let settings = RelaySettings {
            read_buffer_size: self.config.read_buffer_size,
            idle_timeout: self.config.idle_timeout,
        };
        relay::run(
            pair,
            front_rx,
            front,
            backend_rx,
            Backend::new(writer),
            settings,
            shutdown_rx,
        )
        .await
    }

    /// Tell every live pair to close, then wait up to the configured grace
    /// period for them to finish. Returns how many were still live.
    pub async fn shutdown(&self) -> usize {
        info!(active = self.active_pairs(), "broadcasting shutdown to live pairs");
        let _ = self.shutdown_tx.send(());

        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            while self.active_pairs() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        let remaining = self.active_pairs();
        if drained.is_err() {
            warn!(remaining, "shutdown grace period elapsed with pairs still open");
        }
        remaining
    }
}

/// Open the backend leg. No retry: a failure is final for the pair.
async fn connect_backend(addr: &str, timeout: Duration) -> BridgeResult<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| BridgeError::Timeout)?
        .map_err(|e| BridgeError::BackendConnect {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(backend = %addr, error = %e, "could not set TCP_NODELAY");
    }
    Ok(stream)
}
