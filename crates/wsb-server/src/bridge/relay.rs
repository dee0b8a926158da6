//! Bidirectional relay for one pair.
//!
//! Both directions are futures polled by a single `select!` inside the
//! pair's task, together with the idle and shutdown watchers. The first
//! branch to finish decides the outcome; the others are dropped on the
//! spot, which is what stops the opposite direction. Each direction keeps
//! at most one payload in flight: the next read is only issued once the
//! previous write has completed.

use super::leg::{Backend, FrontEnd};
use super::pair::{BridgedPair, PairOutcome, PairState};
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use std::future::pending;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;
use wsb_core::BridgeResult;

pub type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Per-pair relay knobs taken from the bridge config.
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub read_buffer_size: usize,
    pub idle_timeout: Option<Duration>,
}

/// How one direction of the relay stopped.
#[derive(Debug)]
enum LegEnd {
    /// The reading side closed cleanly.
    SourceClosed,
    SourceError(String),
    SinkError(String),
}

/// Last time a payload crossed the pair, in either direction.
struct Activity {
    origin: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_ms.store(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }
}

/// Run an `Active` pair until either leg ends, then tear both legs down.
///
/// Leaves the pair in `Closing`; the caller moves it to `Closed` once the
/// connections are dropped.
pub async fn run(
    pair: &mut BridgedPair,
    mut front_rx: WsSource,
    mut front: FrontEnd,
    mut backend_rx: OwnedReadHalf,
    mut backend: Backend,
    settings: RelaySettings,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> BridgeResult<PairOutcome> {
    let activity = Activity::new();
    let pair_id = pair.id;

    let outcome = {
        let BridgedPair {
            bytes_up,
            bytes_down,
            ..
        } = &mut *pair;

        tokio::select! {
            end = front_to_backend(&mut front_rx, &mut backend, &activity, bytes_up) => match end {
                LegEnd::SourceClosed => PairOutcome::FrontEndClosed,
                LegEnd::SourceError(e) => PairOutcome::FrontEndError(e),
                LegEnd::SinkError(e) => PairOutcome::BackendError(e),
            },
            end = backend_to_front(&mut backend_rx, &mut front, settings.read_buffer_size, &activity, bytes_down) => match end {
                LegEnd::SourceClosed => PairOutcome::BackendClosed,
                LegEnd::SourceError(e) => PairOutcome::BackendError(e),
                LegEnd::SinkError(e) => PairOutcome::FrontEndError(e),
            },
            _ = idle_expired(&activity, settings.idle_timeout) => PairOutcome::IdleTimeout,
            _ = shutdown_requested(&mut shutdown_rx) => PairOutcome::Shutdown,
        }
    };

    pair.transition(PairState::Closing)?;
    debug!(pair = pair_id, outcome = %outcome, "relay stopped, closing legs");

    match &outcome {
        PairOutcome::FrontEndClosed => {
            backend.shutdown().await;
            // Completes the close handshake the client started.
            front.close(CloseCode::Normal, "").await;
        }
        PairOutcome::BackendClosed => {
            front.close(CloseCode::Normal, "backend closed").await;
            backend.shutdown().await;
        }
        PairOutcome::FrontEndError(_) => {
            front.abort();
            backend.abort();
        }
        PairOutcome::BackendError(_) => {
            backend.abort();
            front.close(CloseCode::Error, "backend error").await;
        }
        PairOutcome::IdleTimeout => {
            backend.shutdown().await;
            front.close(CloseCode::Away, "idle timeout").await;
        }
        PairOutcome::Shutdown => {
            backend.shutdown().await;
            front.close(CloseCode::Away, "bridge shutting down").await;
        }
        PairOutcome::Rejected | PairOutcome::ConnectFailed(_) => {}
    }

    Ok(outcome)
}

/// Front-end → backend: every data message is written verbatim, in order.
async fn front_to_backend(
    source: &mut WsSource,
    backend: &mut Backend,
    activity: &Activity,
    relayed: &mut u64,
) -> LegEnd {
    loop {
        let written = match source.next().await {
            Some(Ok(Message::Binary(data))) => backend.write(&data).await.map(|_| data.len()),
            Some(Ok(Message::Text(text))) => backend
                .write(text.as_bytes())
                .await
                .map(|_| text.len()),
            Some(Ok(Message::Close(_))) | None => return LegEnd::SourceClosed,
            // Ping/pong are answered by tungstenite and never relayed.
            Some(Ok(_)) => continue,
            Some(Err(e)) => return LegEnd::SourceError(format!("WS recv failed: {e}")),
        };
        match written {
            Ok(n) => {
                *relayed += n as u64;
                activity.touch();
            }
            Err(e) => return LegEnd::SinkError(e.to_string()),
        }
    }
}

/// Backend → front-end: every read becomes exactly one message.
async fn backend_to_front(
    source: &mut OwnedReadHalf,
    front: &mut FrontEnd,
    read_buffer_size: usize,
    activity: &Activity,
    relayed: &mut u64,
) -> LegEnd {
    let mut buf = vec![0u8; read_buffer_size];
    loop {
        match source.read(&mut buf).await {
            Ok(0) => return LegEnd::SourceClosed,
            Ok(n) => {
                if let Err(e) = front.send_chunk(&buf[..n]).await {
                    return LegEnd::SinkError(e.to_string());
                }
                *relayed += n as u64;
                activity.touch();
            }
            Err(e) => return LegEnd::SourceError(format!("TCP read failed: {e}")),
        }
    }
}

async fn idle_expired(activity: &Activity, timeout: Option<Duration>) {
    let Some(timeout) = timeout else {
        return pending().await;
    };
    loop {
        let deadline = activity.last() + timeout;
        if deadline <= Instant::now() {
            return;
        }
        tokio::time::sleep_until(deadline).await;
    }
}

async fn shutdown_requested(rx: &mut broadcast::Receiver<()>) {
    match rx.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        // Engine gone without a shutdown signal: nothing to wait for.
        Err(broadcast::error::RecvError::Closed) => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_idle_fires_after_quiet_period() {
        let activity = Activity::new();
        let started = Instant::now();
        idle_expired(&activity, Some(Duration::from_secs(5))).await;
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_pushes_idle_deadline() {
        let activity = Activity::new();
        let started = Instant::now();
        let idle = idle_expired(&activity, Some(Duration::from_secs(5)));
        let touch = async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            activity.touch();
        };
        tokio::join!(idle, touch);
        assert!(started.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_disabled_never_fires() {
        let activity = Activity::new();
        let fired = tokio::time::timeout(
            Duration::from_secs(3600),
            idle_expired(&activity, None),
        )
        .await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_not_a_shutdown() {
        let (tx, mut rx) = broadcast::channel::<()>(1);
        drop(tx);
        let fired =
            tokio::time::timeout(Duration::from_millis(50), shutdown_requested(&mut rx)).await;
        assert!(fired.is_err());
    }
}
