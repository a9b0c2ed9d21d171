//! Producer relay loop and consumer lifecycle.
//!
//! [`Relay`] ties the frame reader to the consumer registry. One task drives
//! [`Relay::handle_producer_connection`] for the current producer; every
//! consumer connection gets its own task running
//! [`Relay::handle_consumer_connection`]. The two sides meet only in the
//! registry.

use crate::registry::{ConsumerRegistry, Registration};
use crate::shutdown::Shutdown;
use crate::stats::{RelayStats, RelayStatsSnapshot};
use relay_wire::{ErrorKind, FrameError, FrameReader};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Where the relay loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// No producer connected
    AwaitingProducer,
    /// Reading frames from `peer`
    Relaying {
        /// Producer address
        peer: SocketAddr,
    },
}

/// Why a consumer lifecycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// Remote end closed the connection or a read failed
    Closed,
    /// A broadcast write failed and the registry dropped the consumer
    Evicted,
    /// Process shutdown
    Shutdown,
}

/// Single-producer, multi-consumer frame relay
pub struct Relay {
    registry: Arc<ConsumerRegistry>,
    reader: FrameReader,
    stats: RelayStats,
    state: watch::Sender<RelayState>,
    producer: Mutex<()>,
}

impl Relay {
    /// Create a relay broadcasting into `registry`
    pub fn new(registry: Arc<ConsumerRegistry>) -> Self {
        let (state, _) = watch::channel(RelayState::AwaitingProducer);
        Self {
            registry,
            reader: FrameReader::new(),
            stats: RelayStats::new(),
            state,
            producer: Mutex::new(()),
        }
    }

    /// Consumer registry shared with the lifecycles
    pub fn registry(&self) -> &Arc<ConsumerRegistry> {
        &self.registry
    }

    /// Current relay state
    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Observe relay state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    /// Counter snapshot
    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Relay frames from one producer connection until it fails.
    ///
    /// Frames failing the checksum are dropped and the loop keeps reading.
    /// Any other error ends the session and is returned; the caller closes
    /// the connection by dropping `stream`. Concurrent calls are serialised so
    /// only one producer is relayed at a time.
    pub async fn handle_producer_connection<S>(&self, mut stream: S, peer: SocketAddr) -> FrameError
    where
        S: AsyncRead + Unpin,
    {
        let _producer = self.producer.lock().await;
        let _state = StateGuard::relaying(&self.state, peer);
        self.stats.record_producer_session();
        info!("Producer {} connected, relaying", peer);

        let error = loop {
            match self.reader.read_frame(&mut stream).await {
                Ok(frame) => {
                    let report = self.registry.broadcast(frame.as_bytes()).await;
                    self.stats.record_relayed(frame.len(), report.dropped.len());
                    debug!(
                        "Relayed {} byte frame from {} to {} consumers ({} dropped)",
                        frame.len(),
                        peer,
                        report.delivered,
                        report.dropped.len()
                    );
                }
                Err(e) if !e.is_connection_fatal() => {
                    self.stats.record_dropped();
                    warn!("Dropping frame from {}: {}", peer, e);
                }
                Err(e) => break e,
            }
        };

        match error.kind() {
            ErrorKind::Stream => {
                self.stats.record_producer_disconnect();
                info!("Producer {} disconnected: {}", peer, error);
            }
            _ => {
                self.stats.record_producer_rejection();
                warn!("Closing producer {} after invalid frame: {}", peer, error);
            }
        }

        error
    }

    /// Keep a consumer registered until it closes, is evicted, or the
    /// process shuts down. The consumer is always unregistered on return.
    pub async fn handle_consumer_connection<S>(
        &self,
        stream: S,
        peer: SocketAddr,
        mut shutdown: Shutdown,
    ) -> ConsumerExit
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let Registration { id, mut evicted } = self.registry.register(writer).await;
        self.stats.record_consumer_connected();
        info!("Consumer {} connected from {}", id, peer);

        let exit = tokio::select! {
            result = wait_for_close(&mut reader) => {
                match result {
                    Ok(()) => info!("Consumer {} ({}) closed the connection", id, peer),
                    Err(e) => info!("Consumer {} ({}) read error: {}", id, peer, e),
                }
                ConsumerExit::Closed
            }
            failure = &mut evicted => {
                if let Ok(failure) = failure {
                    info!("Consumer {} ({}) evicted: {}", id, peer, failure);
                }
                ConsumerExit::Evicted
            }
            _ = shutdown.wait() => {
                debug!("Releasing consumer {} ({}) for shutdown", id, peer);
                ConsumerExit::Shutdown
            }
        };

        self.registry.unregister(id).await;
        exit
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("state", &self.state())
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

/// Drain and discard whatever the consumer sends until end-of-stream
async fn wait_for_close<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 512];
    loop {
        if reader.read(&mut scratch).await? == 0 {
            return Ok(());
        }
    }
}

/// Publishes `Relaying` on creation and `AwaitingProducer` on drop, so a
/// cancelled producer session still resets the state.
struct StateGuard<'a> {
    state: &'a watch::Sender<RelayState>,
}

impl<'a> StateGuard<'a> {
    fn relaying(state: &'a watch::Sender<RelayState>, peer: SocketAddr) -> Self {
        state.send_replace(RelayState::Relaying { peer });
        Self { state }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(RelayState::AwaitingProducer);
    }
}
