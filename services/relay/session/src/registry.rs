//! Consumer registry and broadcast fan-out.
//!
//! The registry is the only state shared between the relay loop and the
//! consumer lifecycles. A single async mutex covers every register,
//! unregister, and full broadcast pass, so a broadcast never races a removal
//! and two broadcasts never interleave writes to the same consumer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

/// Default bound on a single consumer write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity of one consumer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Raw numeric value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Why a consumer was removed during a broadcast
#[derive(Error, Debug)]
pub enum WriteFailure {
    /// The write or flush returned an error
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    /// The consumer did not accept the frame in time
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// Write side of a consumer connection
pub type ConsumerWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct ConsumerSlot {
    id: ConsumerId,
    writer: ConsumerWriter,
    evict_tx: Option<oneshot::Sender<WriteFailure>>,
}

/// Result of [`ConsumerRegistry::register`]
#[derive(Debug)]
pub struct Registration {
    /// Assigned identity
    pub id: ConsumerId,
    /// Resolves if a broadcast evicts this consumer
    pub evicted: oneshot::Receiver<WriteFailure>,
}

/// Outcome of one broadcast pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Consumers that accepted the whole frame
    pub delivered: usize,
    /// Consumers removed because their write failed
    pub dropped: Vec<ConsumerId>,
}

/// Ordered set of live consumer connections
pub struct ConsumerRegistry {
    slots: Mutex<Vec<ConsumerSlot>>,
    next_id: AtomicU64,
    write_timeout: Duration,
}

impl ConsumerRegistry {
    /// Create an empty registry
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            write_timeout,
        }
    }

    /// Bound applied to each consumer write
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Add a consumer. It receives every frame broadcast after this returns.
    pub async fn register<W>(&self, writer: W) -> Registration
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (evict_tx, evicted) = oneshot::channel();

        let mut slots = self.slots.lock().await;
        slots.push(ConsumerSlot {
            id,
            writer: Box::new(writer),
            evict_tx: Some(evict_tx),
        });
        debug!("Registered {} ({} active)", id, slots.len());

        Registration { id, evicted }
    }

    /// Remove a consumer. Returns false if it was already gone.
    pub async fn unregister(&self, id: ConsumerId) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.iter().position(|slot| slot.id == id) {
            Some(index) => {
                slots.remove(index);
                debug!("Unregistered {} ({} active)", id, slots.len());
                true
            }
            None => false,
        }
    }

    /// Write `frame` to every registered consumer in registration order.
    ///
    /// Consumers whose write fails or times out are removed and notified
    /// through their [`Registration::evicted`] channel; the rest still get
    /// the frame.
    pub async fn broadcast(&self, frame: &[u8]) -> BroadcastReport {
        let mut slots = self.slots.lock().await;
        let mut report = BroadcastReport::default();

        let mut index = 0;
        while index < slots.len() {
            match write_frame(&mut slots[index].writer, frame, self.write_timeout).await {
                Ok(()) => {
                    report.delivered += 1;
                    index += 1;
                }
                Err(failure) => {
                    let mut slot = slots.remove(index);
                    warn!("Evicting {}: {}", slot.id, failure);
                    report.dropped.push(slot.id);
                    if let Some(evict_tx) = slot.evict_tx.take() {
                        let _ = evict_tx.send(failure);
                    }
                }
            }
        }

        report
    }

    /// Number of registered consumers
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Whether no consumer is registered
    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Whether `id` is registered
    pub async fn contains(&self, id: ConsumerId) -> bool {
        self.slots.lock().await.iter().any(|slot| slot.id == id)
    }

    /// Registered consumers in broadcast order
    pub async fn ids(&self) -> Vec<ConsumerId> {
        self.slots.lock().await.iter().map(|slot| slot.id).collect()
    }
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_TIMEOUT)
    }
}

impl fmt::Debug for ConsumerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerRegistry")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

async fn write_frame(
    writer: &mut ConsumerWriter,
    frame: &[u8],
    limit: Duration,
) -> Result<(), WriteFailure> {
    let write = async {
        writer.write_all(frame).await?;
        writer.flush().await
    };

    match tokio::time::timeout(limit, write).await {
        Ok(result) => result.map_err(WriteFailure::from),
        Err(_) => Err(WriteFailure::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, DuplexStream};

    async fn read_exactly(stream: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = ConsumerRegistry::default();
        let (a, _a_peer) = tokio::io::duplex(64);
        let (b, _b_peer) = tokio::io::duplex(64);

        let first = registry.register(a).await;
        let second = registry.register(b).await;
        assert_ne!(first.id, second.id);
        assert_eq!(registry.ids().await, vec![first.id, second.id]);

        assert!(registry.unregister(first.id).await);
        assert!(!registry.unregister(first.id).await);
        assert!(!registry.contains(first.id).await);
        assert!(registry.contains(second.id).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_consumer() {
        let registry = ConsumerRegistry::default();
        let mut peers = Vec::new();
        for _ in 0..3 {
            let (local, peer) = tokio::io::duplex(1024);
            registry.register(local).await;
            peers.push(peer);
        }

        let report = registry.broadcast(b"frame-bytes").await;
        assert_eq!(report.delivered, 3);
        assert!(report.dropped.is_empty());

        for peer in &mut peers {
            assert_eq!(read_exactly(peer, 11).await, b"frame-bytes");
        }
    }

    #[tokio::test]
    async fn test_broadcast_with_no_consumers() {
        let registry = ConsumerRegistry::default();
        assert!(registry.is_empty().await);
        assert_eq!(registry.broadcast(b"x").await, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_closed_consumer_is_evicted_others_unaffected() {
        let registry = ConsumerRegistry::default();
        let (a, mut a_peer) = tokio::io::duplex(1024);
        let (b, b_peer) = tokio::io::duplex(1024);
        let (c, mut c_peer) = tokio::io::duplex(1024);

        let a = registry.register(a).await;
        let b = registry.register(b).await;
        let c = registry.register(c).await;
        drop(b_peer);

        let report = registry.broadcast(b"hello").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, vec![b.id]);
        assert_eq!(registry.ids().await, vec![a.id, c.id]);

        let failure = b.evicted.await.unwrap();
        assert!(matches!(failure, WriteFailure::Io(_)));

        assert_eq!(read_exactly(&mut a_peer, 5).await, b"hello");
        assert_eq!(read_exactly(&mut c_peer, 5).await, b"hello");

        let report = registry.broadcast(b"again").await;
        assert_eq!(report.delivered, 2);
        assert!(report.dropped.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_consumer_times_out() {
        let registry = ConsumerRegistry::new(Duration::from_millis(200));
        // Peer never reads and the pipe holds less than one frame
        let (slow, _slow_peer) = tokio::io::duplex(4);
        let (fast, mut fast_peer) = tokio::io::duplex(1024);

        let slow = registry.register(slow).await;
        let fast = registry.register(fast).await;

        let report = registry.broadcast(b"0123456789").await;
        assert_eq!(report.dropped, vec![slow.id]);
        assert_eq!(report.delivered, 1);
        assert!(matches!(
            slow.evicted.await.unwrap(),
            WriteFailure::Timeout(_)
        ));
        assert!(registry.contains(fast.id).await);
        assert_eq!(read_exactly(&mut fast_peer, 10).await, b"0123456789");
    }

    #[tokio::test]
    async fn test_late_registration_receives_only_later_frames() {
        let registry = ConsumerRegistry::default();
        let (early, mut early_peer) = tokio::io::duplex(1024);
        registry.register(early).await;

        registry.broadcast(b"one").await;

        let (late, mut late_peer) = tokio::io::duplex(1024);
        registry.register(late).await;
        registry.broadcast(b"two").await;

        assert_eq!(read_exactly(&mut early_peer, 6).await, b"onetwo");
        assert_eq!(read_exactly(&mut late_peer, 3).await, b"two");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_order_preserved_under_churn() {
        const FRAMES: usize = 200;
        let registry = Arc::new(ConsumerRegistry::default());

        let (steady, mut steady_peer) = tokio::io::duplex(64 * 1024);
        registry.register(steady).await;

        let churn_registry = registry.clone();
        let churn = tokio::spawn(async move {
            for _ in 0..100 {
                let (local, peer) = tokio::io::duplex(64 * 1024);
                let registration = churn_registry.register(local).await;
                tokio::task::yield_now().await;
                drop(peer);
                churn_registry.unregister(registration.id).await;
            }
        });

        let reader = tokio::spawn(async move {
            let mut received = vec![0u8; FRAMES * 4];
            steady_peer.read_exact(&mut received).await.unwrap();
            received
        });

        for i in 0..FRAMES {
            let frame = (i as u32).to_be_bytes();
            registry.broadcast(&frame).await;
        }
        churn.await.unwrap();

        let received = reader.await.unwrap();
        for (i, chunk) in received.chunks_exact(4).enumerate() {
            assert_eq!(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]), i as u32);
        }
    }
}
