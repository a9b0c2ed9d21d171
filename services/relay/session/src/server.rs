//! Source and destination listeners.
//!
//! The source listener serves one producer at a time: it accepts a
//! connection, relays it to completion, and only then accepts the next one.
//! The destination listener spawns a lifecycle task per consumer.

use crate::relay::Relay;
use crate::shutdown::Shutdown;
use crate::transport::{configure_stream, listen_tcp};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Bound source and destination listeners
#[derive(Debug)]
pub struct RelayServer {
    source: TcpListener,
    dest: TcpListener,
}

impl RelayServer {
    /// Bind both listeners
    pub async fn bind(source_addr: SocketAddr, dest_addr: SocketAddr) -> Result<Self> {
        let source = listen_tcp(source_addr)
            .await
            .with_context(|| format!("Failed to bind source listener on {}", source_addr))?;
        let dest = listen_tcp(dest_addr)
            .await
            .with_context(|| format!("Failed to bind destination listener on {}", dest_addr))?;

        Ok(Self { source, dest })
    }

    /// Address producers connect to
    pub fn source_addr(&self) -> std::io::Result<SocketAddr> {
        self.source.local_addr()
    }

    /// Address consumers connect to
    pub fn dest_addr(&self) -> std::io::Result<SocketAddr> {
        self.dest.local_addr()
    }

    /// Serve until shutdown is triggered or both listeners fail
    pub async fn run(self, relay: Arc<Relay>, shutdown: Shutdown) -> Result<()> {
        info!(
            "Relay serving producers on {} and consumers on {}",
            self.source_addr()?,
            self.dest_addr()?
        );

        let producers = tokio::spawn(serve_producers(self.source, relay.clone(), shutdown.clone()));
        let consumers = tokio::spawn(serve_consumers(self.dest, relay, shutdown));

        let (producers, consumers) = tokio::join!(producers, consumers);
        producers.context("Source listener task failed")?;
        consumers.context("Destination listener task failed")?;

        info!("Relay server stopped");
        Ok(())
    }
}

async fn serve_producers(listener: TcpListener, relay: Arc<Relay>, mut shutdown: Shutdown) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.wait() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                info!("Accepted producer connection from {}", peer);
                configure_stream(&stream);

                tokio::select! {
                    _ = shutdown.wait() => {
                        info!("Closing producer {} for shutdown", peer);
                        break;
                    }
                    error = relay.handle_producer_connection(stream, peer) => {
                        debug!("Producer session with {} ended: {}", peer, error);
                        info!("Waiting for new producer");
                    }
                }
            }
            Err(e) => {
                warn!("Source accept error: {}; stopping listener", e);
                break;
            }
        }
    }
    info!("Source listener stopped");
}

async fn serve_consumers(listener: TcpListener, relay: Arc<Relay>, mut shutdown: Shutdown) {
    let mut lifecycles = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            Some(_) = lifecycles.join_next(), if !lifecycles.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted consumer connection from {}", peer);
                    configure_stream(&stream);
                    let relay = relay.clone();
                    let shutdown = shutdown.clone();
                    lifecycles.spawn(async move {
                        relay.handle_consumer_connection(stream, peer, shutdown).await
                    });
                }
                Err(e) => {
                    warn!("Destination accept error: {}; stopping listener", e);
                    break;
                }
            }
        }
    }

    while lifecycles.join_next().await.is_some() {}
    info!("Destination listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConsumerRegistry;
    use crate::relay::RelayState;
    use crate::shutdown;
    use crate::transport::connect_tcp;
    use bytes::Bytes;
    use relay_wire::FrameBuilder;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    struct Harness {
        relay: Arc<Relay>,
        source: SocketAddr,
        dest: SocketAddr,
        trigger: shutdown::ShutdownTrigger,
        server: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start() -> Harness {
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = RelayServer::bind(any, any).await.unwrap();
        let source = server.source_addr().unwrap();
        let dest = server.dest_addr().unwrap();

        let relay = Arc::new(Relay::new(Arc::new(ConsumerRegistry::default())));
        let (trigger, shutdown) = shutdown::channel();
        let server = tokio::spawn(server.run(relay.clone(), shutdown));

        Harness {
            relay,
            source,
            dest,
            trigger,
            server,
        }
    }

    async fn connect_consumers(h: &Harness, count: usize) -> Vec<TcpStream> {
        let mut consumers = Vec::new();
        for _ in 0..count {
            consumers.push(connect_tcp(h.dest).await.unwrap());
        }
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.relay.registry().len().await != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        consumers
    }

    async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_end_to_end_ordered_fan_out() {
        let h = start().await;
        let mut consumers = connect_consumers(&h, 3).await;

        let frames: Vec<Bytes> = (0..3)
            .map(|i| {
                FrameBuilder::new(Bytes::from(format!("F{}", i + 1)))
                    .sensitive(i == 1)
                    .build()
                    .unwrap()
            })
            .collect();

        let mut producer = connect_tcp(h.source).await.unwrap();
        for frame in &frames {
            producer.write_all(frame).await.unwrap();
        }

        let expected: Vec<u8> = frames.iter().flat_map(|f| f.to_vec()).collect();
        for consumer in &mut consumers {
            assert_eq!(read_exactly(consumer, expected.len()).await, expected);
        }

        h.trigger.trigger();
        h.server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_producer_reconnects_after_structural_failure() {
        let h = start().await;
        let mut consumers = connect_consumers(&h, 1).await;
        let consumer = &mut consumers[0];

        let mut producer = connect_tcp(h.source).await.unwrap();
        let bad = FrameBuilder::new(Bytes::from_static(b"bad")).magic(0x00).build().unwrap();
        producer.write_all(&bad).await.unwrap();

        // The relay closes the connection on a bad magic byte
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(5), producer.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        let mut states = h.relay.subscribe_state();
        states
            .wait_for(|state| *state == RelayState::AwaitingProducer)
            .await
            .unwrap();

        let mut producer = connect_tcp(h.source).await.unwrap();
        let good = FrameBuilder::new(Bytes::from_static(b"recovered")).build().unwrap();
        producer.write_all(&good).await.unwrap();
        assert_eq!(read_exactly(consumer, good.len()).await, good);

        assert_eq!(h.relay.stats().producer_rejections, 1);
        h.trigger.trigger();
        h.server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_active_producer() {
        let h = start().await;
        let mut producer = connect_tcp(h.source).await.unwrap();

        let mut states = h.relay.subscribe_state();
        states
            .wait_for(|state| matches!(state, RelayState::Relaying { .. }))
            .await
            .unwrap();

        h.trigger.trigger();
        h.server.await.unwrap().unwrap();

        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(5), producer.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(h.relay.state(), RelayState::AwaitingProducer);
    }

    #[tokio::test]
    async fn test_disconnected_consumer_is_pruned() {
        let h = start().await;
        let mut consumers = connect_consumers(&h, 2).await;
        let gone = consumers.pop().unwrap();
        let mut survivor = consumers.pop().unwrap();
        drop(gone);

        tokio::time::timeout(Duration::from_secs(5), async {
            while h.relay.registry().len().await != 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let mut producer = connect_tcp(h.source).await.unwrap();
        let frame = FrameBuilder::new(Bytes::from_static(b"still here")).build().unwrap();
        producer.write_all(&frame).await.unwrap();
        assert_eq!(read_exactly(&mut survivor, frame.len()).await, frame);

        h.trigger.trigger();
        h.server.await.unwrap().unwrap();
    }
}
