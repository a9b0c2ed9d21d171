//! Producer relay loop, consumer registry, and broadcast fan-out for CTMP.
//!
//! This crate takes validated frames from one producer connection and writes
//! them, in order, to every connected consumer.
//!
//! ## Features
//!
//! - **Relay Loop**: Reads frames from the producer, drops frames with a bad
//!   checksum, and closes the producer on any structural failure
//! - **Consumer Registry**: Mutex-guarded, ordered set of consumer writers
//! - **Broadcast**: Full-write fan-out that evicts consumers which fail or stall
//! - **Consumer Lifecycle**: One task per consumer that deregisters on close
//! - **Listeners**: Source and destination TCP accept loops with shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use relay_session::{shutdown, ConsumerRegistry, Relay, RelayServer};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = Arc::new(ConsumerRegistry::new(Duration::from_secs(5)));
//! let relay = Arc::new(Relay::new(registry));
//! let (trigger, shutdown) = shutdown::channel();
//!
//! let server = RelayServer::bind(
//!     "0.0.0.0:33333".parse()?,
//!     "0.0.0.0:44444".parse()?,
//! )
//! .await?;
//!
//! let handle = tokio::spawn(server.run(relay.clone(), shutdown));
//!
//! tokio::signal::ctrl_c().await?;
//! trigger.trigger();
//! handle.await??;
//! println!("{}", relay.stats());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod stats;
pub mod transport;

// Re-export main types
pub use registry::{
    BroadcastReport, ConsumerId, ConsumerRegistry, ConsumerWriter, Registration, WriteFailure,
    DEFAULT_WRITE_TIMEOUT,
};
pub use relay::{ConsumerExit, Relay, RelayState};
pub use server::RelayServer;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use stats::{RelayStats, RelayStatsSnapshot};
pub use transport::{configure_stream, connect_tcp, listen_tcp};
