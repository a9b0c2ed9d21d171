//! CTMP relay binary.
//!
//! Accepts one producer on the source port and fans every validated frame out
//! to all consumers connected on the destination port.

use clap::Parser;
use relay_session::{shutdown, ConsumerRegistry, Relay, RelayServer, Shutdown};
use std::{net::IpAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[macro_use]
mod logging;
mod config;

use config::{apply_nonzero_duration, RelayConfig};
use logging::RelayLogFormatter;

/// CTMP frame relay
#[derive(Parser, Debug)]
#[command(name = "ctmp-relay", version, about = "CTMP frame relay: one producer, many consumers")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Address both listeners bind to, e.g. 0.0.0.0
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Port producers connect to
    #[arg(long)]
    source_port: Option<u16>,

    /// Port consumers connect to
    #[arg(long)]
    dest_port: Option<u16>,

    /// Per-consumer write timeout, e.g. 5s
    #[arg(long)]
    write_timeout: Option<humantime::Duration>,

    /// Statistics log interval, e.g. 60s
    #[arg(long)]
    stats_interval: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply_to(&self, config: &mut RelayConfig) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(port) = self.source_port {
            config.source_port = port;
        }
        if let Some(port) = self.dest_port {
            config.dest_port = port;
        }
        if let Some(timeout) = self.write_timeout {
            apply_nonzero_duration("--write-timeout", timeout.into(), &mut config.write_timeout);
        }
        if let Some(interval) = self.stats_interval {
            apply_nonzero_duration("--stats-interval", interval.into(), &mut config.stats_interval);
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("ctmp_relay={}", args.log_level).parse()?)
        .add_directive(format!("relay_session={}", args.log_level).parse()?)
        .add_directive(format!("relay_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(RelayLogFormatter::new("relay".to_string()))
        .init();

    info!("Starting CTMP relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = RelayConfig::load_from_file(&args.config)?;
    args.apply_to(&mut config);

    let registry = Arc::new(ConsumerRegistry::new(config.write_timeout));
    let relay = Arc::new(Relay::new(registry));
    let server = RelayServer::bind(config.source_addr(), config.dest_addr()).await?;

    let (trigger, shutdown) = shutdown::channel();
    let mut server_handle = tokio::spawn(server.run(relay.clone(), shutdown.clone()));
    let reporter = tokio::spawn(report_stats(relay.clone(), config.stats_interval, shutdown));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGINT handler: {}", e))?;

    let early_exit = tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM signal, shutting down");
            None
        }
        _ = sigint.recv() => {
            info!("Received SIGINT signal, shutting down");
            None
        }
        result = &mut server_handle => Some(result),
    };

    trigger.trigger();

    let result = match early_exit {
        Some(result) => result,
        None => server_handle.await,
    };
    if let Err(e) = reporter.await {
        error!("Statistics reporter failed: {}", e);
    }

    component_info!("stats", "Final statistics: {}", relay.stats());

    match result {
        Ok(Ok(())) => {
            info!("CTMP relay stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Relay server failed: {:#}", e);
            Err(e)
        }
        Err(e) => Err(anyhow::anyhow!("Relay server task panicked: {}", e)),
    }
}

async fn report_stats(relay: Arc<Relay>, period: Duration, mut shutdown: Shutdown) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                let consumers = relay.registry().len().await;
                component_info!(
                    "stats",
                    "state={:?} consumers={} {}",
                    relay.state(),
                    consumers,
                    relay.stats()
                );
            }
        }
    }
}
