//! Analytics simulator - drives synthetic traffic through the batching client
//!
//! This service generates simulated analytics messages, enqueues them on an
//! [`analytics_batcher::Client`] and lets its consumers deliver them in
//! batches to the configured HTTP endpoint.
//!
//! ## Configuration
//!
//! Configuration is loaded from `ANALYTICS_*` environment variables (see
//! [`analytics_batcher::Config::from_env`]). Additionally:
//!
//! - `SIMULATOR_RATE_MS`: Milliseconds between generated messages (default: 50)
//! - `RUST_LOG`: Logging level filter (default: info, or debug with `ANALYTICS_DEBUG`)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use analytics_batcher::simulator::EventGenerator;
use analytics_batcher::{Client, ClientError, Config};

/// Default message generation interval in milliseconds
const DEFAULT_GENERATION_INTERVAL_MS: u64 = 50;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => {
            init_tracing(config.debug);
            info!(
                source_id = %config.source_id,
                destination = %config.destination,
                endpoint = %config.endpoint,
                upload_size = config.upload_size,
                upload_interval_ms = config.upload_interval.as_millis() as u64,
                retries = config.retries,
                consumers = config.consumers,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            init_tracing(false);
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let shutdown_timeout = config.flush_timeout + Duration::from_secs(5);
    let dropped = Arc::new(AtomicUsize::new(0));
    let dropped_clone = dropped.clone();

    let client = match Client::from_config(config) {
        Ok(client) => Arc::new(client.with_error_handler(move |err, messages| {
            dropped_clone.fetch_add(messages.len(), Ordering::Relaxed);
            warn!(error = %err, messages = messages.len(), "Batch dropped");
        })),
        Err(e) => {
            error!(error = %e, "Failed to create analytics client");
            std::process::exit(1);
        }
    };
    client.start();

    let (stop_tx, stop_rx) = watch::channel(false);
    let generator_client = client.clone();
    let generator_handle = tokio::spawn(async move {
        info!("Generator task started");
        run_generator(EventGenerator::with_defaults(), generator_client, stop_rx).await;
        info!("Generator task completed");
    });

    info!("Analytics simulator running. Press Ctrl+C to stop.");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping..."),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    let _ = stop_tx.send(true);
    if let Err(e) = generator_handle.await {
        warn!(error = %e, "Generator task panicked during shutdown");
    }

    match tokio::time::timeout(shutdown_timeout, client.shutdown()).await {
        Ok(Ok(())) => info!("Client shut down gracefully"),
        Ok(Err(ClientError::FlushTimeout { pending })) => {
            warn!(pending = pending, "Shutdown finished with undelivered messages");
        }
        Ok(Err(e)) => warn!(error = %e, "Client shutdown failed"),
        Err(_) => warn!("Client shutdown timed out after {:?}", shutdown_timeout),
    }

    info!(
        dropped = dropped.load(Ordering::Relaxed),
        "Analytics simulator stopped"
    );
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn generation_interval() -> Duration {
    let ms = std::env::var("SIMULATOR_RATE_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_GENERATION_INTERVAL_MS);
    Duration::from_millis(ms)
}

/// Enqueue generated messages on a fixed tick until `stop` flips to true.
async fn run_generator(generator: EventGenerator, client: Arc<Client>, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(generation_interval());
    let mut generated: u64 = 0;
    let mut last_report_time = std::time::Instant::now();
    let report_interval = Duration::from_secs(30);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }

        let message = generator.generate();
        let kind = message.kind();
        match message.send(&client) {
            Ok(_) => {
                generated += 1;

                if last_report_time.elapsed() >= report_interval {
                    info!(
                        generated = generated,
                        queued = client.queued(),
                        rate = format!("{:.1}/s", generated as f64 / last_report_time.elapsed().as_secs_f64()),
                        "Generator progress"
                    );
                    generated = 0;
                    last_report_time = std::time::Instant::now();
                }
            }
            Err(ClientError::ShuttingDown) => {
                info!("Client shutting down, generator stopping");
                break;
            }
            Err(e) => warn!(kind = kind.name(), error = %e, "Failed to enqueue message"),
        }
    }
}
