use log::{error, info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use rust_dht22_etl::config::Config;
use rust_dht22_etl::influx::InfluxClient;
use rust_dht22_etl::sensor::{Decoder, RpiLine};
use rust_dht22_etl::service;

/// Resolve once Ctrl+C or SIGTERM arrives.
async fn wait_for_shutdown() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to listen for SIGTERM: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
                terminate.recv().await;
            }
        }
        _ = terminate.recv() => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Without GPIO access there is nothing to do
    let line = match RpiLine::open(config.pin) {
        Ok(line) => line,
        Err(e) => {
            error!("Couldn't initialise GPIO: {}", e);
            return Err(e.into());
        }
    };

    let client = InfluxClient::new(&config.influx)?;
    let decoder = Decoder::new(line, config.decoder.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown requested, stopping after the current read");
        let _ = shutdown_tx.send(true);
    });

    info!(
        "DHT22 sensor on GPIO {} initialised, writing '{}' for location '{}'",
        config.pin, config.influx.measurement, config.influx.location
    );

    match service::run(decoder, &client, &config, shutdown_rx).await {
        Ok(_) => {
            info!("DHT22 sensor terminated");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {}", e);
            Err(e.into())
        }
    }
}
