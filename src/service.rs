/// Outer polling loop: read, batch, smooth, push
use log::{debug, error, info, warn};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::sleep;

use crate::aggregation::{Batch, BatchError};
use crate::config::Config;
use crate::influx::ReadingSink;
use crate::sensor::{DataLine, Decoder};
use crate::utils::{describe_reading, format_datetime};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("sensor read task failed: {0}")]
    Task(#[from] JoinError),
}

/// Poll the sensor until `shutdown` turns true.
///
/// Each read runs on tokio's blocking pool because the capture is a busy
/// wait. Once `sample_count` reads have succeeded their trimmed mean goes to
/// `sink`; a failed push is logged and the next batch starts regardless.
/// Shutdown is observed between reads and abandons a push still in flight,
/// but never interrupts a frame capture.
/// The decoder is handed back when the loop stops.
pub async fn run<L, S>(
    mut decoder: Decoder<L>,
    sink: &S,
    config: &Config,
    mut shutdown: watch::Receiver<bool>,
) -> Result<Decoder<L>, ServiceError>
where
    L: DataLine + Send + 'static,
    S: ReadingSink + ?Sized,
{
    let mut batch = Batch::with_capacity(config.sample_count)?;
    let mut attempts: u32 = 0;

    info!(
        "Sampling every {} ms, pushing the trimmed mean of {} readings",
        config.sample_interval.as_millis(),
        batch.capacity()
    );

    while !*shutdown.borrow() {
        let (returned, reading) = tokio::task::spawn_blocking(move || {
            let reading = decoder.attempt_read();
            (decoder, reading)
        })
        .await?;
        decoder = returned;
        attempts += 1;

        if let Some(reading) = reading {
            batch.push(reading)?;
            debug!(
                "Sample {}/{}: {}",
                batch.len(),
                batch.capacity(),
                describe_reading(&reading)
            );
        }

        if let Some(mean) = batch.take_aggregate() {
            info!(
                "Batch complete at {} after {} attempts: {}",
                format_datetime(&OffsetDateTime::now_utc()),
                attempts,
                describe_reading(&mean)
            );
            attempts = 0;

            tokio::select! {
                biased;
                result = sink.push(&mean) => match result {
                    Ok(()) => info!("Successfully stored reading"),
                    Err(e) => error!("Failed to store reading: {}", e),
                },
                _ = stop_requested(&mut shutdown) => {
                    warn!("Shutdown requested, dropping unsent reading {}", describe_reading(&mean));
                    break;
                }
            }
        }

        tokio::select! {
            _ = sleep(config.sample_interval) => {}
            changed = shutdown.changed() => {
                // A dropped sender can never signal again
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Sensor loop stopped");
    Ok(decoder)
}

/// Resolve once shutdown is set. A dropped sender never resolves.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
