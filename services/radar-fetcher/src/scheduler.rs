//! Interval scheduler driving all product trackers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::tracker::{Measurement, ProductTracker, UpdateError};

/// Why a scheduled cycle produced no measurement.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("Update of {product} timed out after {timeout:?}")]
    TimedOut { product: String, timeout: Duration },
}

/// Result of one product's cycle within a scheduler run.
#[derive(Debug)]
pub struct CycleReport {
    pub product: String,
    pub result: std::result::Result<Measurement, CycleError>,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs every tracker once per interval, products concurrently.
pub struct Scheduler {
    trackers: Vec<Arc<ProductTracker>>,
    interval: Duration,
    cycle_timeout: Duration,
}

impl Scheduler {
    pub fn new(trackers: Vec<Arc<ProductTracker>>, interval: Duration, cycle_timeout: Duration) -> Self {
        Self {
            trackers,
            interval,
            cycle_timeout,
        }
    }

    /// Run one cycle of every product.
    ///
    /// Each cycle is bounded by the cycle timeout; a timed out cycle is
    /// dropped, which leaves its tracker's cache untouched.
    pub async fn run_once(&self) -> Vec<CycleReport> {
        let now = Utc::now();

        let cycles = self.trackers.iter().map(|tracker| async move {
            let product = tracker.code().to_string();
            let result = match tokio::time::timeout(self.cycle_timeout, tracker.update(now)).await {
                Ok(Ok(measurement)) => Ok(measurement),
                Ok(Err(e)) => Err(CycleError::Update(e)),
                Err(_) => Err(CycleError::TimedOut {
                    product: product.clone(),
                    timeout: self.cycle_timeout,
                }),
            };
            CycleReport { product, result }
        });

        let reports = join_all(cycles).await;

        let failed = reports.iter().filter(|r| !r.is_success()).count();
        for report in &reports {
            match &report.result {
                Ok(measurement) => info!(
                    product = %report.product,
                    value = ?measurement.value,
                    unit = measurement.unit,
                    observed_at = %measurement.observed_at,
                    "Product cycle complete"
                ),
                Err(e) => warn!(product = %report.product, error = %e, "Product cycle failed"),
            }
        }

        info!(
            products = reports.len(),
            failed = failed,
            "Update cycle complete"
        );

        reports
    }

    /// Run cycles on the configured interval until shutdown.
    ///
    /// Shutdown also abandons a cycle that is still in flight.
    pub async fn run_forever(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        if self.trackers.is_empty() {
            error!("No products configured, scheduler not started");
            return Ok(());
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            products = self.trackers.len(),
            interval_secs = self.interval.as_secs(),
            "Starting scheduler"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down scheduler");
                    break;
                }
                _ = async {
                    ticker.tick().await;
                    self.run_once().await
                } => {}
            }
        }

        Ok(())
    }
}
