//! Per-product update cycle.
//!
//! A [`ProductTracker`] owns the cache of one product: the entity tag of the
//! last composite, the last good measurement and diagnostics about the most
//! recent cycle. One cycle fetches conditionally, decodes a fresh composite,
//! locates the target cell on the (shared) projected grid and commits the
//! result.
//!
//! Everything a cycle produces is held in locals until the final commit, so
//! a failed or cancelled cycle never leaves a partial update behind. Cycles
//! on one tracker are exclusive; a second concurrent call fails fast.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use projection::{GridProjector, ProjectionError};
use radolan_parser::RadolanError;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::fetch::{CompositeSource, FetchFailure, FetchOutcome};
use crate::product::{Location, RadarProduct};

/// Errors of a single update cycle.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Fetch failed: {0}")]
    FetchFailed(FetchFailure),

    #[error("Decode failed: {0}")]
    Decode(#[from] RadolanError),

    #[error("Projection failed: {0}")]
    Projection(#[from] ProjectionError),

    /// Another cycle of the same product is running
    #[error("Update of {0} already in progress")]
    CycleInProgress(String),

    /// The server reported no change but nothing was ever decoded
    #[error("No value available for {0}")]
    NoValue(String),

    /// The blocking decode task panicked or was cancelled
    #[error("Decode task failed: {0}")]
    Task(String),
}

impl UpdateError {
    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateError::FetchFailed(_) => "fetch_failed",
            UpdateError::Decode(RadolanError::DecompressionError(_)) => "decompression_error",
            UpdateError::Decode(RadolanError::CorruptComposite(_)) => "corrupt_composite",
            UpdateError::Projection(ProjectionError::EmptyGrid) => "empty_grid",
            UpdateError::Projection(_) => "invalid_geometry",
            UpdateError::CycleInProgress(_) => "cycle_in_progress",
            UpdateError::NoValue(_) => "no_value",
            UpdateError::Task(_) => "task",
        }
    }
}

/// Tracker state as seen from outside a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPhase {
    /// No cycle has started yet
    Uninitialized,
    Idle,
    Fetching,
}

/// How the most recent cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// A new composite was decoded and committed
    Updated,
    /// The server answered 304; the cached measurement stands
    Unchanged,
    Failed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Updated => "updated",
            CycleOutcome::Unchanged => "unchanged",
            CycleOutcome::Failed => "failed",
        }
    }
}

/// Value of the composite cell nearest the target location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub product: String,
    /// `None` when the radar reported no data (or clutter) at the cell
    pub value: Option<f32>,
    pub unit: &'static str,
    pub row: usize,
    pub col: usize,
    pub cell_lat: f64,
    pub cell_lon: f64,
    /// Measurement time from the composite header
    pub observed_at: DateTime<Utc>,
    /// When the projected grid used for the lookup was computed
    pub grid_refreshed_at: DateTime<Utc>,
    /// When the cycle that produced this measurement ran
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time view of a tracker for status output.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerSnapshot {
    pub code: String,
    pub name: String,
    pub location: Location,
    pub phase: TrackerPhase,
    pub last_outcome: Option<CycleOutcome>,
    pub last_error: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub cycles: u64,
    pub measurement: Option<Measurement>,
}

#[derive(Debug, Default)]
struct ProductCache {
    etag: Option<String>,
    measurement: Option<Measurement>,
    last_outcome: Option<CycleOutcome>,
    last_error: Option<String>,
    last_cycle_at: Option<DateTime<Utc>>,
    completed_cycles: u64,
}

/// Result of a cycle before it is committed.
enum CycleStep {
    Updated {
        measurement: Measurement,
        etag: Option<String>,
    },
    Unchanged,
}

/// Holds the cycle lock and reports `Fetching` until dropped.
struct ActiveCycle<'a> {
    _lock: MutexGuard<'a, ()>,
    fetching: &'a AtomicBool,
}

impl Drop for ActiveCycle<'_> {
    fn drop(&mut self) {
        self.fetching.store(false, Ordering::SeqCst);
    }
}

/// Tracks the value of one product at one location.
pub struct ProductTracker {
    product: RadarProduct,
    source: Arc<dyn CompositeSource>,
    grids: Arc<GridProjector>,
    cycle_lock: Mutex<()>,
    fetching: AtomicBool,
    started_cycles: AtomicU64,
    cache: RwLock<ProductCache>,
}

impl ProductTracker {
    pub fn new(
        product: RadarProduct,
        source: Arc<dyn CompositeSource>,
        grids: Arc<GridProjector>,
    ) -> Self {
        Self {
            product,
            source,
            grids,
            cycle_lock: Mutex::new(()),
            fetching: AtomicBool::new(false),
            started_cycles: AtomicU64::new(0),
            cache: RwLock::new(ProductCache::default()),
        }
    }

    pub fn product(&self) -> &RadarProduct {
        &self.product
    }

    pub fn code(&self) -> &str {
        &self.product.code
    }

    pub fn phase(&self) -> TrackerPhase {
        if self.fetching.load(Ordering::SeqCst) {
            TrackerPhase::Fetching
        } else if self.started_cycles.load(Ordering::SeqCst) == 0 {
            TrackerPhase::Uninitialized
        } else {
            TrackerPhase::Idle
        }
    }

    /// Last good measurement.
    pub async fn measurement(&self) -> Option<Measurement> {
        self.cache.read().await.measurement.clone()
    }

    /// Entity tag sent with the next request.
    pub async fn etag(&self) -> Option<String> {
        self.cache.read().await.etag.clone()
    }

    pub async fn last_outcome(&self) -> Option<CycleOutcome> {
        self.cache.read().await.last_outcome
    }

    pub async fn last_error(&self) -> Option<String> {
        self.cache.read().await.last_error.clone()
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let phase = self.phase();
        let cache = self.cache.read().await;

        TrackerSnapshot {
            code: self.product.code.clone(),
            name: self.product.name.clone(),
            location: self.product.location,
            phase,
            last_outcome: cache.last_outcome,
            last_error: cache.last_error.clone(),
            last_cycle_at: cache.last_cycle_at,
            etag: cache.etag.clone(),
            cycles: cache.completed_cycles,
            measurement: cache.measurement.clone(),
        }
    }

    /// Run one update cycle.
    ///
    /// Returns the new measurement, the cached one when the composite is
    /// unchanged, or the error of this cycle. On error the cached
    /// measurement and entity tag are left exactly as they were.
    #[instrument(skip(self), fields(product = %self.product.code))]
    pub async fn update(&self, now: DateTime<Utc>) -> Result<Measurement, UpdateError> {
        let _cycle = self.begin_cycle()?;

        let result = self.run_cycle(now).await;
        self.commit(result, now).await
    }

    fn begin_cycle(&self) -> Result<ActiveCycle<'_>, UpdateError> {
        let lock = self.cycle_lock.try_lock().map_err(|_| {
            counter!(
                "radolan_cycles_total",
                "product" => self.product.code.clone(),
                "outcome" => "rejected"
            )
            .increment(1);
            UpdateError::CycleInProgress(self.product.code.clone())
        })?;

        self.fetching.store(true, Ordering::SeqCst);
        self.started_cycles.fetch_add(1, Ordering::SeqCst);

        Ok(ActiveCycle {
            _lock: lock,
            fetching: &self.fetching,
        })
    }

    async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleStep, UpdateError> {
        let etag = self.cache.read().await.etag.clone();

        match self
            .source
            .fetch_latest(&self.product.code, etag.as_deref())
            .await
        {
            FetchOutcome::NotModified => Ok(CycleStep::Unchanged),
            FetchOutcome::Failed(failure) => Err(UpdateError::FetchFailed(failure)),
            FetchOutcome::Fresh { body, etag } => {
                let product = self.product.clone();
                let grids = self.grids.clone();

                let measurement = tokio::task::spawn_blocking(move || {
                    measure(&product, &grids, &body, now)
                })
                .await
                .map_err(|e| UpdateError::Task(e.to_string()))??;

                Ok(CycleStep::Updated { measurement, etag })
            }
        }
    }

    /// Apply the result of a cycle to the cache in one step.
    async fn commit(
        &self,
        result: Result<CycleStep, UpdateError>,
        now: DateTime<Utc>,
    ) -> Result<Measurement, UpdateError> {
        let mut cache = self.cache.write().await;
        cache.completed_cycles += 1;
        cache.last_cycle_at = Some(now);

        let result = match result {
            Ok(CycleStep::Updated { measurement, etag }) => {
                cache.etag = etag;
                cache.measurement = Some(measurement.clone());

                info!(
                    value = ?measurement.value,
                    unit = measurement.unit,
                    row = measurement.row,
                    col = measurement.col,
                    observed_at = %measurement.observed_at,
                    "Measurement updated"
                );
                // No-data cells export NaN rather than the previous value
                gauge!("radolan_value", "product" => self.product.code.clone())
                    .set(measurement.value.map_or(f64::NAN, f64::from));

                Ok((CycleOutcome::Updated, measurement))
            }
            Ok(CycleStep::Unchanged) => match cache.measurement.clone() {
                Some(measurement) => {
                    debug!("Composite unchanged");
                    Ok((CycleOutcome::Unchanged, measurement))
                }
                None => Err(UpdateError::NoValue(self.product.code.clone())),
            },
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok((outcome, _)) => {
                cache.last_error = None;
                *outcome
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Update cycle failed");
                cache.last_error = Some(e.to_string());
                CycleOutcome::Failed
            }
        };
        cache.last_outcome = Some(outcome);

        counter!(
            "radolan_cycles_total",
            "product" => self.product.code.clone(),
            "outcome" => outcome.as_str()
        )
        .increment(1);

        result.map(|(_, measurement)| measurement)
    }
}

/// Decode a composite and read the cell nearest the product's location.
fn measure(
    product: &RadarProduct,
    grids: &GridProjector,
    body: &Bytes,
    now: DateTime<Utc>,
) -> Result<Measurement, UpdateError> {
    let composite = radolan_parser::decode(body)?;
    let grid = grids.get_grid(composite.rows(), composite.cols(), now)?;

    let target = product.location;
    let (row, col) = projection::locate(&grid, target.latitude, target.longitude)?;
    let cell = grid.get(row, col).ok_or(ProjectionError::SizeMismatch {
        expected: composite.rows() * composite.cols(),
        actual: grid.coords().len(),
    })?;

    Ok(Measurement {
        product: product.code.clone(),
        value: composite.grid.value(row, col),
        unit: product.unit(),
        row,
        col,
        cell_lat: cell.lat,
        cell_lon: cell.lon,
        observed_at: composite.header.timestamp,
        grid_refreshed_at: grid.computed_at(),
        updated_at: now,
    })
}
