//! Shared helpers for radar-fetcher integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use projection::GridProjector;
use radar_fetcher::{
    CompositeSource, FetchFailure, FetchOutcome, Location, ProductTracker, RadarProduct,
};
use test_utils::{create_index_values, locations, CompositeBuilder};
use tokio::sync::Notify;

/// Source that replays scripted outcomes and records the tags it was sent.
#[derive(Default)]
pub struct ScriptedSource {
    outcomes: Mutex<VecDeque<FetchOutcome>>,
    seen_etags: Mutex<Vec<Option<String>>>,
    hang_next: AtomicBool,
}

impl ScriptedSource {
    pub fn new(outcomes: Vec<FetchOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        })
    }

    pub fn push(&self, outcome: FetchOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Make the next fetch never complete.
    pub fn hang_next(&self) {
        self.hang_next.store(true, Ordering::SeqCst);
    }

    pub fn seen_etags(&self) -> Vec<Option<String>> {
        self.seen_etags.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen_etags.lock().unwrap().len()
    }
}

#[async_trait]
impl CompositeSource for ScriptedSource {
    async fn fetch_latest(&self, _product_code: &str, etag: Option<&str>) -> FetchOutcome {
        self.seen_etags
            .lock()
            .unwrap()
            .push(etag.map(str::to_string));

        if self.hang_next.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| FetchOutcome::Failed(FetchFailure::transport("script exhausted")))
    }
}

/// Source that blocks inside the fetch until released.
#[derive(Default)]
pub struct GatedSource {
    pub entered: Notify,
    pub release: Notify,
    pub body: Vec<u8>,
}

#[async_trait]
impl CompositeSource for GatedSource {
    async fn fetch_latest(&self, _product_code: &str, _etag: Option<&str>) -> FetchOutcome {
        self.entered.notify_one();
        self.release.notified().await;
        fresh(self.body.clone(), "gated")
    }
}

pub fn fresh(body: Vec<u8>, etag: &str) -> FetchOutcome {
    FetchOutcome::Fresh {
        body: Bytes::from(body),
        etag: Some(etag.to_string()),
    }
}

pub fn server_error() -> FetchOutcome {
    FetchOutcome::Failed(FetchFailure {
        status: Some(500),
        reason: "Internal Server Error".to_string(),
    })
}

/// 3x3 RW composite whose cell (row, col) holds `(row * 3 + col) * step`.
///
/// On a 3x3 grid the centre cell sits exactly on 51N 9E.
pub fn small_composite(step: f32) -> Vec<u8> {
    CompositeBuilder::new("RW", 3, 3)
        .values(create_index_values(3, 3, step))
        .build()
}

pub fn reference_location() -> Location {
    let (lat, lon) = locations::REFERENCE;
    Location::new(lat, lon)
}

pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 7, 23, 0, 0).unwrap()
}

pub fn tracker_with(
    code: &str,
    source: Arc<dyn CompositeSource>,
    grids: Arc<GridProjector>,
) -> Arc<ProductTracker> {
    let product = RadarProduct::new(code, None, reference_location());
    Arc::new(ProductTracker::new(product, source, grids))
}
