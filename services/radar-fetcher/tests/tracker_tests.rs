//! Update cycle tests driven by in-memory composite sources.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use projection::GridProjector;
use radar_fetcher::{CycleOutcome, FetchOutcome, TrackerPhase, UpdateError};
use radolan_parser::RadolanError;
use metrics_exporter_prometheus::PrometheusBuilder;
use test_utils::{assert_approx_eq, assert_cell_eq, CompositeBuilder};
use tokio_test::{assert_err, assert_ok};

use common::*;

#[tokio::test]
async fn test_round_trip_reads_target_cell() {
    let source = ScriptedSource::new(vec![fresh(small_composite(0.1), "\"v1\"")]);
    let tracker = tracker_with("rw", source.clone(), Arc::new(GridProjector::new()));

    assert_eq!(tracker.phase(), TrackerPhase::Uninitialized);

    let measurement = tracker.update(reference_time()).await.unwrap();

    assert_eq!((measurement.row, measurement.col), (1, 1));
    assert_cell_eq!(measurement.value, 0.4, 1e-5);
    assert_eq!(measurement.unit, "mm");
    assert_eq!(measurement.product, "rw");
    assert_approx_eq!(measurement.cell_lat, 51.0, 1e-6);
    assert_approx_eq!(measurement.cell_lon, 9.0, 1e-6);
    assert_eq!(measurement.observed_at.to_rfc3339(), "2024-05-07T22:50:00+00:00");
    assert_eq!(measurement.updated_at, reference_time());
    assert_eq!(measurement.grid_refreshed_at, reference_time());

    assert_eq!(tracker.phase(), TrackerPhase::Idle);
    assert_eq!(tracker.last_outcome().await, Some(CycleOutcome::Updated));
    assert_eq!(tracker.etag().await.as_deref(), Some("\"v1\""));
    assert_eq!(source.seen_etags(), vec![None]);
}

#[tokio::test]
async fn test_no_data_cell_is_a_successful_cycle() {
    let body = CompositeBuilder::new("RW", 3, 3).set(1, 1, None).build();
    let source = ScriptedSource::new(vec![fresh(body, "v1")]);
    let tracker = tracker_with("rw", source, Arc::new(GridProjector::new()));

    let measurement = assert_ok!(tracker.update(reference_time()).await);

    assert_eq!(measurement.value, None);
    assert_eq!(tracker.last_outcome().await, Some(CycleOutcome::Updated));
}

#[test]
fn test_no_data_cell_resets_value_gauge() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    let source = ScriptedSource::new(vec![
        fresh(small_composite(0.1), "v1"),
        fresh(CompositeBuilder::new("RW", 3, 3).set(1, 1, None).build(), "v2"),
    ]);
    let tracker = tracker_with("rw", source, Arc::new(GridProjector::new()));

    metrics::with_local_recorder(&recorder, || {
        tokio_test::block_on(async {
            assert_ok!(tracker.update(reference_time()).await);
        })
    });
    assert_approx_eq!(value_gauge(&handle.render()), 0.4, 1e-5);

    metrics::with_local_recorder(&recorder, || {
        tokio_test::block_on(async {
            let measurement = assert_ok!(tracker.update(reference_time()).await);
            assert_eq!(measurement.value, None);
        })
    });
    assert!(value_gauge(&handle.render()).is_nan());
}

fn value_gauge(rendered: &str) -> f64 {
    rendered
        .lines()
        .find(|line| line.starts_with("radolan_value{"))
        .and_then(|line| line.rsplit(' ').next())
        .unwrap()
        .parse()
        .unwrap()
}

#[tokio::test]
async fn test_not_modified_returns_cached_measurement() {
    let source = ScriptedSource::new(vec![
        fresh(small_composite(0.1), "v1"),
        FetchOutcome::NotModified,
    ]);
    let grids = Arc::new(GridProjector::new());
    let tracker = tracker_with("rw", source.clone(), grids.clone());

    let first = tracker.update(reference_time()).await.unwrap();
    let later = reference_time() + ChronoDuration::minutes(5);
    let second = tracker.update(later).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(tracker.last_outcome().await, Some(CycleOutcome::Unchanged));
    assert_eq!(
        source.seen_etags(),
        vec![None, Some("v1".to_string())]
    );
    // Nothing was decoded for the 304
    assert_eq!(grids.recomputations(), 1);
}

#[tokio::test]
async fn test_first_not_modified_has_no_value() {
    let source = ScriptedSource::new(vec![FetchOutcome::NotModified]);
    let tracker = tracker_with("sf", source, Arc::new(GridProjector::new()));

    let err = assert_err!(tracker.update(reference_time()).await);

    assert!(matches!(err, UpdateError::NoValue(ref code) if code == "sf"));
    assert_eq!(tracker.phase(), TrackerPhase::Idle);
    assert_eq!(tracker.last_outcome().await, Some(CycleOutcome::Failed));
    assert!(tracker.measurement().await.is_none());
}

#[tokio::test]
async fn test_fetch_failure_keeps_value_and_etag() {
    let source = ScriptedSource::new(vec![
        fresh(small_composite(0.1), "v1"),
        server_error(),
        FetchOutcome::NotModified,
    ]);
    let tracker = tracker_with("rw", source.clone(), Arc::new(GridProjector::new()));

    let good = tracker.update(reference_time()).await.unwrap();

    let err = tracker.update(reference_time()).await.unwrap_err();
    match err {
        UpdateError::FetchFailed(failure) => assert_eq!(failure.status, Some(500)),
        other => panic!("expected FetchFailed, got {:?}", other),
    }

    assert_eq!(tracker.measurement().await, Some(good.clone()));
    assert_eq!(tracker.etag().await.as_deref(), Some("v1"));
    assert_eq!(tracker.last_outcome().await, Some(CycleOutcome::Failed));
    assert!(tracker.last_error().await.unwrap().contains("500"));

    // The tag survives for the next request
    let third = tracker.update(reference_time()).await.unwrap();
    assert_eq!(third, good);
    assert_eq!(source.seen_etags()[2].as_deref(), Some("v1"));
    assert!(tracker.last_error().await.is_none());
}

#[tokio::test]
async fn test_decode_failure_keeps_value_and_etag() {
    let mut truncated = CompositeBuilder::new("RW", 3, 3).build_uncompressed();
    truncated.truncate(truncated.len() - 2);

    let source = ScriptedSource::new(vec![
        fresh(small_composite(0.1), "v1"),
        fresh(b"not a composite".to_vec(), "v2"),
        fresh(test_utils::compress_bz2(&truncated), "v3"),
    ]);
    let tracker = tracker_with("rw", source, Arc::new(GridProjector::new()));

    let good = tracker.update(reference_time()).await.unwrap();

    let err = tracker.update(reference_time()).await.unwrap_err();
    assert!(matches!(
        err,
        UpdateError::Decode(RadolanError::DecompressionError(_))
    ));
    assert_eq!(tracker.etag().await.as_deref(), Some("v1"));

    let err = tracker.update(reference_time()).await.unwrap_err();
    assert!(matches!(
        err,
        UpdateError::Decode(RadolanError::CorruptComposite(_))
    ));
    assert_eq!(err.kind(), "corrupt_composite");

    assert_eq!(tracker.measurement().await, Some(good));
    assert_eq!(tracker.etag().await.as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_fresh_without_etag_clears_token() {
    let source = ScriptedSource::new(vec![
        fresh(small_composite(0.1), "v1"),
        FetchOutcome::Fresh {
            body: small_composite(0.2).into(),
            etag: None,
        },
    ]);
    let tracker = tracker_with("rw", source.clone(), Arc::new(GridProjector::new()));

    tracker.update(reference_time()).await.unwrap();
    let measurement = tracker.update(reference_time()).await.unwrap();

    assert_cell_eq!(measurement.value, 0.8, 1e-5);
    assert_eq!(tracker.etag().await, None);
}

#[tokio::test]
async fn test_cancelled_cycle_leaves_cache_untouched() {
    let source = ScriptedSource::new(vec![fresh(small_composite(0.1), "v1")]);
    let tracker = tracker_with("rw", source.clone(), Arc::new(GridProjector::new()));

    let good = tracker.update(reference_time()).await.unwrap();

    source.hang_next();
    source.push(fresh(small_composite(0.5), "v2"));
    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), tracker.update(reference_time())).await;
    assert!(abandoned.is_err());

    assert_eq!(tracker.phase(), TrackerPhase::Idle);
    assert_eq!(tracker.measurement().await, Some(good));
    assert_eq!(tracker.etag().await.as_deref(), Some("v1"));

    // The lock was released with the dropped cycle
    let next = tracker.update(reference_time()).await.unwrap();
    assert_cell_eq!(next.value, 2.0, 1e-5);
    assert_eq!(tracker.etag().await.as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_concurrent_update_is_rejected() {
    let gated = Arc::new(GatedSource {
        body: small_composite(0.1),
        ..GatedSource::default()
    });
    let tracker = tracker_with("rw", gated.clone(), Arc::new(GridProjector::new()));

    let running = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.update(reference_time()).await })
    };

    gated.entered.notified().await;
    assert_eq!(tracker.phase(), TrackerPhase::Fetching);

    let err = tracker.update(reference_time()).await.unwrap_err();
    assert!(matches!(err, UpdateError::CycleInProgress(ref code) if code == "rw"));

    gated.release.notify_one();
    let measurement = running.await.unwrap().unwrap();

    assert_cell_eq!(measurement.value, 0.4, 1e-5);
    assert_eq!(tracker.phase(), TrackerPhase::Idle);
    assert_eq!(tracker.etag().await.as_deref(), Some("gated"));
}

#[tokio::test]
async fn test_products_share_grid() {
    let grids = Arc::new(GridProjector::new());
    let rw = tracker_with(
        "rw",
        ScriptedSource::new(vec![fresh(small_composite(0.1), "a")]),
        grids.clone(),
    );
    let sf = tracker_with(
        "sf",
        ScriptedSource::new(vec![fresh(
            CompositeBuilder::new("SF", 3, 3).set(1, 1, Some(12.5)).build(),
            "b",
        )]),
        grids.clone(),
    );

    let a = rw.update(reference_time()).await.unwrap();
    let b = sf.update(reference_time()).await.unwrap();

    assert_cell_eq!(a.value, 0.4, 1e-5);
    assert_cell_eq!(b.value, 12.5, 1e-5);
    assert_eq!(a.grid_refreshed_at, b.grid_refreshed_at);
    assert_eq!(grids.recomputations(), 1);
}

#[tokio::test]
async fn test_grid_refreshed_after_a_day() {
    let source = ScriptedSource::new(vec![
        fresh(small_composite(0.1), "v1"),
        fresh(small_composite(0.1), "v2"),
        fresh(small_composite(0.1), "v3"),
    ]);
    let grids = Arc::new(GridProjector::new());
    let tracker = tracker_with("rw", source, grids.clone());

    let t0 = reference_time();
    tracker.update(t0).await.unwrap();

    let same_day = tracker.update(t0 + ChronoDuration::hours(23)).await.unwrap();
    assert_eq!(same_day.grid_refreshed_at, t0);
    assert_eq!(grids.recomputations(), 1);

    let next_day = t0 + ChronoDuration::hours(25);
    let refreshed = tracker.update(next_day).await.unwrap();
    assert_eq!(refreshed.grid_refreshed_at, next_day);
    assert_eq!(grids.recomputations(), 2);
}

#[tokio::test]
async fn test_reflectivity_product() {
    let body = CompositeBuilder::new("RX", 3, 3)
        .precision_exponent(0)
        .set(1, 1, Some(27.5))
        .build();
    let source = ScriptedSource::new(vec![fresh(body, "rx1")]);
    let tracker = tracker_with(test_utils::products::RX, source, Arc::new(GridProjector::new()));

    let measurement = tracker.update(reference_time()).await.unwrap();

    assert_eq!(measurement.value, Some(27.5));
    assert_eq!(measurement.unit, "dBZ");
}

#[tokio::test]
async fn test_snapshot_reflects_last_cycle() {
    let source = ScriptedSource::new(vec![fresh(small_composite(0.1), "v1"), server_error()]);
    let tracker = tracker_with("rw", source, Arc::new(GridProjector::new()));

    tracker.update(reference_time()).await.unwrap();
    let _ = tracker.update(reference_time()).await;

    let snapshot = tracker.snapshot().await;
    assert_eq!(snapshot.code, "rw");
    assert_eq!(snapshot.name, "Radolan RW 1h");
    assert_eq!(snapshot.phase, TrackerPhase::Idle);
    assert_eq!(snapshot.cycles, 2);
    assert_eq!(snapshot.last_outcome, Some(CycleOutcome::Failed));
    assert_eq!(snapshot.etag.as_deref(), Some("v1"));
    assert!(snapshot.measurement.is_some());
}
