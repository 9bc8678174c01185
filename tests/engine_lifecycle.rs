mod common;

use chrono::Duration;
use common::*;
use pv_forecast::repo::{BlobStore, FileBlobStore, MemoryBlobStore};
use pv_forecast::utils::ManualClock;
use pv_forecast::{ForecastEngine, ForecastError};
use std::sync::Arc;

fn open(store: Arc<dyn BlobStore>, clock: Arc<ManualClock>) -> ForecastEngine {
    ForecastEngine::open(&config(), store, Arc::new(StaticWeather(weather(4))), clock).unwrap()
}

#[tokio::test]
async fn untrained_until_enough_daylight_readings() {
    let clock = Arc::new(ManualClock::new(midnight()));
    let engine = open(Arc::new(MemoryBlobStore::new()), clock.clone());
    assert_eq!(engine.refresh_weather().await.unwrap(), 96);

    // Night readings are stored but never become training pairs.
    feed_hourly(&engine, &clock, 6).await;
    assert_eq!(engine.pending_pairs(), 0);
    assert_eq!(engine.measurements().all().unwrap().count(), 6);
    assert!(matches!(
        engine.predict(midnight() + Duration::hours(12)),
        Err(ForecastError::ModelNotTrained)
    ));

    feed_hourly(&engine, &clock, 7).await;
    assert!(!engine.is_trained());
    assert!(engine.wait_for_retrain().await.is_none());

    feed_hourly(&engine, &clock, 1).await;
    let report = engine.wait_for_retrain().await.unwrap().unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(report.training_pairs, 8);
    assert!(engine.is_trained());

    let noon_tomorrow = midnight() + Duration::hours(36);
    let watt = engine.predict(noon_tomorrow).unwrap();
    assert!(watt > 0.0);
    assert_eq!(engine.predict(midnight() + Duration::hours(26)).unwrap(), 0.0);
}

#[tokio::test]
async fn restart_recovers_model_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(midnight() + Duration::hours(6)));
    let probes: Vec<_> = (30..42).map(|h| midnight() + Duration::hours(h)).collect();

    let before = {
        let engine = open(Arc::new(FileBlobStore::open(dir.path()).unwrap()), clock.clone());
        engine.refresh_weather().await.unwrap();
        feed_hourly(&engine, &clock, 12).await;
        engine.wait_for_retrain().await.unwrap().unwrap();
        assert_eq!(engine.model_generation(), 1);
        probes
            .iter()
            .map(|at| engine.predict(*at).unwrap())
            .collect::<Vec<_>>()
    };

    // Weather is not refreshed: the archive on disk must be enough.
    let engine = open(Arc::new(FileBlobStore::open(dir.path()).unwrap()), clock);
    assert!(engine.is_trained());
    assert_eq!(engine.model_generation(), 1);
    assert_eq!(engine.measurements().all().unwrap().count(), 12);
    let after: Vec<_> = probes
        .iter()
        .map(|at| engine.predict(*at).unwrap())
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn retrain_now_bumps_generation() {
    let clock = Arc::new(ManualClock::new(midnight() + Duration::hours(6)));
    let engine = open(Arc::new(MemoryBlobStore::new()), clock.clone());
    engine.refresh_weather().await.unwrap();
    feed_hourly(&engine, &clock, 8).await;
    engine.wait_for_retrain().await.unwrap().unwrap();

    feed_hourly(&engine, &clock, 2).await;
    let report = engine.retrain_now().await.unwrap();
    assert_eq!(report.generation, 2);
    assert_eq!(report.training_pairs, 10);
    assert_eq!(engine.model_metadata().unwrap().training_samples, 10);
}

#[tokio::test]
async fn predictions_are_shared_across_clones() {
    let clock = Arc::new(ManualClock::new(midnight() + Duration::hours(6)));
    let engine = open(Arc::new(MemoryBlobStore::new()), clock.clone());
    engine.refresh_weather().await.unwrap();
    feed_hourly(&engine, &clock, 8).await;
    engine.wait_for_retrain().await.unwrap().unwrap();

    let at = midnight() + Duration::hours(34);
    let expected = engine.predict(at).unwrap();
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::task::spawn_blocking(move || engine.predict(at).unwrap())
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.await.unwrap(), expected);
    }
}
