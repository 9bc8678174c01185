//! Forecast engine: measurement ingestion, retrain policy and prediction.
//!
//! The engine is a cheap handle around shared state. Readers call
//! [`ForecastEngine::predict`] from any thread; one producer feeds readings
//! through [`ForecastEngine::add_current_power_reading`]. Retraining happens
//! on Tokio's blocking pool, at most one at a time, and publishes the new
//! model by swapping an `Arc` under a short write lock.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::features::{FeatureBuilder, FeatureLayout};
use super::weather::{archive_records, load_archive, WeatherProvider};
use crate::config::{Config, EngineConfig};
use crate::domain::{ForecastError, MeasurementSample, WeatherRecord};
use crate::ml::{
    FeatureSubset, ModelMetadata, ModelTrainer, RandomForestModel, TrainingError, TrainingPair,
    TrainingSet, ValidationMetrics,
};
use crate::repo::{BlobStore, MeasurementStore};
use crate::utils::Clock;

const MODEL_KEY: &str = "model/current";

/// A fitted model together with its generation number.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub generation: u64,
    pub model: RandomForestModel,
}

impl ModelSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ForecastError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ForecastError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Outcome of a successful retrain.
#[derive(Debug, Clone)]
pub struct RetrainReport {
    pub generation: u64,
    pub training_pairs: usize,
    pub validation: Option<ValidationMetrics>,
    pub duration: StdDuration,
}

type RetrainHandle = JoinHandle<Result<RetrainReport, ForecastError>>;

#[derive(Default)]
struct TrainingState {
    set: TrainingSet,
    /// Pairs collected since the last retrain, one per bucket.
    pending: TrainingSet,
    last_retrain_at: Option<DateTime<Utc>>,
}

impl TrainingState {
    /// Buckets with a pair, counting a re-measured bucket once.
    fn distinct_pairs(&self) -> usize {
        self.set.len()
            + self
                .pending
                .pairs()
                .filter(|p| !self.set.contains(p.timestamp()))
                .count()
    }
}

struct EngineInner {
    config: EngineConfig,
    station_id: RwLock<String>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn BlobStore>,
    provider: Arc<dyn WeatherProvider>,
    measurements: MeasurementStore,
    features: FeatureBuilder,
    feature_names: Vec<String>,
    candidates: Vec<FeatureSubset>,
    trainer: ModelTrainer,
    model: RwLock<Option<Arc<ModelSnapshot>>>,
    training: Mutex<TrainingState>,
    retraining: AtomicBool,
    retrain_task: Mutex<Option<RetrainHandle>>,
}

/// Clears the in-flight flag when the retrain ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct ForecastEngine {
    inner: Arc<EngineInner>,
}

impl ForecastEngine {
    /// Build an engine on top of `store`, restoring whatever a previous
    /// process left there: the last persisted model, the weather archive and
    /// the training set derived from measurement history.
    pub fn open(
        config: &Config,
        store: Arc<dyn BlobStore>,
        provider: Arc<dyn WeatherProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ForecastError> {
        config
            .validate()
            .map_err(|e| ForecastError::Config(format!("{e:#}")))?;
        let timezone = config
            .engine
            .tz()
            .map_err(|e| ForecastError::Config(e.to_string()))?;
        let irradiance_index = config
            .weather
            .irradiance_index()
            .map_err(|e| ForecastError::Config(e.to_string()))?;

        let layout = FeatureLayout::new(config.weather.features.clone(), irradiance_index);
        let feature_names = layout.feature_names();
        let candidates = layout.candidates();
        let features = FeatureBuilder::new(layout, timezone, config.weather.max_staleness());
        let archived = features.ingest(load_archive(store.as_ref())?);

        let measurements = MeasurementStore::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.engine.bucket_minutes,
        );

        let model = load_snapshot(store.as_ref(), &feature_names)?;
        let mut training = TrainingState {
            last_retrain_at: model.as_ref().map(|_| clock.now()),
            ..TrainingState::default()
        };
        for sample in measurements.all()? {
            let Ok(sample) = sample else {
                continue;
            };
            if let Some(pair) = training_pair(&features, &sample) {
                training.set.insert(pair);
            }
        }

        info!(
            station_id = %config.station.id,
            weather_records = archived.len(),
            training_pairs = training.set.len(),
            generation = model.as_ref().map_or(0, |m| m.generation),
            "forecast engine opened"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config: config.engine.clone(),
                station_id: RwLock::new(config.station.id.clone()),
                clock,
                store,
                provider,
                measurements,
                features,
                feature_names,
                candidates,
                trainer: ModelTrainer::new(config.model.clone()),
                model: RwLock::new(model.map(Arc::new)),
                training: Mutex::new(training),
                retraining: AtomicBool::new(false),
                retrain_task: Mutex::new(None),
            }),
        })
    }

    /// Select the weather station used by subsequent refreshes.
    pub fn configure(&self, station_id: impl Into<String>) {
        let station_id = station_id.into();
        info!(%station_id, "weather station configured");
        *self.inner.station_id.write() = station_id;
    }

    pub fn station_id(&self) -> String {
        self.inner.station_id.read().clone()
    }

    /// Pull the current forecast from the supplier.
    pub async fn refresh_weather(&self) -> Result<usize, ForecastError> {
        let station_id = self.station_id();
        let records = self
            .inner
            .provider
            .fetch(&station_id)
            .await
            .map_err(|e| {
                warn!(%station_id, error = %format!("{e:#}"), "weather refresh failed");
                ForecastError::NoWeatherData {
                    at: self.inner.clock.now(),
                }
            })?;
        self.ingest_weather(records)
    }

    /// Add weather records pushed by a supplier; returns how many were kept.
    ///
    /// Stored readings near the new records that still lack a training pair
    /// are joined with them.
    pub fn ingest_weather(&self, records: Vec<WeatherRecord>) -> Result<usize, ForecastError> {
        let accepted = self.inner.features.ingest(records);
        archive_records(self.inner.store.as_ref(), &accepted)?;
        let joined = self.inner.join_unpaired(&accepted)?;
        debug!(
            accepted = accepted.len(),
            archived = self.inner.features.record_count(),
            joined,
            "weather records ingested"
        );
        Ok(accepted.len())
    }

    /// Record the current PV output and retrain when due.
    ///
    /// The reading is stored under the current time. If weather for that
    /// instant is known and the sun is up, it also becomes a training pair.
    /// The retrain itself runs in the background.
    pub async fn add_current_power_reading(
        &self,
        power_watt: f64,
    ) -> Result<MeasurementSample, ForecastError> {
        let now = self.inner.clock.now();
        let sample = self.inner.measurements.record(now, power_watt)?;

        match self.inner.features.build(sample.timestamp) {
            Ok(features) if features.is_dark() => {
                debug!(bucket = %sample.timestamp, "dark bucket, not used for training");
            }
            Ok(features) => {
                let mut training = self.inner.training.lock();
                training.pending.insert(TrainingPair::new(features, power_watt));
            }
            Err(e) => {
                info!(bucket = %sample.timestamp, error = %e, "reading stored without training pair");
            }
        }

        if self.inner.retrain_due() {
            if let Some(handle) = self.inner.spawn_retrain() {
                *self.inner.retrain_task.lock() = Some(handle);
            }
        }
        Ok(sample)
    }

    /// Predicted PV power at `at`.
    pub fn predict(&self, at: DateTime<Utc>) -> Result<f64, ForecastError> {
        let snapshot = self.inner.current().ok_or(ForecastError::ModelNotTrained)?;
        let features = self.inner.features.build(at).map_err(|e| match e {
            ForecastError::NoWeatherData { at } => ForecastError::ForecastUnavailable { at },
            other => other,
        })?;
        if features.is_dark() {
            return Ok(0.0);
        }
        snapshot.model.infer(&features)
    }

    /// Wait for the background retrain started by a reading, if any.
    pub async fn wait_for_retrain(&self) -> Option<Result<RetrainReport, ForecastError>> {
        let handle = self.inner.retrain_task.lock().take()?;
        Some(join_retrain(handle).await)
    }

    /// Retrain immediately on everything collected so far.
    ///
    /// If a retrain is already running it is awaited first, then a fresh one
    /// is started so that the result covers every pair known at call time.
    pub async fn retrain_now(&self) -> Result<RetrainReport, ForecastError> {
        loop {
            if let Some(handle) = self.inner.spawn_retrain() {
                return join_retrain(handle).await;
            }
            if self.wait_for_retrain().await.is_none() {
                tokio::time::sleep(StdDuration::from_millis(20)).await;
            }
        }
    }

    pub fn is_trained(&self) -> bool {
        self.inner.model.read().is_some()
    }

    /// Generation of the active model; 0 while untrained.
    pub fn model_generation(&self) -> u64 {
        self.inner.current().map_or(0, |m| m.generation)
    }

    pub fn model_metadata(&self) -> Option<ModelMetadata> {
        self.inner.current().map(|m| m.model.metadata.clone())
    }

    pub fn training_set_len(&self) -> usize {
        self.inner.training.lock().set.len()
    }

    pub fn pending_pairs(&self) -> usize {
        self.inner.training.lock().pending.len()
    }

    pub fn measurements(&self) -> &MeasurementStore {
        &self.inner.measurements
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn bucket(&self) -> chrono::Duration {
        self.inner.config.bucket()
    }

    pub(crate) fn weather_revision(&self) -> u64 {
        self.inner.features.revision()
    }
}

impl EngineInner {
    fn current(&self) -> Option<Arc<ModelSnapshot>> {
        self.model.read().clone()
    }

    fn retrain_due(&self) -> bool {
        let training = self.training.lock();
        let total = training.distinct_pairs();
        if training.pending.is_empty() || total < self.config.min_training_pairs {
            return false;
        }
        if training.pending.len() >= self.config.retrain_every_readings {
            return true;
        }
        match training.last_retrain_at {
            None => true,
            Some(at) => self.clock.now() - at >= self.config.retrain_interval(total),
        }
    }

    /// Start a retrain unless one is already running.
    fn spawn_retrain(self: &Arc<Self>) -> Option<RetrainHandle> {
        if self
            .retraining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("retrain already in flight, request coalesced");
            return None;
        }

        // The time rule counts from when a retrain was requested.
        self.training.lock().last_retrain_at = Some(self.clock.now());

        let inner = Arc::clone(self);
        Some(tokio::task::spawn_blocking(move || inner.run_retrain()))
    }

    fn run_retrain(&self) -> Result<RetrainReport, ForecastError> {
        let _in_flight = InFlight(&self.retraining);
        let outcome = self.retrain();
        match &outcome {
            Ok(report) => info!(
                generation = report.generation,
                training_pairs = report.training_pairs,
                duration_ms = report.duration.as_millis() as u64,
                "prediction model retrained"
            ),
            Err(e) => warn!(error = %e, "retrain failed, keeping previous model"),
        }
        outcome
    }

    fn retrain(&self) -> Result<RetrainReport, ForecastError> {
        let started = Instant::now();
        let (pairs, span) = {
            let mut training = self.training.lock();
            let n_features = self.feature_names.len();
            let pending: Vec<_> = training.pending.drain().collect();
            for pair in pending {
                match ModelTrainer::check_pair(&pair, n_features) {
                    Ok(()) => training.set.insert(pair),
                    Err(e) => warn!(bucket = %pair.timestamp(), error = %e, "training pair dropped"),
                }
            }
            (training.set.to_vec(), training.set.span())
        };
        if let Some((first, last)) = span {
            debug!(pairs = pairs.len(), %first, %last, "retraining");
        }

        let need = self.config.min_training_pairs;
        if pairs.len() < need {
            return Err(TrainingError::InsufficientData {
                have: pairs.len(),
                need,
            }
            .into());
        }

        let model = self
            .trainer
            .train(&pairs, &self.feature_names, &self.candidates)?;
        let validation = model.metadata.validation_metrics;

        let snapshot = {
            let mut slot = self.model.write();
            let generation = slot.as_ref().map_or(1, |current| current.generation + 1);
            let snapshot = Arc::new(ModelSnapshot { generation, model });
            *slot = Some(Arc::clone(&snapshot));
            snapshot
        };

        if let Err(e) = self.persist(&snapshot) {
            warn!(
                generation = snapshot.generation,
                error = %e,
                "model swapped but not persisted; previous blob remains the recovery point"
            );
        }

        Ok(RetrainReport {
            generation: snapshot.generation,
            training_pairs: pairs.len(),
            validation,
            duration: started.elapsed(),
        })
    }

    /// Turn stored readings within reach of `records` into pending pairs
    /// when their bucket has none yet. Returns how many were added.
    fn join_unpaired(&self, records: &[WeatherRecord]) -> Result<usize, ForecastError> {
        let (Some(first), Some(last)) = (
            records.iter().map(|r| r.timestamp).min(),
            records.iter().map(|r| r.timestamp).max(),
        ) else {
            return Ok(0);
        };
        let reach = self.features.max_staleness();
        let samples = self
            .measurements
            .history(first - reach, last + reach + chrono::Duration::seconds(1))?;

        let mut training = self.training.lock();
        let mut joined = 0;
        for sample in samples {
            let Ok(sample) = sample else {
                continue;
            };
            if training.set.contains(sample.timestamp) || training.pending.contains(sample.timestamp) {
                continue;
            }
            if let Some(pair) = training_pair(&self.features, &sample) {
                training.pending.insert(pair);
                joined += 1;
            }
        }
        Ok(joined)
    }

    fn persist(&self, snapshot: &ModelSnapshot) -> Result<(), ForecastError> {
        self.store.write(MODEL_KEY, &snapshot.to_bytes()?)?;
        Ok(())
    }
}

fn training_pair(features: &FeatureBuilder, sample: &MeasurementSample) -> Option<TrainingPair> {
    let vector = features.build(sample.timestamp).ok()?;
    (!vector.is_dark()).then(|| TrainingPair::new(vector, sample.power_watt))
}

fn load_snapshot(
    store: &dyn BlobStore,
    feature_names: &[String],
) -> Result<Option<ModelSnapshot>, ForecastError> {
    let Some(bytes) = store.read(MODEL_KEY)? else {
        return Ok(None);
    };
    match ModelSnapshot::from_bytes(&bytes) {
        Ok(snapshot) if snapshot.model.metadata.feature_names == feature_names => {
            info!(
                generation = snapshot.generation,
                model_id = %snapshot.model.metadata.model_id,
                "prediction model restored"
            );
            Ok(Some(snapshot))
        }
        Ok(snapshot) => {
            warn!(
                stored = ?snapshot.model.metadata.feature_names,
                configured = ?feature_names,
                "stored model uses different features, ignoring it"
            );
            Ok(None)
        }
        Err(e) => {
            warn!(error = %e, "stored model unreadable, starting untrained");
            Ok(None)
        }
    }
}

async fn join_retrain(handle: RetrainHandle) -> Result<RetrainReport, ForecastError> {
    handle.await.unwrap_or_else(|e| {
        Err(TrainingError::Fit(format!("retrain task aborted: {e}")).into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::forecast::weather::MockWeatherProvider;
    use crate::repo::MemoryBlobStore;
    use crate::utils::ManualClock;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 6, 0, 0).unwrap()
    }

    fn config() -> Config {
        let mut cfg = Config::default();
        cfg.weather.features = vec!["irradiance".into(), "cloud_cover".into()];
        cfg.weather.irradiance_feature = Some("irradiance".into());
        cfg.engine.bucket_minutes = 60;
        cfg.engine.retrain_every_readings = 6;
        cfg.engine.min_training_pairs = 6;
        cfg.model = ModelConfig {
            n_trees: 8,
            min_samples_split: 2,
            min_samples_leaf: 1,
            ..ModelConfig::default()
        };
        cfg
    }

    fn irradiance(ts: DateTime<Utc>) -> f64 {
        let h = f64::from(chrono::Timelike::hour(&ts));
        ((h - 5.0) * (19.0 - h)).max(0.0) * 12.0
    }

    fn weather(days: i64) -> Vec<WeatherRecord> {
        let midnight = start() - Duration::hours(6);
        (0..days * 24)
            .map(|h| {
                let ts = midnight + Duration::hours(h);
                WeatherRecord::new(ts, vec![irradiance(ts), f64::from((h % 7) as u32 * 10)])
            })
            .collect()
    }

    fn engine() -> (ForecastEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = ForecastEngine::open(
            &config(),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MockWeatherProvider::new()),
            clock.clone(),
        )
        .unwrap();
        engine.ingest_weather(weather(3)).unwrap();
        (engine, clock)
    }

    async fn feed(engine: &ForecastEngine, clock: &ManualClock, readings: usize) {
        for _ in 0..readings {
            let watt = irradiance(clock.now()) * 4.0;
            engine.add_current_power_reading(watt).await.unwrap();
            clock.advance(Duration::hours(1));
        }
    }

    #[tokio::test]
    async fn test_predict_before_training_fails() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.predict(start()),
            Err(ForecastError::ModelNotTrained)
        ));
        assert_eq!(engine.model_generation(), 0);
    }

    #[tokio::test]
    async fn test_threshold_reading_triggers_first_training() {
        let (engine, clock) = engine();
        feed(&engine, &clock, 5).await;
        assert!(engine.wait_for_retrain().await.is_none());
        assert_eq!(engine.pending_pairs(), 5);

        feed(&engine, &clock, 1).await;
        let report = engine.wait_for_retrain().await.unwrap().unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(report.training_pairs, 6);
        assert!(engine.is_trained());
        assert_eq!(engine.pending_pairs(), 0);
        assert!(engine.predict(start() + Duration::hours(30)).unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_dark_hours_predict_zero_and_skip_training() {
        let (engine, clock) = engine();
        feed(&engine, &clock, 6).await;
        engine.wait_for_retrain().await.unwrap().unwrap();

        let night = start() + Duration::hours(18); // midnight
        assert_eq!(engine.predict(night).unwrap(), 0.0);

        clock.set(night);
        engine.add_current_power_reading(0.0).await.unwrap();
        assert_eq!(engine.pending_pairs(), 0);
    }

    #[tokio::test]
    async fn test_missing_weather_is_forecast_unavailable() {
        let (engine, clock) = engine();
        feed(&engine, &clock, 6).await;
        engine.wait_for_retrain().await.unwrap().unwrap();

        let far = start() + Duration::days(10);
        assert!(matches!(
            engine.predict(far),
            Err(ForecastError::ForecastUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_reading_does_not_block_ingestion() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.add_current_power_reading(-5.0).await,
            Err(ForecastError::InvalidReading(_))
        ));
        assert!(engine.add_current_power_reading(120.0).await.is_ok());
        assert_eq!(engine.pending_pairs(), 1);
    }

    #[tokio::test]
    async fn test_time_rule_triggers_retrain() {
        let (engine, clock) = engine();
        feed(&engine, &clock, 6).await;
        engine.wait_for_retrain().await.unwrap().unwrap();

        // The sixth reading at 11:00 requested the first retrain.
        clock.set(start() + Duration::minutes(5 * 60 + 30));
        engine.add_current_power_reading(300.0).await.unwrap();
        assert!(engine.wait_for_retrain().await.is_none());

        // Few new pairs, but more than an hour since the last request.
        clock.set(start() + Duration::minutes(6 * 60 + 1));
        engine.add_current_power_reading(320.0).await.unwrap();
        let report = engine.wait_for_retrain().await.unwrap().unwrap();
        assert_eq!(report.generation, 2);
    }

    #[tokio::test]
    async fn test_malformed_pair_is_dropped_not_kept() {
        let (engine, clock) = engine();
        feed(&engine, &clock, 6).await;
        engine.wait_for_retrain().await.unwrap().unwrap();

        {
            let mut training = engine.inner.training.lock();
            let ts = start() - Duration::hours(1);
            let bad = crate::ml::FeatureVector::new(ts, &[1.0], 5.0, 155.0, true);
            training.pending.insert(TrainingPair::new(bad, 10.0));
        }
        let report = engine.retrain_now().await.unwrap();
        assert_eq!(report.generation, 2);
        assert_eq!(report.training_pairs, 6);
        assert_eq!(engine.training_set_len(), 6);

        // Nothing poisoned stays behind for later retrains.
        let report = engine.retrain_now().await.unwrap();
        assert_eq!(report.generation, 3);
    }

    #[tokio::test]
    async fn test_readings_within_one_bucket_count_once() {
        let (engine, clock) = engine();
        let mut outcomes = Vec::new();
        // Three readings per hourly bucket.
        for _ in 0..15 {
            let watt = irradiance(clock.now()) * 4.0;
            engine.add_current_power_reading(watt).await.unwrap();
            if let Some(outcome) = engine.wait_for_retrain().await {
                outcomes.push(outcome);
            }
            clock.advance(Duration::minutes(20));
        }
        assert!(outcomes.is_empty());
        assert_eq!(engine.pending_pairs(), 5);

        engine.add_current_power_reading(500.0).await.unwrap();
        let report = engine.wait_for_retrain().await.unwrap().unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(report.training_pairs, 6);
    }

    #[tokio::test]
    async fn test_late_weather_joins_stored_readings() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = ForecastEngine::open(
            &config(),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MockWeatherProvider::new()),
            clock.clone(),
        )
        .unwrap();

        feed(&engine, &clock, 4).await;
        clock.set(start() + Duration::hours(16)); // 22:00, sun is down
        engine.add_current_power_reading(0.0).await.unwrap();
        assert_eq!(engine.pending_pairs(), 0);

        engine.ingest_weather(weather(2)).unwrap();
        assert_eq!(engine.pending_pairs(), 4);

        // Already paired buckets are left alone.
        engine.ingest_weather(weather(2)).unwrap();
        assert_eq!(engine.pending_pairs(), 4);
    }

    #[tokio::test]
    async fn test_retrain_now_requires_minimum_pairs() {
        let (engine, clock) = engine();
        feed(&engine, &clock, 2).await;
        assert!(matches!(
            engine.retrain_now().await,
            Err(ForecastError::Training(TrainingError::InsufficientData { have: 2, need: 6 }))
        ));
        assert!(!engine.is_trained());
    }

    #[tokio::test]
    async fn test_refresh_weather_uses_configured_station() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut provider = MockWeatherProvider::new();
        provider
            .expect_fetch()
            .withf(|station| station.to_string() == "P755")
            .times(1)
            .returning(|_| Ok(weather(1)));
        provider
            .expect_fetch()
            .withf(|station| station.to_string() == "00000")
            .returning(|_| Err(anyhow::anyhow!("station offline")));

        let engine = ForecastEngine::open(
            &config(),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(provider),
            clock,
        )
        .unwrap();

        engine.configure("P755");
        assert_eq!(engine.refresh_weather().await.unwrap(), 24);

        engine.configure("00000");
        assert!(matches!(
            engine.refresh_weather().await,
            Err(ForecastError::NoWeatherData { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_restores_model_and_training_set() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let first = ForecastEngine::open(
            &config(),
            Arc::clone(&store),
            Arc::new(MockWeatherProvider::new()),
            clock.clone(),
        )
        .unwrap();
        first.ingest_weather(weather(3)).unwrap();
        feed(&first, &clock, 6).await;
        first.wait_for_retrain().await.unwrap().unwrap();
        let probe = start() + Duration::hours(28);
        let expected = first.predict(probe).unwrap();
        drop(first);

        let second = ForecastEngine::open(
            &config(),
            store,
            Arc::new(MockWeatherProvider::new()),
            clock,
        )
        .unwrap();
        assert!(second.is_trained());
        assert_eq!(second.model_generation(), 1);
        assert_eq!(second.training_set_len(), 6);
        assert_eq!(second.predict(probe).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_open_ignores_model_with_other_features() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let first = ForecastEngine::open(
            &config(),
            Arc::clone(&store),
            Arc::new(MockWeatherProvider::new()),
            clock.clone(),
        )
        .unwrap();
        first.ingest_weather(weather(3)).unwrap();
        feed(&first, &clock, 6).await;
        first.wait_for_retrain().await.unwrap().unwrap();

        let mut other = config();
        other.weather.features = vec!["irradiance".into(), "temperature".into(), "wind".into()];
        let second =
            ForecastEngine::open(&other, store, Arc::new(MockWeatherProvider::new()), clock)
                .unwrap();
        assert!(!second.is_trained());
    }
}
