#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use pv_forecast::config::{Config, ModelConfig};
use pv_forecast::forecast::WeatherProvider;
use pv_forecast::utils::{Clock, ManualClock};
use pv_forecast::{ForecastEngine, WeatherRecord};

/// Serves the same forecast for every station.
pub struct StaticWeather(pub Vec<WeatherRecord>);

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn fetch(&self, _station_id: &str) -> Result<Vec<WeatherRecord>> {
        Ok(self.0.clone())
    }
}

pub fn midnight() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap()
}

pub fn config() -> Config {
    let mut cfg = Config::default();
    cfg.weather.features = vec!["irradiance".into(), "cloud_cover".into()];
    cfg.weather.irradiance_feature = Some("irradiance".into());
    cfg.engine.bucket_minutes = 60;
    cfg.engine.retrain_every_readings = 8;
    cfg.engine.min_training_pairs = 8;
    // Only the reading-count rule fires within a test's time span.
    cfg.engine.retrain_interval_minutes = 24 * 60;
    cfg.model = ModelConfig {
        n_trees: 10,
        min_samples_split: 2,
        min_samples_leaf: 1,
        ..ModelConfig::default()
    };
    cfg
}

/// Clear-sky bell between 05:00 and 19:00 UTC.
pub fn irradiance(ts: DateTime<Utc>) -> f64 {
    let h = f64::from(ts.hour());
    ((h - 5.0) * (19.0 - h)).max(0.0) * 12.0
}

pub fn cloud_cover(hours_since_midnight: i64) -> f64 {
    ((hours_since_midnight * 13) % 80) as f64
}

/// Hourly forecast starting at [`midnight`].
pub fn weather(days: i64) -> Vec<WeatherRecord> {
    (0..days * 24)
        .map(|h| {
            let ts = midnight() + Duration::hours(h);
            WeatherRecord::new(ts, vec![irradiance(ts), cloud_cover(h)])
        })
        .collect()
}

pub fn measured_watt(ts: DateTime<Utc>) -> f64 {
    irradiance(ts) * 4.5
}

/// Feed one reading per hour, moving the clock along.
pub async fn feed_hourly(engine: &ForecastEngine, clock: &ManualClock, readings: usize) {
    for _ in 0..readings {
        engine
            .add_current_power_reading(measured_watt(clock.now()))
            .await
            .unwrap();
        clock.advance(Duration::hours(1));
    }
}
