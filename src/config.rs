use anyhow::{Context, Result};
use chrono::Duration;
use chrono_tz::Tz;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub storage: StorageConfig,
    pub weather: WeatherConfig,
    pub engine: EngineConfig,
    pub model: ModelConfig,
    pub windows: WindowConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Weather station whose forecasts feed the model.
    pub id: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self { id: "10637".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("data") }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct WeatherConfig {
    /// Directory holding `<station_id>.json` forecast files.
    pub source_dir: PathBuf,
    /// Names of the weather features, in record order.
    #[validate(length(min = 1))]
    pub features: Vec<String>,
    /// Feature whose non-positive value marks the sun as down.
    pub irradiance_feature: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub refresh_minutes: u32,
    /// How far a weather record may lie from the queried instant.
    #[validate(range(min = 1, max = 1440))]
    pub max_staleness_minutes: u32,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("weather"),
            features: vec![
                "irradiance".to_string(),
                "sunshine".to_string(),
                "cloud_cover".to_string(),
                "temperature".to_string(),
            ],
            irradiance_feature: Some("irradiance".to_string()),
            refresh_minutes: 30,
            max_staleness_minutes: 180,
        }
    }
}

impl WeatherConfig {
    pub fn max_staleness(&self) -> Duration {
        Duration::minutes(i64::from(self.max_staleness_minutes))
    }

    pub fn irradiance_index(&self) -> Result<Option<usize>> {
        self.irradiance_feature
            .as_ref()
            .map(|name| {
                self.features
                    .iter()
                    .position(|f| f == name)
                    .with_context(|| format!("irradiance feature '{name}' is not among weather.features"))
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    /// Width of a measurement bucket and of one horizon step; must divide
    /// an hour so that whole-hour windows line up with buckets.
    #[validate(range(min = 1, max = 60), custom(function = "divides_an_hour"))]
    pub bucket_minutes: u32,
    /// IANA zone for hour-of-day / day-of-year features.
    pub timezone: String,
    /// New training pairs that trigger a retrain.
    #[validate(range(min = 1))]
    pub retrain_every_readings: usize,
    /// Retrain at least this often while new pairs arrive.
    #[validate(range(min = 1))]
    pub retrain_interval_minutes: u32,
    /// Training set size from which the slower cadence applies.
    pub mature_training_pairs: usize,
    #[validate(range(min = 1))]
    pub mature_retrain_interval_hours: u32,
    /// Pairs required before the first fit.
    #[validate(range(min = 2))]
    pub min_training_pairs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bucket_minutes: 15,
            timezone: "UTC".to_string(),
            retrain_every_readings: 12,
            retrain_interval_minutes: 60,
            mature_training_pairs: 1000,
            mature_retrain_interval_hours: 168,
            min_training_pairs: 24,
        }
    }
}

fn divides_an_hour(minutes: u32) -> Result<(), ValidationError> {
    if minutes == 0 || 60 % minutes != 0 {
        return Err(ValidationError::new("bucket_minutes_must_divide_60"));
    }
    Ok(())
}

impl EngineConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone '{}': {e}", self.timezone))
    }

    pub fn bucket(&self) -> Duration {
        Duration::minutes(i64::from(self.bucket_minutes))
    }

    /// Longest allowed gap between retrains for a training set of `pairs`.
    pub fn retrain_interval(&self, pairs: usize) -> Duration {
        if pairs < self.mature_training_pairs {
            Duration::minutes(i64::from(self.retrain_interval_minutes))
        } else {
            Duration::hours(i64::from(self.mature_retrain_interval_hours))
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ModelConfig {
    #[validate(range(min = 1, max = 1000))]
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    #[validate(range(min = 2))]
    pub min_samples_split: usize,
    #[validate(range(min = 1))]
    pub min_samples_leaf: usize,
    pub seed: u64,
    /// Share of the newest pairs held out to score a retrain.
    #[validate(range(min = 0.0, max = 0.5))]
    pub validation_split: f64,
    /// Hold-out blocks scored per candidate feature set; the median counts.
    #[validate(range(min = 1, max = 10))]
    pub validation_rounds: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: Some(10),
            min_samples_split: 5,
            min_samples_leaf: 2,
            seed: 42,
            validation_split: 0.2,
            validation_rounds: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width_hours: f64,
    pub min_watt_per_hour: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width_hours: 3.0,
            min_watt_per_hour: 350.0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PVCAST__").split("__"));
        let cfg: Self = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.weather.validate().context("invalid [weather] section")?;
        self.engine.validate().context("invalid [engine] section")?;
        self.model.validate().context("invalid [model] section")?;
        self.engine.tz()?;
        self.weather.irradiance_index()?;
        if self.station.id.trim().is_empty() {
            anyhow::bail!("station.id must not be empty");
        }
        Ok(())
    }
}
