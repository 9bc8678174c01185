use anyhow::{Context, Result};
use pv_forecast::config::Config;
use pv_forecast::forecast::{ForecastEngine, JsonFileWeatherProvider, Next24Hours};
use pv_forecast::repo::FileBlobStore;
use pv_forecast::utils::SystemClock;
use pv_forecast::{telemetry, ForecastError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load()?;

    let store = FileBlobStore::open(&cfg.storage.data_dir)
        .with_context(|| format!("cannot open data dir {}", cfg.storage.data_dir.display()))?;
    info!(data_dir = %store.root().display(), "blob store opened");
    let provider = JsonFileWeatherProvider::new(&cfg.weather.source_dir);
    let engine = ForecastEngine::open(
        &cfg,
        Arc::new(store),
        Arc::new(provider),
        Arc::new(SystemClock),
    )?;
    let windows = Next24Hours::of(&engine);

    info!(
        station_id = %engine.station_id(),
        trained = engine.is_trained(),
        generation = engine.model_generation(),
        "starting pvcast"
    );

    let mut refresh = tokio::time::interval(Duration::from_secs(
        u64::from(cfg.weather.refresh_minutes) * 60,
    ));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = telemetry::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = refresh.tick() => {
                match engine.refresh_weather().await {
                    Ok(records) => info!(records, "weather refreshed"),
                    Err(e) => warn!(error = %e, "weather refresh failed"),
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("end of input");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let watt: f64 = match line.parse() {
                    Ok(w) => w,
                    Err(_) => {
                        warn!(input = line, "not a power value, ignored");
                        continue;
                    }
                };
                if let Err(e) = engine.add_current_power_reading(watt).await {
                    if !e.is_recoverable() {
                        return Err(e.into());
                    }
                    warn!(error = %e, "reading rejected");
                    continue;
                }
                report_best_window(&windows, &cfg);
            }
        }
    }

    if let Some(Err(e)) = engine.wait_for_retrain().await {
        warn!(error = %e, "final retrain failed");
    }
    info!("shutdown complete");
    Ok(())
}

fn report_best_window(windows: &Next24Hours, cfg: &Config) {
    let frames = match windows.frames(cfg.windows.width_hours) {
        Ok(frames) => frames.filter(cfg.windows.min_watt_per_hour),
        Err(ForecastError::ModelNotTrained) => return,
        Err(e) => {
            warn!(error = %e, "window selection failed");
            return;
        }
    };
    match frames.best() {
        Some(best) => info!(
            window = %best,
            surplus_wh = best.surplus_watt_hours(cfg.windows.min_watt_per_hour).round(),
            candidates = frames.len(),
            "best window for the next 24 hours"
        ),
        None => info!(
            min_watt_per_hour = cfg.windows.min_watt_per_hour,
            "no window reaches the minimum, run now"
        ),
    }
}
