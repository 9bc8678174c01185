//! Next-24-hours view of the forecast and window selection.
//!
//! Windows are ranked by their average predicted power rather than by the
//! weakest sample inside them: an appliance bridges a short dip with grid
//! power, so a window with one cloudy step is still a good window.

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::debug;

use super::engine::ForecastEngine;
use crate::domain::{ForecastError, PowerSample, TimeFrame};
use crate::utils::floor_to_bucket;

const HORIZON_HOURS: i64 = 24;

struct Horizon {
    generation: u64,
    weather_revision: u64,
    computed_at: DateTime<Utc>,
    samples: Vec<PowerSample>,
}

/// Lazily computed predictions for the next 24 hours of a bound engine.
pub struct Next24Hours {
    engine: ForecastEngine,
    cache: Mutex<Option<Arc<Horizon>>>,
}

impl Next24Hours {
    pub fn of(engine: &ForecastEngine) -> Self {
        Self {
            engine: engine.clone(),
            cache: Mutex::new(None),
        }
    }

    fn horizon(&self) -> Result<Arc<Horizon>, ForecastError> {
        let now = self.engine.now();
        let generation = self.engine.model_generation();
        let weather_revision = self.engine.weather_revision();

        let mut cache = self.cache.lock();
        if let Some(horizon) = cache.as_ref() {
            let fresh = horizon.generation == generation
                && horizon.weather_revision == weather_revision
                && now - horizon.computed_at < Duration::hours(HORIZON_HOURS);
            if fresh {
                return Ok(Arc::clone(horizon));
            }
        }

        let horizon = Arc::new(self.compute(now, generation, weather_revision)?);
        *cache = Some(Arc::clone(&horizon));
        Ok(horizon)
    }

    fn compute(
        &self,
        now: DateTime<Utc>,
        generation: u64,
        weather_revision: u64,
    ) -> Result<Horizon, ForecastError> {
        let step = self.engine.bucket();
        let start = floor_to_bucket(now, step_minutes(step));
        let steps = Duration::hours(HORIZON_HOURS).num_seconds() / step.num_seconds();

        let mut samples = Vec::with_capacity(steps as usize);
        for i in 0..steps {
            let at = start + step * i as i32;
            match self.engine.predict(at) {
                Ok(watt) => samples.push(PowerSample::new(at, watt)),
                Err(ForecastError::ForecastUnavailable { .. }) => {
                    debug!(%at, "no weather for horizon step, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(
            generation,
            samples = samples.len(),
            start = %start,
            "24h horizon computed"
        );
        Ok(Horizon {
            generation,
            weather_revision,
            computed_at: now,
            samples,
        })
    }

    /// Predicted samples of the horizon, oldest first.
    pub fn samples(&self) -> Result<Vec<PowerSample>, ForecastError> {
        Ok(self.horizon()?.samples.clone())
    }

    /// Highest predicted power within the horizon.
    pub fn peek(&self) -> Result<f64, ForecastError> {
        Ok(self.peak()?.predicted_watt)
    }

    /// Earliest instant at which the highest power is predicted.
    pub fn peek_time(&self) -> Result<DateTime<Utc>, ForecastError> {
        Ok(self.peak()?.timestamp)
    }

    fn peak(&self) -> Result<PowerSample, ForecastError> {
        let horizon = self.horizon()?;
        peak_of(&horizon.samples).ok_or(ForecastError::ForecastUnavailable {
            at: horizon.computed_at,
        })
    }

    /// All windows of exactly `width_hours`, sliding by one step.
    pub fn frames(&self, width_hours: f64) -> Result<Frames, ForecastError> {
        let horizon = self.horizon()?;
        Frames::sliding(&horizon.samples, self.engine.bucket(), width_hours)
    }
}

fn step_minutes(step: Duration) -> u32 {
    u32::try_from(step.num_minutes()).unwrap_or(u32::MAX)
}

fn peak_of(samples: &[PowerSample]) -> Option<PowerSample> {
    samples.iter().copied().fold(None::<PowerSample>, |best, sample| match best {
        Some(b) if b.predicted_watt >= sample.predicted_watt => Some(b),
        _ => Some(sample),
    })
}

/// An ordered sequence of time frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frames {
    frames: Vec<TimeFrame>,
}

impl Frames {
    pub fn new(frames: Vec<TimeFrame>) -> Self {
        Self { frames }
    }

    /// Slide a `width_hours` window over `samples` spaced `step` apart.
    ///
    /// Windows that would span a missing sample are left out.
    pub fn sliding(
        samples: &[PowerSample],
        step: Duration,
        width_hours: f64,
    ) -> Result<Self, ForecastError> {
        let width_steps = width_in_steps(width_hours, step)?;
        let width = step * width_steps as i32;
        let span = step * (width_steps as i32 - 1);

        let frames = samples
            .windows(width_steps)
            .filter(|window| window[window.len() - 1].timestamp - window[0].timestamp == span)
            .map(|window| TimeFrame {
                start_time: window[0].timestamp,
                end_time: window[0].timestamp + width,
                average_watt: window.iter().map(|s| s.predicted_watt).sum::<f64>()
                    / window.len() as f64,
            })
            .collect();
        Ok(Self { frames })
    }

    /// Frames whose average reaches `min_watt_per_hour`.
    pub fn filter(self, min_watt_per_hour: f64) -> Self {
        Self {
            frames: self
                .frames
                .into_iter()
                .filter(|f| f.average_watt >= min_watt_per_hour)
                .collect(),
        }
    }

    /// The frame with the highest average, earliest start on ties.
    ///
    /// `None` means no window has enough power: run the load now.
    pub fn best(&self) -> Option<&TimeFrame> {
        self.frames.iter().fold(None::<&TimeFrame>, |best, frame| match best {
            Some(b)
                if b.average_watt > frame.average_watt
                    || (b.average_watt == frame.average_watt && b.start_time <= frame.start_time) =>
            {
                Some(b)
            }
            _ => Some(frame),
        })
    }

    /// Frames ordered best first.
    pub fn ranked(self) -> Self {
        Self {
            frames: self
                .frames
                .into_iter()
                .sorted_by_key(|f| (Reverse(OrderedFloat(f.average_watt)), f.start_time))
                .collect(),
        }
    }

    pub fn empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimeFrame> {
        self.frames.iter()
    }
}

impl IntoIterator for Frames {
    type Item = TimeFrame;
    type IntoIter = std::vec::IntoIter<TimeFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl<'a> IntoIterator for &'a Frames {
    type Item = &'a TimeFrame;
    type IntoIter = std::slice::Iter<'a, TimeFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

fn width_in_steps(width_hours: f64, step: Duration) -> Result<usize, ForecastError> {
    if !width_hours.is_finite() || width_hours <= 0.0 || width_hours > HORIZON_HOURS as f64 {
        return Err(ForecastError::InvalidWidth(width_hours));
    }
    let step_hours = step.num_seconds() as f64 / 3600.0;
    let steps = width_hours / step_hours;
    let rounded = steps.round();
    if rounded < 1.0 || (steps - rounded).abs() > 1e-9 {
        return Err(ForecastError::InvalidWidth(width_hours));
    }
    Ok(rounded as usize)
}
