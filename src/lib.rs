//! Self-learning photovoltaic power forecast.
//!
//! The [`forecast::ForecastEngine`] joins weather forecasts with measured
//! PV output, keeps a random-forest model up to date in the background and
//! answers "how many watts at time T". [`forecast::Next24Hours`] turns the
//! next day of predictions into time windows suitable for running
//! appliances on solar surplus.

pub mod config;
pub mod domain;
pub mod forecast;
pub mod ml;
pub mod repo;
pub mod telemetry;
pub mod utils;

pub use domain::{ForecastError, MeasurementSample, PowerSample, TimeFrame, WeatherRecord};
pub use forecast::{ForecastEngine, Frames, Next24Hours};
