pub mod engine;
pub mod features;
pub mod next24h;
pub mod weather;

pub use engine::{ForecastEngine, ModelSnapshot, RetrainReport};
pub use features::{FeatureBuilder, FeatureLayout};
pub use next24h::{Frames, Next24Hours};
pub use weather::{JsonFileWeatherProvider, WeatherProvider};
