pub mod error;
pub mod forecast;
pub mod measurement;
pub mod weather;

pub use error::*;
pub use forecast::*;
pub use measurement::*;
pub use weather::*;
