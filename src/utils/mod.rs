pub mod clock;

pub use clock::{floor_to_bucket, Clock, ManualClock, SystemClock};
