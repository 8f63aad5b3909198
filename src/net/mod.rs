pub mod backoff;
pub mod throttle;

pub use backoff::Backoff;
pub use throttle::Throttle;
