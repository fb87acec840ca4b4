pub mod delivery;
pub mod rate_limit_sweep;

pub use delivery::DeliveryWorker;
pub use rate_limit_sweep::RateLimitSweepWorker;
