pub mod circuit_breaker;
pub mod delivery_queue;
pub mod delivery_service;
pub mod idempotency_service;
pub mod rate_limit_service;
pub mod retry;
pub mod status_tracker;
