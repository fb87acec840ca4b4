use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub breaker: BreakerConfig,

    #[command(flatten)]
    pub retry: RetryConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub senders: SenderConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "COURIER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "COURIER_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management server (liveness check)
    #[arg(long, env = "COURIER_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// How long to wait for background workers during shutdown
    #[arg(long, env = "COURIER_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000, mgmt_port: 9090, shutdown_timeout_secs: 10 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct BreakerConfig {
    /// Consecutive failures before a sender's circuit opens
    #[arg(long = "breaker-failure-threshold", env = "COURIER_BREAKER_FAILURE_THRESHOLD", default_value_t = 3)]
    pub failure_threshold: u32,

    /// How long an open circuit rejects calls before allowing a trial call
    #[arg(long = "breaker-reset-timeout-ms", env = "COURIER_BREAKER_RESET_TIMEOUT_MS", default_value_t = 60_000)]
    pub reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 3, reset_timeout_ms: 60_000 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct RetryConfig {
    /// Total attempts against a single sender (including the first)
    #[arg(long = "retry-max-attempts", env = "COURIER_RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for each further attempt
    #[arg(long = "retry-base-delay-ms", env = "COURIER_RETRY_BASE_DELAY_MS", default_value_t = 1000)]
    pub base_delay_ms: u64,

    /// Upper bound on a single send call
    #[arg(long = "send-timeout-ms", env = "COURIER_SEND_TIMEOUT_MS", default_value_t = 30_000)]
    pub send_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 1000, send_timeout_ms: 30_000 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests admitted per client inside one window
    #[arg(long = "rate-limit", env = "COURIER_RATE_LIMIT", default_value_t = 10)]
    pub limit: usize,

    /// Length of the sliding window
    #[arg(long = "rate-limit-window-ms", env = "COURIER_RATE_LIMIT_WINDOW_MS", default_value_t = 60_000)]
    pub window_ms: u64,

    /// How often idle client windows are swept from memory
    #[arg(long = "rate-limit-sweep-interval-secs", env = "COURIER_RATE_LIMIT_SWEEP_INTERVAL_SECS", default_value_t = 300)]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { limit: 10, window_ms: 60_000, sweep_interval_secs: 300 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct SenderConfig {
    /// Failure probability of the primary mock sender (0.0 - 1.0)
    #[arg(long, env = "COURIER_PRIMARY_FAILURE_RATE", default_value_t = 0.3)]
    pub primary_failure_rate: f64,

    /// Failure probability of the secondary mock sender (0.0 - 1.0)
    #[arg(long, env = "COURIER_SECONDARY_FAILURE_RATE", default_value_t = 0.2)]
    pub secondary_failure_rate: f64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self { primary_failure_rate: 0.3, secondary_failure_rate: 0.2 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "COURIER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces and metrics are exported only when set
    #[arg(long, env = "COURIER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
