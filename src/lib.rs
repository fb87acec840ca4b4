#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::sender::{MessageSender, MockSender};
use crate::config::Config;
use crate::services::delivery_service::DeliveryService;
use crate::workers::{DeliveryWorker, RateLimitSweepWorker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Background tasks that must be spawned for the service to make progress.
#[derive(Debug)]
pub struct Workers {
    pub delivery: DeliveryWorker,
    pub rate_limit_sweep: RateLimitSweepWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.delivery.run(shutdown_rx.clone())), tokio::spawn(self.rate_limit_sweep.run(shutdown_rx))]
    }
}

#[derive(Debug)]
pub struct App {
    pub delivery_service: DeliveryService,
    pub workers: Workers,
}

/// Wires senders, the delivery service and its workers from a [`Config`].
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    senders: Option<Vec<Arc<dyn MessageSender>>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, senders: None }
    }

    /// Replaces the default mock senders. Senders are tried in the given order.
    #[must_use]
    pub fn with_senders(mut self, senders: Vec<Arc<dyn MessageSender>>) -> Self {
        self.senders = Some(senders);
        self
    }

    #[must_use]
    pub fn build(self) -> App {
        let senders = self.senders.unwrap_or_else(|| default_senders(&self.config));
        let (delivery_service, delivery) = DeliveryService::new(senders, &self.config);

        let rate_limit_sweep = RateLimitSweepWorker::new(
            delivery_service.rate_limiter().clone(),
            Duration::from_secs(self.config.rate_limit.sweep_interval_secs.max(1)),
        );

        App { delivery_service, workers: Workers { delivery, rate_limit_sweep } }
    }
}

fn default_senders(config: &Config) -> Vec<Arc<dyn MessageSender>> {
    vec![
        Arc::new(MockSender::new("Provider1", "Provider 1", config.senders.primary_failure_rate)),
        Arc::new(MockSender::new("Provider2", "Provider 2", config.senders.secondary_failure_rate)),
    ]
}

/// Flips the shutdown channel on Ctrl+C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining...");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach the configured log output.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(location = %location, panic = %payload, "Process panicked");
    }));
}
