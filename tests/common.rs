#![allow(dead_code)]
use async_trait::async_trait;
use courier_server::adapters::sender::{MessageSender, SenderError};
use courier_server::config::Config;
use courier_server::domain::message::{Message, Receipt};
use courier_server::services::delivery_service::DeliveryService;
use courier_server::{AppBuilder, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Sender whose behaviour can be flipped between succeeding and failing mid-test.
#[derive(Debug)]
pub struct TestSender {
    name: String,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl TestSender {
    pub fn new(name: &str, failing: bool) -> Arc<Self> {
        Arc::new(Self { name: name.to_string(), failing: AtomicBool::new(failing), calls: AtomicU32::new(0) })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSender for TestSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, _message: &Message) -> Result<Receipt, SenderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(SenderError::Rejected { provider: self.name.clone(), reason: "Email sending failed".into() });
        }
        Ok(Receipt { success: true, provider: self.name.clone(), message_id: format!("msg_{}_{call}", self.name) })
    }
}

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.retry.base_delay_ms = 10;
    config.rate_limit.limit = 1000;
    config
}

pub struct TestApp {
    pub api_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub config: Config,
    pub delivery_service: DeliveryService,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn(senders: Vec<Arc<dyn MessageSender>>) -> Self {
        Self::spawn_with_config(get_test_config(), senders).await
    }

    pub async fn spawn_with_config(config: Config, senders: Vec<Arc<dyn MessageSender>>) -> Self {
        telemetry::init_test_telemetry();

        let app = AppBuilder::new(config.clone()).with_senders(senders).build();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let _workers = app.workers.spawn_all(shutdown_rx.clone());

        let api_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_addr: SocketAddr = api_listener.local_addr().unwrap();
        let mgmt_addr: SocketAddr = mgmt_listener.local_addr().unwrap();

        let router = courier_server::api::app_router(app.delivery_service.clone());
        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(api_listener, router)
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut mgmt_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, courier_server::api::mgmt_router())
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self {
            api_url: format!("http://{api_addr}"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            config,
            delivery_service: app.delivery_service,
            shutdown_tx,
        }
    }

    pub async fn send(&self, body: serde_json::Value) -> reqwest::Response {
        self.client.post(format!("{}/v1/messages", self.api_url)).json(&body).send().await.unwrap()
    }

    pub async fn status(&self, submission_id: &str) -> reqwest::Response {
        self.client.get(format!("{}/v1/status/{submission_id}", self.api_url)).send().await.unwrap()
    }
}

pub fn senders(list: &[&Arc<TestSender>]) -> Vec<Arc<dyn MessageSender>> {
    list.iter().map(|s| Arc::clone(s) as Arc<dyn MessageSender>).collect()
}

pub fn message_body(client_id: &str, idempotency_key: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "to": "test@example.com",
        "subject": "Test",
        "body": "Hello",
        "clientId": client_id,
    });
    if let Some(key) = idempotency_key {
        body["idempotencyKey"] = serde_json::Value::from(key);
    }
    body
}
