use crate::domain::message::{Message, Receipt};
use async_trait::async_trait;
use thiserror::Error;

pub mod mock;

pub use mock::MockSender;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SenderError {
    #[error("{provider}: {reason}")]
    Rejected { provider: String, reason: String },
    #[error("{provider}: send timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
}

#[async_trait]
pub trait MessageSender: Send + Sync + std::fmt::Debug {
    /// Name used in attempt records, logs and metrics.
    fn name(&self) -> &str;

    /// Hands a message to the underlying provider.
    ///
    /// # Errors
    /// Returns a `SenderError` if the provider did not accept the message.
    async fn send(&self, message: &Message) -> Result<Receipt, SenderError>;
}
