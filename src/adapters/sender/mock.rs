use crate::adapters::sender::{MessageSender, SenderError};
use crate::domain::message::{Message, Receipt};
use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

/// Stand-in provider that fails at random with a fixed probability.
#[derive(Debug, Clone)]
pub struct MockSender {
    name: String,
    provider_label: String,
    failure_rate: f64,
}

impl MockSender {
    #[must_use]
    pub fn new(name: impl Into<String>, provider_label: impl Into<String>, failure_rate: f64) -> Self {
        Self { name: name.into(), provider_label: provider_label.into(), failure_rate: failure_rate.clamp(0.0, 1.0) }
    }
}

#[async_trait]
impl MessageSender for MockSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &Message) -> Result<Receipt, SenderError> {
        if rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(SenderError::Rejected {
                provider: self.provider_label.clone(),
                reason: "Email sending failed".to_string(),
            });
        }

        let message_id = format!("msg_{}", Uuid::new_v4().simple());
        tracing::info!(to = %message.to, message_id = %message_id, "STUB: {} accepted message", self.provider_label);
        Ok(Receipt { success: true, provider: self.name.clone(), message_id })
    }
}
