use crate::domain::message::{DeliveryResult, Message};
use crate::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub client_id: String,
}

impl SendMessageRequest {
    /// Splits the request into the message and its admission metadata.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the recipient or client id is blank.
    pub fn into_parts(self) -> Result<(Message, Option<String>, String), AppError> {
        if self.to.trim().is_empty() {
            return Err(AppError::BadRequest("Recipient is required".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(AppError::BadRequest("clientId is required".into()));
        }

        let key = self.idempotency_key.filter(|k| !k.is_empty());
        Ok((Message { to: self.to, subject: self.subject, body: self.body }, key, self.client_id))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub submission_id: String,
    pub success: bool,
    pub provider: String,
    pub message_id: String,
}

impl From<DeliveryResult> for SendMessageResponse {
    fn from(result: DeliveryResult) -> Self {
        Self {
            submission_id: result.submission_id.to_string(),
            success: result.success,
            provider: result.provider,
            message_id: result.message_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_camel_case() {
        let req: SendMessageRequest = serde_json::from_str(
            r#"{"to":"a@example.com","subject":"Hi","body":"Hello","idempotencyKey":"k1","clientId":"c1"}"#,
        )
        .expect("valid request");

        let (message, key, client_id) = req.into_parts().expect("valid parts");
        assert_eq!(message.to, "a@example.com");
        assert_eq!(key.as_deref(), Some("k1"));
        assert_eq!(client_id, "c1");
    }

    #[test]
    fn test_blank_client_id_is_rejected() {
        let req: SendMessageRequest =
            serde_json::from_str(r#"{"to":"a@example.com","subject":"Hi","body":"Hello","clientId":" "}"#)
                .expect("valid json");

        assert!(matches!(req.into_parts(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_empty_idempotency_key_is_ignored() {
        let req: SendMessageRequest = serde_json::from_str(
            r#"{"to":"a@example.com","subject":"Hi","body":"Hello","idempotencyKey":"","clientId":"c1"}"#,
        )
        .expect("valid json");

        let (_, key, _) = req.into_parts().expect("valid parts");
        assert_eq!(key, None);
    }
}
