//! Outbound HTTP clients for the provider APIs.
//!
//! Clients are built per call by the dispatch resolver from decrypted
//! credentials and never outlive the request that needed them. Errors are the
//! provider's own message, passed through verbatim.

pub mod email;
pub mod stripe;
pub mod twilio;
pub mod whatsapp;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::models::MessageChannel;

pub use email::SmtpSettings;
pub use stripe::StripeClient;
pub use twilio::TwilioClient;
pub use whatsapp::WhatsAppClient;

/// A provider that can deliver a text message to a phone number
#[async_trait]
pub trait MessageSender: Send + Sync {
    fn channel(&self) -> MessageChannel;

    /// Send `body` to `to`. Returns the provider-assigned message id.
    async fn send_text(&self, to: &str, body: &str) -> Result<String, String>;
}

/// Decode a provider response, turning non-2xx replies into the provider's
/// error message. All three APIs put it under `error.message` or `message`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read {} response: {}", provider, e))?;

    if !status.is_success() {
        return Err(provider_error_message(&body)
            .unwrap_or_else(|| format!("{} returned HTTP {}", provider, status)));
    }

    serde_json::from_str(&body).map_err(|e| format!("Invalid response from {}: {}", provider, e))
}

fn provider_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_message_shapes() {
        assert_eq!(
            provider_error_message(r#"{"error":{"message":"Invalid OAuth access token.","code":190}}"#),
            Some("Invalid OAuth access token.".to_string())
        );
        assert_eq!(
            provider_error_message(r#"{"code":20003,"message":"Authenticate","status":401}"#),
            Some("Authenticate".to_string())
        );
        assert_eq!(provider_error_message("<html>bad gateway</html>"), None);
    }
}
