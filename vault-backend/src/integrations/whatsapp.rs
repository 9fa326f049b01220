//! WhatsApp Cloud API (Graph) client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{read_json, MessageSender};
use crate::models::MessageChannel;

pub struct WhatsAppClient {
    base_url: String,
    phone_number_id: String,
    access_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PhoneNumberInfo {
    #[serde(default)]
    display_phone_number: Option<String>,
    #[serde(default)]
    verified_name: Option<String>,
}

impl WhatsAppClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        phone_number_id: &str,
        access_token: String,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            phone_number_id: phone_number_id.to_string(),
            access_token,
            client,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.base_url, self.phone_number_id)
    }

    pub async fn send_text_message(&self, to: &str, body: &str) -> Result<String, String> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to.trim_start_matches('+'),
            "type": "text",
            "text": { "preview_url": false, "body": body }
        });

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("WhatsApp API unavailable: {}", e))?;

        let sent: SendResponse = read_json("WhatsApp", response).await?;
        sent.messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| "WhatsApp accepted the message but returned no id".to_string())
    }

    /// Mark an inbound message as read (blue ticks)
    pub async fn mark_read(&self, message_id: &str) -> Result<(), String> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id
        });

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("WhatsApp API unavailable: {}", e))?;

        let _: serde_json::Value = read_json("WhatsApp", response).await?;
        Ok(())
    }

    /// Fetch the phone number record. Proves the token can see the number.
    pub async fn test_connection(&self) -> Result<String, String> {
        let url = format!(
            "{}/{}?fields=display_phone_number,verified_name",
            self.base_url, self.phone_number_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| format!("WhatsApp API unavailable: {}", e))?;

        let info: PhoneNumberInfo = read_json("WhatsApp", response).await?;
        Ok(info
            .verified_name
            .or(info.display_phone_number)
            .unwrap_or_else(|| self.phone_number_id.clone()))
    }
}

#[async_trait]
impl MessageSender for WhatsAppClient {
    fn channel(&self) -> MessageChannel {
        MessageChannel::Whatsapp
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<String, String> {
        self.send_text_message(to, body).await
    }
}
