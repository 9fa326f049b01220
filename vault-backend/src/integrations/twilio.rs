//! Twilio REST client (SMS)

use async_trait::async_trait;
use serde::Deserialize;

use super::{read_json, MessageSender};
use crate::models::MessageChannel;

pub struct TwilioClient {
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    messaging_service_sid: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct AccountResource {
    #[serde(default)]
    friendly_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl TwilioClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        account_sid: &str,
        auth_token: String,
        from_number: &str,
        messaging_service_sid: Option<&str>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token,
            from_number: from_number.to_string(),
            messaging_service_sid: messaging_service_sid.map(str::to_string),
            client,
        }
    }

    fn account_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}", self.base_url, self.account_sid)
    }

    pub async fn send_sms(&self, to: &str, body: &str) -> Result<String, String> {
        let mut form = vec![("To", to.to_string()), ("Body", body.to_string())];
        // A messaging service picks its own sender from the pool
        match &self.messaging_service_sid {
            Some(sid) => form.push(("MessagingServiceSid", sid.clone())),
            None => form.push(("From", self.from_number.clone())),
        }

        let response = self
            .client
            .post(format!("{}/Messages.json", self.account_url()))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("Twilio API unavailable: {}", e))?;

        let message: MessageResource = read_json("Twilio", response).await?;
        Ok(message.sid)
    }

    pub async fn test_connection(&self) -> Result<String, String> {
        let response = self
            .client
            .get(format!("{}.json", self.account_url()))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| format!("Twilio API unavailable: {}", e))?;

        let account: AccountResource = read_json("Twilio", response).await?;
        if let Some(status) = account.status.as_deref() {
            if status != "active" {
                return Err(format!("Twilio account is {}", status));
            }
        }
        Ok(account.friendly_name.unwrap_or_else(|| self.account_sid.clone()))
    }
}

#[async_trait]
impl MessageSender for TwilioClient {
    fn channel(&self) -> MessageChannel {
        MessageChannel::Sms
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<String, String> {
        self.send_sms(to, body).await
    }
}
