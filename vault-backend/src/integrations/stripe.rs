//! Stripe REST client (payments)

use serde::Deserialize;

use super::read_json;

pub struct StripeClient {
    base_url: String,
    secret_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct Balance {
    #[serde(default)]
    livemode: bool,
}

impl StripeClient {
    pub fn new(client: reqwest::Client, base_url: &str, secret_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
            client,
        }
    }

    /// Create a card PaymentIntent. `metadata` comes back on every webhook
    /// event for the intent, which is how appointments are linked.
    pub async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &[(&str, String)],
    ) -> Result<PaymentIntent, String> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("Stripe API unavailable: {}", e))?;

        read_json("Stripe", response).await
    }

    /// Read the account balance. Any authenticated key can.
    pub async fn test_connection(&self) -> Result<String, String> {
        let response = self
            .client
            .get(format!("{}/v1/balance", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| format!("Stripe API unavailable: {}", e))?;

        let balance: Balance = read_json("Stripe", response).await?;
        Ok(if balance.livemode { "live mode" } else { "test mode" }.to_string())
    }
}
