use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub tenant_id: String,
    pub client_id: Option<i64>,
    pub appointment_id: Option<i64>,
    /// Provider payment-intent id
    pub provider_payment_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a card payment
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub client_id: Option<i64>,
    pub appointment_id: Option<i64>,
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    /// Client secret for confirming the intent in the browser
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
