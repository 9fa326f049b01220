//! Provider families and their credential field schemas.
//!
//! The schema is the single place that says which fields a provider takes,
//! which are secret, and which one routes inbound webhooks to a tenant.
//! Save, masking and dispatch all read from it.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    /// WhatsApp Cloud API (messaging)
    Whatsapp,
    /// Twilio (SMS)
    Twilio,
    /// Stripe (payments)
    Stripe,
    /// SMTP (email)
    Email,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Twilio => "twilio",
            Self::Stripe => "stripe",
            Self::Email => "email",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Whatsapp => "WhatsApp Business",
            Self::Twilio => "Twilio SMS",
            Self::Stripe => "Stripe",
            Self::Email => "Email (SMTP)",
        }
    }

    pub fn all() -> Vec<Provider> {
        Self::iter().collect()
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::Whatsapp => WHATSAPP_FIELDS,
            Self::Twilio => TWILIO_FIELDS,
            Self::Stripe => STRIPE_FIELDS,
            Self::Email => EMAIL_FIELDS,
        }
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Names of the fields that are stored encrypted
    #[cfg(test)]
    pub fn sensitive_fields(&self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|f| f.sensitive)
            .map(|f| f.name)
            .collect()
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.field(name).map(|f| f.sensitive).unwrap_or(false)
    }

    /// The field whose value identifies the tenant on inbound webhooks
    pub fn routing_field(&self) -> Option<&'static str> {
        self.fields().iter().find(|f| f.routing_key).map(|f| f.name)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Definition of one credential field
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    /// Stored as a cipher envelope and never shown back
    pub sensitive: bool,
    pub required: bool,
    /// Provider-assigned identifier that maps an inbound webhook to its tenant
    pub routing_key: bool,
}

const fn field(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        sensitive: false,
        required: true,
        routing_key: false,
    }
}

const fn secret(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        sensitive: true,
        required: true,
        routing_key: false,
    }
}

const fn optional(spec: FieldSpec) -> FieldSpec {
    FieldSpec {
        required: false,
        ..spec
    }
}

const fn routing(spec: FieldSpec) -> FieldSpec {
    FieldSpec {
        routing_key: true,
        ..spec
    }
}

const WHATSAPP_FIELDS: &[FieldSpec] = &[
    routing(field("phone_number_id", "Phone Number ID")),
    field("business_account_id", "Business Account ID"),
    secret("access_token", "Access Token"),
    secret("verify_token", "Webhook Verify Token"),
    optional(secret("app_secret", "App Secret")),
];

const TWILIO_FIELDS: &[FieldSpec] = &[
    field("account_sid", "Account SID"),
    secret("auth_token", "Auth Token"),
    routing(field("phone_number", "Phone Number")),
    optional(field("messaging_service_sid", "Messaging Service SID")),
];

const STRIPE_FIELDS: &[FieldSpec] = &[
    field("publishable_key", "Publishable Key"),
    secret("secret_key", "Secret Key"),
    optional(secret("webhook_secret", "Webhook Signing Secret")),
];

const EMAIL_FIELDS: &[FieldSpec] = &[
    field("smtp_host", "SMTP Host"),
    field("smtp_port", "SMTP Port"),
    field("smtp_user", "SMTP Username"),
    secret("smtp_password", "SMTP Password"),
    field("from_address", "From Address"),
    optional(field("from_name", "From Name")),
];

/// Schema entry for the schema endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSchema {
    pub provider: Provider,
    pub label: &'static str,
    pub fields: &'static [FieldSpec],
}

pub fn provider_schemas() -> Vec<ProviderSchema> {
    Provider::iter()
        .map(|p| ProviderSchema {
            provider: p,
            label: p.label(),
            fields: p.fields(),
        })
        .collect()
}
