use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::Provider;

/// Field name -> stored value. Sensitive values are cipher envelopes.
pub type CredentialFields = BTreeMap<String, String>;

/// One tenant's configuration for one provider, as stored.
/// Carries ciphertext; never serialize this to a client.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub id: i64,
    pub tenant_id: String,
    pub provider: Provider,
    pub credentials: CredentialFields,
    pub routing_key: Option<String>,
    pub is_active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn metadata(&self) -> CredentialMetadata {
        CredentialMetadata {
            id: self.id,
            provider: self.provider,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

/// Public metadata returned by a save
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialMetadata {
    pub id: i64,
    pub provider: Provider,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of looking up a record
#[derive(Debug, Clone)]
pub enum CredentialLookup {
    NotConfigured,
    Configured(CredentialRecord),
}

impl CredentialLookup {
    pub fn into_record(self) -> Option<CredentialRecord> {
        match self {
            Self::NotConfigured => None,
            Self::Configured(record) => Some(record),
        }
    }
}

/// Response type for the credential read endpoint (masked values only)
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatusResponse {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialFields>,
}

impl CredentialStatusResponse {
    pub fn not_configured() -> Self {
        Self {
            configured: false,
            provider: None,
            is_active: None,
            last_synced_at: None,
            credentials: None,
        }
    }
}

/// Request body for saving a provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct SaveCredentialsRequest {
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl SaveCredentialsRequest {
    /// Flatten JSON values to strings. Numbers and booleans are accepted
    /// (e.g. an SMTP port sent as a number); null drops the field.
    pub fn into_string_fields(self) -> Result<CredentialFields, String> {
        let mut out = BTreeMap::new();
        for (name, value) in self.fields {
            let value = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return Err(format!("Field '{}' must be a string", name)),
            };
            out.insert(name, value);
        }
        Ok(out)
    }
}
