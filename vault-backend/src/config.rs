use std::env;

use crate::crypto::FieldCipher;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const ENCRYPTION_KEY: &str = "CREDENTIALS_ENCRYPTION_KEY";
    pub const SESSION_TTL_HOURS: &str = "SESSION_TTL_HOURS";
    // Externally visible origin, used to rebuild the URL a provider signed
    pub const PUBLIC_BASE_URL: &str = "PUBLIC_BASE_URL";
    // Process-wide webhook secrets (fallbacks when no tenant record matches)
    pub const TWILIO_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";
    pub const STRIPE_WEBHOOK_SECRET: &str = "STRIPE_WEBHOOK_SECRET";
    pub const STRIPE_WEBHOOK_TOLERANCE_SECS: &str = "STRIPE_WEBHOOK_TOLERANCE_SECS";
    pub const WHATSAPP_VERIFY_TOKEN: &str = "WHATSAPP_VERIFY_TOKEN";
    // Provider API base URLs
    pub const WHATSAPP_GRAPH_URL: &str = "WHATSAPP_GRAPH_URL";
    pub const TWILIO_API_URL: &str = "TWILIO_API_URL";
    pub const STRIPE_API_URL: &str = "STRIPE_API_URL";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const DATABASE_URL: &str = "./.db/vault.db";
    pub const SESSION_TTL_HOURS: i64 = 24;
    pub const STRIPE_WEBHOOK_TOLERANCE_SECS: i64 = 300;
    pub const WHATSAPP_GRAPH_URL: &str = "https://graph.facebook.com/v18.0";
    pub const TWILIO_API_URL: &str = "https://api.twilio.com";
    pub const STRIPE_API_URL: &str = "https://api.stripe.com";
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set; refusing to start without a credential encryption key")]
    MissingEncryptionKey(&'static str),

    #[error("{0} must be 64 hex characters (32 bytes)")]
    InvalidEncryptionKey(&'static str),

    #[error("{name} has an invalid value: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Base URLs for outbound provider APIs. Overridable so tests and staging
/// can point at local fakes.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub whatsapp_graph_url: String,
    pub twilio_api_url: String,
    pub stripe_api_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            whatsapp_graph_url: defaults::WHATSAPP_GRAPH_URL.to_string(),
            twilio_api_url: defaults::TWILIO_API_URL.to_string(),
            stripe_api_url: defaults::STRIPE_API_URL.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Raw 32-byte key for the field cipher. Never logged.
    pub encryption_key: [u8; 32],
    pub session_ttl_hours: i64,
    pub public_base_url: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_webhook_tolerance_secs: i64,
    pub whatsapp_verify_token: Option<String>,
    pub endpoints: ProviderEndpoints,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("public_base_url", &self.public_base_url)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// Read an env var, treating empty/whitespace values as unset
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(default),
    }
}

/// Decode the hex encryption key. Anything other than exactly 32 bytes is rejected.
pub fn parse_encryption_key(raw: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(raw.trim())
        .map_err(|_| ConfigError::InvalidEncryptionKey(env_vars::ENCRYPTION_KEY))?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidEncryptionKey(env_vars::ENCRYPTION_KEY))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_key = non_empty_var(env_vars::ENCRYPTION_KEY)
            .ok_or(ConfigError::MissingEncryptionKey(env_vars::ENCRYPTION_KEY))?;
        let encryption_key = parse_encryption_key(&raw_key)?;

        Ok(Self {
            port: parse_var(env_vars::PORT, defaults::PORT)?,
            database_url: non_empty_var(env_vars::DATABASE_URL)
                .unwrap_or_else(|| defaults::DATABASE_URL.to_string()),
            encryption_key,
            session_ttl_hours: parse_var(env_vars::SESSION_TTL_HOURS, defaults::SESSION_TTL_HOURS)?,
            public_base_url: non_empty_var(env_vars::PUBLIC_BASE_URL)
                .map(|u| u.trim_end_matches('/').to_string()),
            twilio_auth_token: non_empty_var(env_vars::TWILIO_AUTH_TOKEN),
            stripe_webhook_secret: non_empty_var(env_vars::STRIPE_WEBHOOK_SECRET),
            stripe_webhook_tolerance_secs: parse_var(
                env_vars::STRIPE_WEBHOOK_TOLERANCE_SECS,
                defaults::STRIPE_WEBHOOK_TOLERANCE_SECS,
            )?,
            whatsapp_verify_token: non_empty_var(env_vars::WHATSAPP_VERIFY_TOKEN),
            endpoints: ProviderEndpoints {
                whatsapp_graph_url: non_empty_var(env_vars::WHATSAPP_GRAPH_URL)
                    .unwrap_or_else(|| defaults::WHATSAPP_GRAPH_URL.to_string()),
                twilio_api_url: non_empty_var(env_vars::TWILIO_API_URL)
                    .unwrap_or_else(|| defaults::TWILIO_API_URL.to_string()),
                stripe_api_url: non_empty_var(env_vars::STRIPE_API_URL)
                    .unwrap_or_else(|| defaults::STRIPE_API_URL.to_string()),
            },
        })
    }

    /// Build the process-wide field cipher from the configured key
    pub fn field_cipher(&self) -> FieldCipher {
        FieldCipher::new(&self.encryption_key)
    }

    /// Config for tests: fixed key, no process-wide secrets, providers
    /// pointed at an unroutable local port.
    #[cfg(test)]
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            port: defaults::PORT,
            database_url: database_url.to_string(),
            encryption_key: [7u8; 32],
            session_ttl_hours: defaults::SESSION_TTL_HOURS,
            public_base_url: Some("https://vault.example.com".to_string()),
            twilio_auth_token: None,
            stripe_webhook_secret: None,
            stripe_webhook_tolerance_secs: defaults::STRIPE_WEBHOOK_TOLERANCE_SECS,
            whatsapp_verify_token: None,
            endpoints: ProviderEndpoints {
                whatsapp_graph_url: "http://127.0.0.1:9".to_string(),
                twilio_api_url: "http://127.0.0.1:9".to_string(),
                stripe_api_url: "http://127.0.0.1:9".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encryption_key() {
        let key = parse_encryption_key(&"ab".repeat(32)).unwrap();
        assert_eq!(key, [0xab; 32]);
    }

    #[test]
    fn test_parse_encryption_key_rejects_short_and_non_hex() {
        assert!(matches!(
            parse_encryption_key(&"ab".repeat(16)),
            Err(ConfigError::InvalidEncryptionKey(_))
        ));
        assert!(matches!(
            parse_encryption_key(&"zz".repeat(32)),
            Err(ConfigError::InvalidEncryptionKey(_))
        ));
    }

    #[test]
    fn test_debug_does_not_print_key() {
        let config = Config::for_tests("./x.db");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("encryption_key"));
        assert!(!printed.contains("[7, 7"));
    }
}
