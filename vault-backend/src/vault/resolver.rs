//! Outbound dispatch: build a live provider client for a tenant on demand.
//!
//! Only the secrets a client actually needs are decrypted, and only when the
//! client is built. "Never configured" and "configured but unreadable" are
//! separate errors so a key-rotation mistake does not look like a blank setup.

use crate::config::ProviderEndpoints;
use crate::error::{VaultError, VaultResult};
use crate::integrations::{MessageSender, SmtpSettings, StripeClient, TwilioClient, WhatsAppClient};
use crate::models::{CredentialRecord, MessageChannel, Provider};

use super::store::CredentialStore;

/// A ready-to-use client for one provider
pub enum ProviderHandle {
    Whatsapp(WhatsAppClient),
    Twilio(TwilioClient),
    Stripe(StripeClient),
    Email(SmtpSettings),
}

impl ProviderHandle {
    pub fn provider(&self) -> Provider {
        match self {
            Self::Whatsapp(_) => Provider::Whatsapp,
            Self::Twilio(_) => Provider::Twilio,
            Self::Stripe(_) => Provider::Stripe,
            Self::Email(_) => Provider::Email,
        }
    }

    /// Cheapest authenticated call the provider offers. Returns a short
    /// description of what answered.
    pub async fn test_connection(&self) -> Result<String, String> {
        match self {
            Self::Whatsapp(client) => client.test_connection().await,
            Self::Twilio(client) => client.test_connection().await,
            Self::Stripe(client) => client.test_connection().await,
            Self::Email(settings) => settings
                .test_connection()
                .await
                .map(|addr| format!("{} via {}", settings.from_header(), addr)),
        }
    }
}

#[derive(Clone)]
pub struct DispatchResolver {
    store: CredentialStore,
    endpoints: ProviderEndpoints,
    http: reqwest::Client,
}

impl DispatchResolver {
    pub fn new(store: CredentialStore, endpoints: ProviderEndpoints, http: reqwest::Client) -> Self {
        Self { store, endpoints, http }
    }

    pub fn resolve(&self, tenant_id: &str, provider: Provider) -> VaultResult<ProviderHandle> {
        let record = self.active_record(tenant_id, provider)?;
        self.build(&record)
    }

    /// Build a handle from an already loaded record (webhook paths have one in hand)
    pub fn build(&self, record: &CredentialRecord) -> VaultResult<ProviderHandle> {
        if !record.is_active {
            return Err(not_configured(record.provider));
        }

        let handle = match record.provider {
            Provider::Whatsapp => ProviderHandle::Whatsapp(WhatsAppClient::new(
                self.http.clone(),
                &self.endpoints.whatsapp_graph_url,
                plain(record, "phone_number_id")?,
                self.secret(record, "access_token")?,
            )),
            Provider::Twilio => ProviderHandle::Twilio(TwilioClient::new(
                self.http.clone(),
                &self.endpoints.twilio_api_url,
                plain(record, "account_sid")?,
                self.secret(record, "auth_token")?,
                plain(record, "phone_number")?,
                optional_plain(record, "messaging_service_sid"),
            )),
            Provider::Stripe => ProviderHandle::Stripe(StripeClient::new(
                self.http.clone(),
                &self.endpoints.stripe_api_url,
                self.secret(record, "secret_key")?,
            )),
            Provider::Email => {
                let port = SmtpSettings::parse_port(plain(record, "smtp_port")?)
                    .map_err(VaultError::Validation)?;
                ProviderHandle::Email(SmtpSettings {
                    host: plain(record, "smtp_host")?.to_string(),
                    port,
                    username: plain(record, "smtp_user")?.to_string(),
                    password: self.secret(record, "smtp_password")?,
                    from_address: plain(record, "from_address")?.to_string(),
                    from_name: optional_plain(record, "from_name").map(str::to_string),
                })
            }
        };

        log::debug!(
            "[DISPATCH] Built {} client for tenant {}",
            record.provider,
            record.tenant_id
        );
        Ok(handle)
    }

    /// Resolve the messaging provider behind a channel
    pub fn resolve_sender(
        &self,
        tenant_id: &str,
        channel: MessageChannel,
    ) -> VaultResult<Box<dyn MessageSender>> {
        let provider = match channel {
            MessageChannel::Whatsapp => Provider::Whatsapp,
            MessageChannel::Sms => Provider::Twilio,
        };
        match self.resolve(tenant_id, provider)? {
            ProviderHandle::Whatsapp(client) => Ok(Box::new(client)),
            ProviderHandle::Twilio(client) => Ok(Box::new(client)),
            other => Err(VaultError::Validation(format!(
                "{} cannot send messages",
                other.provider()
            ))),
        }
    }

    pub fn resolve_stripe(&self, tenant_id: &str) -> VaultResult<StripeClient> {
        match self.resolve(tenant_id, Provider::Stripe)? {
            ProviderHandle::Stripe(client) => Ok(client),
            other => Err(VaultError::Validation(format!(
                "expected a Stripe client, built {}",
                other.provider()
            ))),
        }
    }

    fn active_record(&self, tenant_id: &str, provider: Provider) -> VaultResult<CredentialRecord> {
        self.store
            .get(tenant_id, provider)?
            .into_record()
            .filter(|record| record.is_active)
            .ok_or_else(|| not_configured(provider))
    }

    fn secret(&self, record: &CredentialRecord, field: &str) -> VaultResult<String> {
        self.store
            .reveal(record, field)?
            .ok_or_else(|| missing(record.provider, field))
    }
}

fn plain<'a>(record: &'a CredentialRecord, field: &str) -> VaultResult<&'a str> {
    optional_plain(record, field).ok_or_else(|| missing(record.provider, field))
}

fn optional_plain<'a>(record: &'a CredentialRecord, field: &str) -> Option<&'a str> {
    record
        .credentials
        .get(field)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn not_configured(provider: Provider) -> VaultError {
    VaultError::NotConfigured {
        provider: provider.to_string(),
    }
}

fn missing(provider: Provider, field: &str) -> VaultError {
    VaultError::MissingField {
        provider: provider.to_string(),
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::FieldCipher;
    use crate::db::Database;
    use crate::models::CredentialFields;

    fn setup() -> (CredentialStore, DispatchResolver) {
        let db = Arc::new(Database::in_memory().unwrap());
        let store = CredentialStore::new(db, FieldCipher::new(&[5u8; 32]));
        let resolver = DispatchResolver::new(
            store.clone(),
            ProviderEndpoints::default(),
            reqwest::Client::new(),
        );
        (store, resolver)
    }

    fn fields(pairs: &[(&str, &str)]) -> CredentialFields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn save_stripe(store: &CredentialStore) {
        store
            .save(
                "t1",
                Provider::Stripe,
                fields(&[("publishable_key", "pk_1"), ("secret_key", "sk_1")]),
            )
            .unwrap();
    }

    #[test]
    fn test_unconfigured_is_not_configured() {
        let (_, resolver) = setup();
        let err = resolver.resolve("t1", Provider::Stripe).err().unwrap();
        assert!(matches!(err, VaultError::NotConfigured { .. }));
    }

    #[test]
    fn test_inactive_is_not_configured() {
        let (store, resolver) = setup();
        save_stripe(&store);
        assert!(resolver.resolve("t1", Provider::Stripe).is_ok());

        store.deactivate("t1", Provider::Stripe).unwrap();
        let err = resolver.resolve("t1", Provider::Stripe).err().unwrap();
        assert!(matches!(err, VaultError::NotConfigured { .. }));
    }

    #[test]
    fn test_unreadable_secret_is_decryption_failure() {
        let (store, resolver) = setup();
        save_stripe(&store);

        // Same record read back under a different key, as after a bad key rotation
        let record = store.get("t1", Provider::Stripe).unwrap().into_record().unwrap();
        let rotated = CredentialStore::new(
            Arc::new(Database::in_memory().unwrap()),
            FieldCipher::new(&[6u8; 32]),
        );
        let rotated_resolver =
            DispatchResolver::new(rotated, ProviderEndpoints::default(), reqwest::Client::new());

        let err = rotated_resolver.build(&record).err().unwrap();
        assert!(matches!(err, VaultError::DecryptionFailure { ref field, .. } if field == "secret_key"));
        assert!(!matches!(err, VaultError::NotConfigured { .. }));
        drop(resolver);
    }

    #[test]
    fn test_sender_for_channel() {
        let (store, resolver) = setup();
        store
            .save(
                "t1",
                Provider::Twilio,
                fields(&[("account_sid", "AC1"), ("auth_token", "tok"), ("phone_number", "+15550009999")]),
            )
            .unwrap();

        let sender = resolver.resolve_sender("t1", MessageChannel::Sms).ok().unwrap();
        assert_eq!(sender.channel(), MessageChannel::Sms);
        assert!(matches!(
            resolver.resolve_sender("t1", MessageChannel::Whatsapp).err().unwrap(),
            VaultError::NotConfigured { .. }
        ));
    }

    #[test]
    fn test_email_port_is_validated() {
        let (store, resolver) = setup();
        store
            .save(
                "t1",
                Provider::Email,
                fields(&[
                    ("smtp_host", "smtp.example.com"),
                    ("smtp_port", "not-a-port"),
                    ("smtp_user", "u"),
                    ("smtp_password", "p"),
                    ("from_address", "a@example.com"),
                ]),
            )
            .unwrap();
        assert!(matches!(
            resolver.resolve("t1", Provider::Email),
            Err(VaultError::Validation(_))
        ));
    }
}
