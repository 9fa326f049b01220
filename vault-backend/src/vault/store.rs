//! Per-tenant, per-provider credential storage with field-level encryption

use std::sync::Arc;

use crate::crypto::FieldCipher;
use crate::db::Database;
use crate::error::{VaultError, VaultResult};
use crate::inbound::normalize_phone;
use crate::models::{
    CredentialFields, CredentialLookup, CredentialMetadata, CredentialRecord,
    CredentialStatusResponse, Provider,
};

use super::masking::{is_mask, mask_credentials};

#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<Database>,
    cipher: FieldCipher,
}

impl CredentialStore {
    pub fn new(db: Arc<Database>, cipher: FieldCipher) -> Self {
        Self { db, cipher }
    }

    /// Validate, encrypt the sensitive subset and upsert. Returns metadata only.
    ///
    /// A sensitive field submitted as the mask marker keeps its stored envelope,
    /// so a form that echoes back the masked view does not wipe secrets.
    pub fn save(
        &self,
        tenant_id: &str,
        provider: Provider,
        submitted: CredentialFields,
    ) -> VaultResult<CredentialMetadata> {
        if let Some(unknown) = submitted.keys().find(|name| provider.field(name).is_none()) {
            return Err(VaultError::Validation(format!(
                "Unknown field '{}' for {}",
                unknown, provider
            )));
        }

        let existing = self.db.get_credentials(tenant_id, provider)?;
        let mut stored = CredentialFields::new();
        let mut fresh: Vec<&'static str> = Vec::new();

        for (name, value) in submitted {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }

            if !provider.is_sensitive(&name) {
                stored.insert(name, value);
                continue;
            }

            if is_mask(&value) {
                let kept = existing
                    .as_ref()
                    .and_then(|record| record.credentials.get(&name))
                    .cloned()
                    .ok_or_else(|| {
                        VaultError::Validation(format!("No stored value to keep for '{}'", name))
                    })?;
                stored.insert(name, kept);
            } else {
                if let Some(spec) = provider.field(&name) {
                    fresh.push(spec.name);
                }
                stored.insert(name, value);
            }
        }
        self.cipher.encrypt_fields(&mut stored, &fresh)?;

        if let Some(missing) = provider
            .fields()
            .iter()
            .find(|spec| spec.required && !stored.contains_key(spec.name))
        {
            return Err(VaultError::Validation(format!(
                "Missing required field '{}' for {}",
                missing.name, provider
            )));
        }

        let routing_key = provider
            .routing_field()
            .and_then(|field| stored.get(field))
            .map(|value| routing_value(provider, value));

        let record = self
            .db
            .upsert_credentials(tenant_id, provider, &stored, routing_key.as_deref())?;

        log::info!(
            "[VAULT] Saved {} credentials for tenant {} ({} fields)",
            provider,
            tenant_id,
            stored.len()
        );

        Ok(record.metadata())
    }

    /// Raw lookup for internal consumers. The record carries ciphertext and
    /// must not be returned to a caller directly.
    pub fn get(&self, tenant_id: &str, provider: Provider) -> VaultResult<CredentialLookup> {
        Ok(match self.db.get_credentials(tenant_id, provider)? {
            Some(record) => CredentialLookup::Configured(record),
            None => CredentialLookup::NotConfigured,
        })
    }

    /// Masked status view for the read endpoint
    pub fn status(&self, tenant_id: &str, provider: Provider) -> VaultResult<CredentialStatusResponse> {
        let record = match self.get(tenant_id, provider)? {
            CredentialLookup::NotConfigured => return Ok(CredentialStatusResponse::not_configured()),
            CredentialLookup::Configured(record) => record,
        };

        Ok(CredentialStatusResponse {
            configured: true,
            provider: Some(record.provider),
            is_active: Some(record.is_active),
            last_synced_at: record.last_synced_at,
            credentials: Some(mask_credentials(provider, &record.credentials)),
        })
    }

    /// Returns false when there was nothing to deactivate
    pub fn deactivate(&self, tenant_id: &str, provider: Provider) -> VaultResult<bool> {
        let changed = self.db.set_credentials_active(tenant_id, provider, false)?;
        if changed {
            log::info!("[VAULT] Deactivated {} for tenant {}", provider, tenant_id);
        }
        Ok(changed)
    }

    pub fn mark_synced(&self, tenant_id: &str, provider: Provider) -> VaultResult<()> {
        self.db.touch_credentials_synced(tenant_id, provider)?;
        Ok(())
    }

    /// The active record that claimed `routing_key` for this provider
    pub fn find_by_routing_key(
        &self,
        provider: Provider,
        routing_key: &str,
    ) -> VaultResult<Option<CredentialRecord>> {
        self.db
            .find_active_credentials_by_routing_key(provider, &routing_value(provider, routing_key))
    }

    pub fn active_records(&self, provider: Provider) -> VaultResult<Vec<CredentialRecord>> {
        self.db.list_active_credentials(provider)
    }

    /// Decrypt one sensitive field of a record. `Ok(None)` when the field was
    /// never stored; a stored value that will not open is a `DecryptionFailure`.
    pub fn reveal(&self, record: &CredentialRecord, field: &str) -> VaultResult<Option<String>> {
        let decrypted = self.cipher.decrypt_fields(&record.credentials, &[field]);
        if let Some((name, err)) = decrypted.failures().next() {
            return Err(VaultError::DecryptionFailure {
                provider: record.provider.to_string(),
                field: name.to_string(),
                source: err.clone(),
            });
        }
        Ok(decrypted.value(field).map(str::to_string))
    }
}

/// Canonical form of a routing identifier. Phone-number keys are normalized
/// so they match the sender/recipient form used by inbound payloads.
fn routing_value(provider: Provider, value: &str) -> String {
    match provider {
        Provider::Twilio => normalize_phone(value),
        _ => value.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::looks_like_envelope;
    use crate::vault::masking::MASK;

    fn store() -> CredentialStore {
        let db = Arc::new(Database::in_memory().unwrap());
        CredentialStore::new(db, FieldCipher::new(&[9u8; 32]))
    }

    fn fields(pairs: &[(&str, &str)]) -> CredentialFields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn stripe_fields() -> CredentialFields {
        fields(&[
            ("publishable_key", "pk_test_1"),
            ("secret_key", "sk_test_1"),
            ("webhook_secret", "whsec_1"),
        ])
    }

    #[test]
    fn test_save_encrypts_only_sensitive_fields() {
        let store = store();
        let meta = store.save("t1", Provider::Stripe, stripe_fields()).unwrap();
        assert!(meta.is_active);
        assert_eq!(meta.provider, Provider::Stripe);

        let record = store.get("t1", Provider::Stripe).unwrap().into_record().unwrap();
        assert_eq!(record.credentials["publishable_key"], "pk_test_1");
        assert!(looks_like_envelope(&record.credentials["secret_key"]));
        assert!(looks_like_envelope(&record.credentials["webhook_secret"]));
        assert_eq!(store.reveal(&record, "secret_key").unwrap().as_deref(), Some("sk_test_1"));
    }

    #[test]
    fn test_get_unconfigured() {
        let store = store();
        assert!(matches!(
            store.get("t1", Provider::Email).unwrap(),
            CredentialLookup::NotConfigured
        ));
        assert!(!store.status("t1", Provider::Email).unwrap().configured);
    }

    #[test]
    fn test_status_is_masked() {
        let store = store();
        store.save("t1", Provider::Stripe, stripe_fields()).unwrap();
        let status = store.status("t1", Provider::Stripe).unwrap();
        let creds = status.credentials.unwrap();
        assert_eq!(creds["publishable_key"], "pk_test_1");
        assert_eq!(creds["secret_key"], MASK);

        let json = serde_json::to_string(&store.status("t1", Provider::Stripe).unwrap()).unwrap();
        assert!(!json.contains("sk_test_1"));
        assert!(!json.contains("whsec_1"));
    }

    #[test]
    fn test_resave_with_mask_keeps_secret() {
        let store = store();
        store.save("t1", Provider::Stripe, stripe_fields()).unwrap();
        store
            .save(
                "t1",
                Provider::Stripe,
                fields(&[("publishable_key", "pk_test_2"), ("secret_key", MASK)]),
            )
            .unwrap();

        let record = store.get("t1", Provider::Stripe).unwrap().into_record().unwrap();
        assert_eq!(record.credentials["publishable_key"], "pk_test_2");
        assert_eq!(store.reveal(&record, "secret_key").unwrap().as_deref(), Some("sk_test_1"));
        // Full replace: the webhook secret was not resubmitted
        assert!(!record.credentials.contains_key("webhook_secret"));
    }

    #[test]
    fn test_mask_without_stored_value_is_rejected() {
        let store = store();
        let err = store
            .save("t1", Provider::Stripe, fields(&[("publishable_key", "pk"), ("secret_key", MASK)]))
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[test]
    fn test_validation() {
        let store = store();
        let unknown = store
            .save("t1", Provider::Stripe, fields(&[("api_token", "x")]))
            .unwrap_err();
        assert!(matches!(unknown, VaultError::Validation(_)));

        let missing = store
            .save("t1", Provider::Stripe, fields(&[("publishable_key", "pk")]))
            .unwrap_err();
        assert!(matches!(missing, VaultError::Validation(_)));
    }

    #[test]
    fn test_twilio_routing_key_is_normalized() {
        let store = store();
        store
            .save(
                "t1",
                Provider::Twilio,
                fields(&[
                    ("account_sid", "AC1"),
                    ("auth_token", "tok"),
                    ("phone_number", "1 555 000 9999"),
                ]),
            )
            .unwrap();
        let found = store.find_by_routing_key(Provider::Twilio, "+15550009999").unwrap();
        assert_eq!(found.unwrap().tenant_id, "t1");
    }

    #[test]
    fn test_deactivate_and_reveal_failure() {
        let store = store();
        store.save("t1", Provider::Stripe, stripe_fields()).unwrap();
        assert!(store.deactivate("t1", Provider::Stripe).unwrap());
        assert!(store.active_records(Provider::Stripe).unwrap().is_empty());

        let mut record = store.get("t1", Provider::Stripe).unwrap().into_record().unwrap();
        assert!(!record.is_active);
        record
            .credentials
            .insert("secret_key".to_string(), FieldCipher::new(&[3u8; 32]).encrypt("x").unwrap());
        assert!(matches!(
            store.reveal(&record, "secret_key"),
            Err(VaultError::DecryptionFailure { .. })
        ));
        assert_eq!(store.reveal(&record, "not_stored").unwrap(), None);
    }
}
