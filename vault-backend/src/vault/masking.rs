//! Display-safe projection of stored credentials.
//!
//! Never decrypts. A value is hidden when the provider schema marks its field
//! sensitive, or when it has the shape of a cipher envelope. Sensitive slots
//! holding plain text (legacy rows, botched imports) are hidden as well.

use crate::crypto::looks_like_envelope;
use crate::models::{CredentialFields, Provider};

/// Fixed marker shown in place of a secret. Carries no length hint.
pub const MASK: &str = "••••••••";

pub fn mask_value(provider: Provider, field: &str, value: &str) -> String {
    if provider.is_sensitive(field) {
        if !value.is_empty() && !looks_like_envelope(value) {
            log::warn!(
                "[VAULT] {} field '{}' holds a non-envelope value; masking anyway",
                provider,
                field
            );
        }
        return MASK.to_string();
    }
    if looks_like_envelope(value) {
        return MASK.to_string();
    }
    value.to_string()
}

pub fn mask_credentials(provider: Provider, fields: &CredentialFields) -> CredentialFields {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), mask_value(provider, name, value)))
        .collect()
}

pub fn is_mask(value: &str) -> bool {
    value == MASK
}
