//! Provider webhook verifiers, one per provider family.
//!
//! - WhatsApp: GET challenge-response handshake, optional `X-Hub-Signature-256`
//!   on deliveries
//! - Twilio: HMAC-SHA1 over the request URL and sorted form parameters
//! - Stripe: timestamped HMAC-SHA256 envelope with a replay tolerance
//!
//! Verifiers are pure functions over request parts; routing, persistence and
//! HTTP status mapping live in the webhook controller.

pub mod stripe;
pub mod twilio;
pub mod whatsapp;

use subtle::ConstantTimeEq;

use crate::error::VaultError;

/// Constant-time string comparison for shared tokens
pub(crate) fn secure_eq(left: &str, right: &str) -> bool {
    bool::from(left.as_bytes().ct_eq(right.as_bytes()))
}

pub(crate) fn rejected(reason: impl Into<String>) -> VaultError {
    VaultError::WebhookVerification(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_eq() {
        assert!(secure_eq("verify-me", "verify-me"));
        assert!(!secure_eq("verify-me", "verify-mE"));
        assert!(!secure_eq("verify-me", "verify-me-longer"));
        assert!(!secure_eq("", "x"));
    }
}
