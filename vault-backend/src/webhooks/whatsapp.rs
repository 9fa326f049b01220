//! WhatsApp Cloud API webhooks: subscription handshake, delivery signature
//! and payload extraction.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::{rejected, secure_eq};
use crate::error::VaultResult;
use crate::inbound::{normalize_phone, InboundMessage};
use crate::models::MessageChannel;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Query parameters of the GET subscription handshake
#[derive(Debug, Default, Deserialize)]
pub struct ChallengeQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Accept the handshake when the mode is `subscribe` and the token matches one
/// of `expected_tokens`. Returns the challenge to echo back.
pub fn verify_challenge(query: &ChallengeQuery, expected_tokens: &[String]) -> VaultResult<String> {
    if query.mode.as_deref() != Some("subscribe") {
        return Err(rejected("hub.mode must be subscribe"));
    }

    let token = query.verify_token.as_deref().unwrap_or_default();
    // Compare against every candidate so timing does not reveal which one matched
    let matched = expected_tokens
        .iter()
        .fold(false, |acc, expected| secure_eq(token, expected) | acc);
    if token.is_empty() || !matched {
        return Err(rejected("verify token mismatch"));
    }

    query
        .challenge
        .clone()
        .ok_or_else(|| rejected("missing hub.challenge"))
}

/// Check `X-Hub-Signature-256: sha256=<hex>` against the raw body
pub fn verify_signature(body: &[u8], header: Option<&str>, app_secret: &str) -> VaultResult<()> {
    let header = header.ok_or_else(|| rejected("missing X-Hub-Signature-256"))?;
    let digest_hex = header
        .trim()
        .strip_prefix("sha256=")
        .ok_or_else(|| rejected("signature must use sha256=<hex> format"))?;
    let expected = hex::decode(digest_hex).map_err(|_| rejected("signature is not valid hex"))?;

    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .map_err(|_| rejected("invalid app secret"))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| rejected("signature mismatch"))
}

#[cfg(test)]
pub fn sign(body: &[u8], app_secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub messages: Vec<CloudMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Metadata {
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloudMessage {
    pub from: String,
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<TextBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Pull every inbound message out of a delivery. Status callbacks (sent,
/// delivered, read) carry no `messages` and yield nothing.
pub fn extract_messages(payload: &WebhookPayload) -> Vec<InboundMessage> {
    let mut out = Vec::new();
    if payload
        .object
        .as_deref()
        .is_some_and(|o| o != "whatsapp_business_account")
    {
        return out;
    }
    for change in payload.entry.iter().flat_map(|e| e.changes.iter()) {
        if change.field.as_deref().is_some_and(|f| f != "messages") {
            continue;
        }
        let routing_key = change
            .value
            .metadata
            .as_ref()
            .and_then(|m| m.phone_number_id.clone());

        for message in &change.value.messages {
            let kind = message.kind.as_deref().unwrap_or("text");
            let body = match (kind, &message.text) {
                ("text", Some(text)) => text.body.clone(),
                (other, _) => format!("[{}]", other),
            };
            out.push(InboundMessage {
                channel: MessageChannel::Whatsapp,
                routing_key: routing_key.clone(),
                from: normalize_phone(&message.from),
                body,
                external_id: Some(message.id.clone()),
                message_type: kind.to_string(),
            });
        }
    }
    out
}
