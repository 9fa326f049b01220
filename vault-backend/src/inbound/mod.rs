//! Inbound message normalizer and upsert engine.
//!
//! A verified provider payload becomes one (client, conversation, message)
//! triple for the tenant that owns the receiving number. The whole
//! find-or-create sequence runs in one write transaction on top of unique
//! indexes, so concurrent deliveries for the same new number converge on a
//! single client and conversation, and a failure leaves nothing half-written.

use crate::db::tables::conversations::{
    insert_message, record_inbound_activity, upsert_client, upsert_conversation,
};
use crate::db::Database;
use crate::error::VaultResult;
use crate::models::{
    Client, Conversation, CredentialRecord, Message, MessageChannel, NewMessage, Provider,
    SenderType,
};
use crate::vault::CredentialStore;

/// A provider-independent inbound text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: MessageChannel,
    /// Provider identifier of the receiving number (phone-number-id, `To`)
    pub routing_key: Option<String>,
    /// Sender phone number, normalized
    pub from: String,
    pub body: String,
    pub external_id: Option<String>,
    pub message_type: String,
}

impl InboundMessage {
    pub fn provider(&self) -> Provider {
        match self.channel {
            MessageChannel::Whatsapp => Provider::Whatsapp,
            MessageChannel::Sms => Provider::Twilio,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub client: Client,
    pub conversation: Conversation,
    /// `None` when the provider message id was already stored (a redelivery)
    pub message: Option<Message>,
}

impl IngestOutcome {
    pub fn is_duplicate(&self) -> bool {
        self.message.is_none()
    }
}

/// Canonical phone form: no `whatsapp:` prefix, no spacing or punctuation,
/// and a leading `+` on bare digit strings. WhatsApp sends `15550001`,
/// Twilio sends `+15550001`; both land on the same client.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("whatsapp:")
        .unwrap_or(trimmed)
        .trim();

    let compact: String = without_prefix
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '.'))
        .collect();

    if !compact.is_empty() && compact.chars().all(|c| c.is_ascii_digit()) {
        format!("+{}", compact)
    } else {
        compact
    }
}

/// Which tenant an inbound event belongs to
#[derive(Debug, Clone)]
pub enum TenantResolution {
    /// An active record claimed the routing key
    Routed(CredentialRecord),
    /// No record carries the key, but exactly one tenant has the provider active
    SoleActive(CredentialRecord),
    /// Nobody has this provider active
    Unknown,
    /// Several tenants are active and none claimed the key
    Ambiguous(usize),
}

impl TenantResolution {
    pub fn record(&self) -> Option<&CredentialRecord> {
        match self {
            Self::Routed(record) | Self::SoleActive(record) => Some(record),
            Self::Unknown | Self::Ambiguous(_) => None,
        }
    }
}

/// Map an inbound event to its tenant by the provider routing key, falling
/// back to the only active configuration when the key is unclaimed.
pub fn resolve_tenant(
    store: &CredentialStore,
    provider: Provider,
    routing_key: Option<&str>,
) -> VaultResult<TenantResolution> {
    if let Some(key) = routing_key.filter(|k| !k.trim().is_empty()) {
        if let Some(record) = store.find_by_routing_key(provider, key)? {
            return Ok(TenantResolution::Routed(record));
        }
    }

    let mut active = store.active_records(provider)?;
    match active.len() {
        0 => Ok(TenantResolution::Unknown),
        1 => {
            let record = active.remove(0);
            log::info!(
                "[INBOUND] {} routing key {:?} unclaimed, using sole active tenant {}",
                provider,
                routing_key,
                record.tenant_id
            );
            Ok(TenantResolution::SoleActive(record))
        }
        n => Ok(TenantResolution::Ambiguous(n)),
    }
}

/// Find-or-create client and conversation, append the message and advance
/// the conversation counters, all in one transaction. A redelivered provider
/// message id is acknowledged without touching the counters.
pub fn ingest(db: &Database, tenant_id: &str, inbound: &InboundMessage) -> VaultResult<IngestOutcome> {
    let phone = normalize_phone(&inbound.from);

    db.with_write_tx(|tx| {
        let client = upsert_client(tx, tenant_id, &phone)?;
        let conversation = upsert_conversation(tx, tenant_id, client.id)?;

        let message = insert_message(
            tx,
            &NewMessage {
                conversation_id: conversation.id,
                sender_type: SenderType::Client,
                content: &inbound.body,
                channel: inbound.channel,
                external_message_id: inbound.external_id.as_deref(),
                message_type: &inbound.message_type,
            },
        )?;

        if message.is_some() {
            record_inbound_activity(tx, conversation.id)?;
        } else {
            log::info!(
                "[INBOUND] Duplicate {} message {:?} for tenant {}, skipping",
                inbound.channel.as_ref(),
                inbound.external_id,
                tenant_id
            );
        }

        Ok(IngestOutcome {
            client,
            conversation,
            message,
        })
    })
}
