use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Which side of the conversation authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SenderType {
    /// The business (tenant-authored, outbound)
    Tenant,
    /// The client on the other end (inbound)
    Client,
}

/// Provider channel a message travelled over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageChannel {
    Whatsapp,
    Sms,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub tenant_id: String,
    pub name: String,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub tenant_id: String,
    pub client_id: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_type: SenderType,
    pub content: String,
    pub channel: MessageChannel,
    pub external_message_id: Option<String>,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

/// A message to append, before it has an id
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub conversation_id: i64,
    pub sender_type: SenderType,
    pub content: &'a str,
    pub channel: MessageChannel,
    pub external_message_id: Option<&'a str>,
    pub message_type: &'a str,
}

/// Request body for sending a tenant-authored message
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    pub channel: MessageChannel,
}
