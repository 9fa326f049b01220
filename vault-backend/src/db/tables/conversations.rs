//! Database methods for clients, conversations and messages
//!
//! The free functions take a `&Connection` so the inbound engine can chain
//! them inside one write transaction. Each find-or-create is an
//! `INSERT .. ON CONFLICT DO NOTHING` followed by a re-select on the natural key.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::db::sqlite::{parse_datetime, parse_enum, parse_optional_datetime};
use crate::db::{Database, DbResult};
use crate::error::VaultError;
use crate::models::{Client, Conversation, Message, MessageChannel, NewMessage, SenderType};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_type, content, channel,
                               external_message_id, message_type, created_at";

fn row_to_client(row: &Row<'_>) -> rusqlite::Result<Client> {
    let created_at: String = row.get(4)?;
    Ok(Client {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        phone_number: row.get(3)?,
        created_at: parse_datetime(4, &created_at)?,
    })
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let created_at: String = row.get(5)?;
    Ok(Conversation {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        client_id: row.get(2)?,
        last_message_at: parse_optional_datetime(3, row.get(3)?)?,
        unread_count: row.get(4)?,
        created_at: parse_datetime(5, &created_at)?,
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let sender_type: String = row.get(2)?;
    let channel: String = row.get(4)?;
    let created_at: String = row.get(7)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_type: parse_enum(2, &sender_type)?,
        content: row.get(3)?,
        channel: parse_enum(4, &channel)?,
        external_message_id: row.get(5)?,
        message_type: row.get(6)?,
        created_at: parse_datetime(7, &created_at)?,
    })
}

/// Find-or-create the client for (tenant, phone). New clients are named after
/// their phone number until someone renames them.
pub fn upsert_client(conn: &Connection, tenant_id: &str, phone_number: &str) -> DbResult<Client> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO clients (tenant_id, name, phone_number, created_at)
         VALUES (?1, ?2, ?2, ?3)
         ON CONFLICT(tenant_id, phone_number) DO NOTHING",
        rusqlite::params![tenant_id, phone_number, now],
    )?;

    find_client(conn, tenant_id, phone_number)?
        .ok_or(VaultError::RaceConditionConflict { entity: "client" })
}

pub fn find_client(conn: &Connection, tenant_id: &str, phone_number: &str) -> DbResult<Option<Client>> {
    let client = conn
        .query_row(
            "SELECT id, tenant_id, name, phone_number, created_at
             FROM clients WHERE tenant_id = ?1 AND phone_number = ?2",
            rusqlite::params![tenant_id, phone_number],
            row_to_client,
        )
        .optional()?;
    Ok(client)
}

/// Find-or-create the conversation for (tenant, client)
pub fn upsert_conversation(conn: &Connection, tenant_id: &str, client_id: i64) -> DbResult<Conversation> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO conversations (tenant_id, client_id, unread_count, created_at)
         VALUES (?1, ?2, 0, ?3)
         ON CONFLICT(tenant_id, client_id) DO NOTHING",
        rusqlite::params![tenant_id, client_id, now],
    )?;

    conn.query_row(
        "SELECT id, tenant_id, client_id, last_message_at, unread_count, created_at
         FROM conversations WHERE tenant_id = ?1 AND client_id = ?2",
        rusqlite::params![tenant_id, client_id],
        row_to_conversation,
    )
    .optional()?
    .ok_or(VaultError::RaceConditionConflict { entity: "conversation" })
}

/// Append a message. Returns `None` when a message with the same provider id
/// already exists in the conversation (a redelivery).
pub fn insert_message(conn: &Connection, message: &NewMessage<'_>) -> DbResult<Option<Message>> {
    let now = Utc::now().to_rfc3339();
    let inserted = conn.execute(
        "INSERT INTO messages
            (conversation_id, sender_type, content, channel, external_message_id, message_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(conversation_id, external_message_id) DO NOTHING",
        rusqlite::params![
            message.conversation_id,
            message.sender_type.as_ref(),
            message.content,
            message.channel.as_ref(),
            message.external_message_id,
            message.message_type,
            now
        ],
    )?;

    if inserted == 0 {
        return Ok(None);
    }

    let id = conn.last_insert_rowid();
    let stored = conn.query_row(
        &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
        [id],
        row_to_message,
    )?;
    Ok(Some(stored))
}

/// Advance `last_message_at` and `unread_count` for one inbound message
pub fn record_inbound_activity(conn: &Connection, conversation_id: i64) -> DbResult<()> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE conversations SET last_message_at = ?1, unread_count = unread_count + 1
         WHERE id = ?2",
        rusqlite::params![now, conversation_id],
    )?;
    if rows == 0 {
        return Err(VaultError::RaceConditionConflict { entity: "conversation" });
    }
    Ok(())
}

impl Database {
    /// Conversation by id, scoped to its owning tenant
    pub fn get_conversation_for_tenant(
        &self,
        tenant_id: &str,
        conversation_id: i64,
    ) -> DbResult<Option<Conversation>> {
        let conn = self.conn()?;
        let conversation = conn
            .query_row(
                "SELECT id, tenant_id, client_id, last_message_at, unread_count, created_at
                 FROM conversations WHERE id = ?1 AND tenant_id = ?2",
                rusqlite::params![conversation_id, tenant_id],
                row_to_conversation,
            )
            .optional()?;
        Ok(conversation)
    }

    pub fn get_client(&self, tenant_id: &str, client_id: i64) -> DbResult<Option<Client>> {
        let conn = self.conn()?;
        let client = conn
            .query_row(
                "SELECT id, tenant_id, name, phone_number, created_at
                 FROM clients WHERE id = ?1 AND tenant_id = ?2",
                rusqlite::params![client_id, tenant_id],
                row_to_client,
            )
            .optional()?;
        Ok(client)
    }

    #[cfg(test)]
    pub fn find_client_by_phone(&self, tenant_id: &str, phone_number: &str) -> DbResult<Option<Client>> {
        let conn = self.conn()?;
        find_client(&conn, tenant_id, phone_number)
    }

    /// Messages oldest first
    pub fn list_messages(&self, conversation_id: i64) -> DbResult<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY id ASC",
            MESSAGE_COLUMNS
        ))?;
        let messages = stmt
            .query_map([conversation_id], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Record a tenant-authored message after a successful provider send.
    /// Unread count and last-message time are inbound-only and stay put.
    pub fn append_outbound_message(
        &self,
        conversation_id: i64,
        content: &str,
        channel: MessageChannel,
        external_message_id: Option<&str>,
    ) -> DbResult<Message> {
        let conn = self.conn()?;
        let message = NewMessage {
            conversation_id,
            sender_type: SenderType::Tenant,
            content,
            channel,
            external_message_id,
            message_type: "text",
        };
        insert_message(&conn, &message)?
            .ok_or(VaultError::RaceConditionConflict { entity: "message" })
    }

    #[cfg(test)]
    pub fn count_clients(&self, tenant_id: &str) -> DbResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM clients WHERE tenant_id = ?1",
            [tenant_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    #[cfg(test)]
    pub fn count_conversations(&self, tenant_id: &str) -> DbResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE tenant_id = ?1",
            [tenant_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
