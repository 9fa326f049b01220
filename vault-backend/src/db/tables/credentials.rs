//! Database methods for integration_credentials table

use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use crate::db::sqlite::{is_constraint_violation, parse_datetime, parse_enum, parse_optional_datetime};
use crate::db::{Database, DbResult};
use crate::error::VaultError;
use crate::models::{CredentialFields, CredentialRecord, Provider};

const RECORD_COLUMNS: &str = "id, tenant_id, provider, credentials, routing_key, is_active,
                              last_synced_at, created_at, updated_at";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CredentialRecord> {
    let provider: String = row.get(2)?;
    let credentials_json: String = row.get(3)?;
    let credentials: CredentialFields = serde_json::from_str(&credentials_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(CredentialRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        provider: parse_enum(2, &provider)?,
        credentials,
        routing_key: row.get(4)?,
        is_active: row.get::<_, i32>(5)? != 0,
        last_synced_at: parse_optional_datetime(6, row.get(6)?)?,
        created_at: parse_datetime(7, &created_at)?,
        updated_at: parse_datetime(8, &updated_at)?,
    })
}

impl Database {
    /// Insert or fully replace the credentials for (tenant, provider).
    /// A save always (re)activates the record.
    pub fn upsert_credentials(
        &self,
        tenant_id: &str,
        provider: Provider,
        credentials: &CredentialFields,
        routing_key: Option<&str>,
    ) -> DbResult<CredentialRecord> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let credentials_json = serde_json::to_string(credentials)?;

        let result = conn.execute(
            "INSERT INTO integration_credentials
                (tenant_id, provider, credentials, routing_key, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
             ON CONFLICT(tenant_id, provider) DO UPDATE SET
                credentials = excluded.credentials,
                routing_key = excluded.routing_key,
                is_active = 1,
                updated_at = excluded.updated_at",
            rusqlite::params![tenant_id, provider.as_str(), credentials_json, routing_key, now],
        );

        match result {
            Ok(_) => {}
            // (tenant, provider) conflicts are absorbed by the upsert, so this is the routing index
            Err(e) if is_constraint_violation(&e) => {
                return Err(VaultError::RoutingKeyConflict {
                    provider: provider.to_string(),
                    routing_key: routing_key.unwrap_or_default().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        drop(conn);

        self.get_credentials(tenant_id, provider)?
            .ok_or(VaultError::RaceConditionConflict { entity: "integration_credentials" })
    }

    pub fn get_credentials(
        &self,
        tenant_id: &str,
        provider: Provider,
    ) -> DbResult<Option<CredentialRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM integration_credentials WHERE tenant_id = ?1 AND provider = ?2",
                    RECORD_COLUMNS
                ),
                rusqlite::params![tenant_id, provider.as_str()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// The active record that claimed this provider routing identifier
    pub fn find_active_credentials_by_routing_key(
        &self,
        provider: Provider,
        routing_key: &str,
    ) -> DbResult<Option<CredentialRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM integration_credentials
                     WHERE provider = ?1 AND routing_key = ?2 AND is_active = 1",
                    RECORD_COLUMNS
                ),
                rusqlite::params![provider.as_str(), routing_key],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_active_credentials(&self, provider: Provider) -> DbResult<Vec<CredentialRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM integration_credentials WHERE provider = ?1 AND is_active = 1 ORDER BY id",
            RECORD_COLUMNS
        ))?;
        let records = stmt
            .query_map([provider.as_str()], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn set_credentials_active(
        &self,
        tenant_id: &str,
        provider: Provider,
        active: bool,
    ) -> DbResult<bool> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE integration_credentials SET is_active = ?1, updated_at = ?2
             WHERE tenant_id = ?3 AND provider = ?4",
            rusqlite::params![if active { 1 } else { 0 }, now, tenant_id, provider.as_str()],
        )?;
        Ok(rows > 0)
    }

    /// Stamp a successful outbound test call
    pub fn touch_credentials_synced(&self, tenant_id: &str, provider: Provider) -> DbResult<bool> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE integration_credentials SET last_synced_at = ?1
             WHERE tenant_id = ?2 AND provider = ?3",
            rusqlite::params![now, tenant_id, provider.as_str()],
        )?;
        Ok(rows > 0)
    }
}
