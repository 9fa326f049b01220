//! Bearer session lookups for tenant-authenticated endpoints

use chrono::{Duration, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::db::sqlite::parse_datetime;
use crate::db::{Database, DbResult};
use crate::models::TenantSession;

impl Database {
    /// Issue a session for a tenant. Sign-in itself lives in the account
    /// system; this is the hand-off point it writes through.
    pub fn create_session(&self, tenant_id: &str, ttl_hours: i64) -> DbResult<TenantSession> {
        let conn = self.conn()?;
        let token = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let expires_at = created_at + Duration::hours(ttl_hours);

        conn.execute(
            "INSERT INTO tenant_sessions (token, tenant_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                token,
                tenant_id,
                created_at.to_rfc3339(),
                expires_at.to_rfc3339()
            ],
        )?;

        Ok(TenantSession {
            id: conn.last_insert_rowid(),
            token,
            tenant_id: tenant_id.to_string(),
            created_at,
            expires_at,
        })
    }

    pub fn validate_session(&self, token: &str) -> DbResult<Option<TenantSession>> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let session = conn
            .query_row(
                "SELECT id, token, tenant_id, created_at, expires_at
                 FROM tenant_sessions WHERE token = ?1 AND expires_at > ?2",
                rusqlite::params![token, now],
                |row| {
                    let created_at: String = row.get(3)?;
                    let expires_at: String = row.get(4)?;
                    Ok(TenantSession {
                        id: row.get(0)?,
                        token: row.get(1)?,
                        tenant_id: row.get(2)?,
                        created_at: parse_datetime(3, &created_at)?,
                        expires_at: parse_datetime(4, &expires_at)?,
                    })
                },
            )
            .optional()?;

        Ok(session)
    }
}
