use chrono::{DateTime, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Transaction, TransactionBehavior};
use std::path::Path;

use crate::error::VaultError;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConn = r2d2::PooledConnection<SqliteConnectionManager>;
pub type DbResult<T> = Result<T, VaultError>;

const POOL_SIZE: u32 = 8;

pub struct Database {
    pool: DbPool,
}

impl Database {
    pub fn new(database_url: &str) -> DbResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let manager = SqliteConnectionManager::file(database_url).with_init(|c| {
            c.execute_batch(
                "PRAGMA busy_timeout=5000; PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;",
            )
        });
        let pool = r2d2::Pool::builder().max_size(POOL_SIZE).build(manager)?;
        let db = Self { pool };
        db.init()?;
        Ok(db)
    }

    /// Single-connection in-memory database (each pooled connection to
    /// `:memory:` would otherwise see its own empty database)
    #[cfg(test)]
    pub fn in_memory() -> DbResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
        let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
        let db = Self { pool };
        db.init()?;
        Ok(db)
    }

    pub fn conn(&self) -> DbResult<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction. The write lock is taken
    /// up front, so concurrent writers queue on the busy timeout instead of
    /// failing on upgrade. Any error rolls the whole sequence back.
    pub fn with_write_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> DbResult<T>,
    ) -> DbResult<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn init(&self) -> DbResult<()> {
        let conn = self.conn()?;

        // Bearer sessions issued by the account system
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tenant_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT UNIQUE NOT NULL,
                tenant_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            [],
        )?;

        // One configuration per tenant per provider
        conn.execute(
            "CREATE TABLE IF NOT EXISTS integration_credentials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                credentials TEXT NOT NULL,
                routing_key TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_synced_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(tenant_id, provider)
            )",
            [],
        )?;

        // An active routing identifier belongs to exactly one tenant
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_routing
             ON integration_credentials(provider, routing_key)
             WHERE routing_key IS NOT NULL AND is_active = 1",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(tenant_id, phone_number)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                client_id INTEGER NOT NULL,
                last_message_at TEXT,
                unread_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (client_id) REFERENCES clients(id),
                UNIQUE(tenant_id, client_id)
            )",
            [],
        )?;

        // NULL external ids never collide, so outbound rows without one are unaffected
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL,
                sender_type TEXT NOT NULL,
                content TEXT NOT NULL,
                channel TEXT NOT NULL,
                external_message_id TEXT,
                message_type TEXT NOT NULL DEFAULT 'text',
                created_at TEXT NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id),
                UNIQUE(conversation_id, external_message_id)
            )",
            [],
        )?;

        // Owned by the scheduling side; only payment_status is written here
        conn.execute(
            "CREATE TABLE IF NOT EXISTS appointments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                client_id INTEGER,
                payment_status TEXT NOT NULL DEFAULT 'unpaid',
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                client_id INTEGER,
                appointment_id INTEGER,
                provider_payment_id TEXT UNIQUE NOT NULL,
                amount_cents INTEGER NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL,
                paid_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

/// Parse an RFC 3339 column into a UTC timestamp
pub(crate) fn parse_datetime(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_optional_datetime(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_datetime(idx, &v)).transpose()
}

/// Parse a strum-backed enum column
pub(crate) fn parse_enum<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = strum::ParseError>,
{
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// True if the error is a UNIQUE/constraint violation
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
