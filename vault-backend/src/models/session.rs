use chrono::{DateTime, Utc};
use serde::Serialize;

/// Bearer session resolving to a tenant. Issued by the account system.
#[derive(Debug, Clone, Serialize)]
pub struct TenantSession {
    pub id: i64,
    pub token: String,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
