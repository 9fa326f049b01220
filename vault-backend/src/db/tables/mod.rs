//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod sessions;           // tenant_sessions
mod credentials;        // integration_credentials
pub mod conversations;  // clients, conversations, messages (inbound upsert primitives)
mod payments;           // payments, appointments.payment_status
