//! Database methods for payments and appointment payment status

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::db::sqlite::{parse_datetime, parse_enum, parse_optional_datetime};
use crate::db::{Database, DbResult};
use crate::error::VaultError;
use crate::models::{Payment, PaymentStatus};

const PAYMENT_COLUMNS: &str = "id, tenant_id, client_id, appointment_id, provider_payment_id,
                               amount_cents, currency, status, paid_at, created_at";

fn row_to_payment(row: &Row<'_>) -> rusqlite::Result<Payment> {
    let status: String = row.get(7)?;
    let created_at: String = row.get(9)?;
    Ok(Payment {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        client_id: row.get(2)?,
        appointment_id: row.get(3)?,
        provider_payment_id: row.get(4)?,
        amount_cents: row.get(5)?,
        currency: row.get(6)?,
        status: parse_enum(7, &status)?,
        paid_at: parse_optional_datetime(8, row.get(8)?)?,
        created_at: parse_datetime(9, &created_at)?,
    })
}

impl Database {
    /// Record a freshly created payment intent as `pending`
    pub fn insert_payment(
        &self,
        tenant_id: &str,
        provider_payment_id: &str,
        amount_cents: i64,
        currency: &str,
        client_id: Option<i64>,
        appointment_id: Option<i64>,
    ) -> DbResult<Payment> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO payments
                (tenant_id, client_id, appointment_id, provider_payment_id, amount_cents,
                 currency, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                tenant_id,
                client_id,
                appointment_id,
                provider_payment_id,
                amount_cents,
                currency,
                PaymentStatus::Pending.as_ref(),
                now
            ],
        )?;
        drop(conn);

        self.get_payment_by_provider_id(provider_payment_id)?
            .ok_or(VaultError::RaceConditionConflict { entity: "payment" })
    }

    pub fn get_payment_by_provider_id(&self, provider_payment_id: &str) -> DbResult<Option<Payment>> {
        let conn = self.conn()?;
        let payment = conn
            .query_row(
                &format!(
                    "SELECT {} FROM payments WHERE provider_payment_id = ?1",
                    PAYMENT_COLUMNS
                ),
                [provider_payment_id],
                row_to_payment,
            )
            .optional()?;
        Ok(payment)
    }

    /// Settle a payment from a verified provider event. The payment row and,
    /// for a completed payment, its appointment are written in one transaction.
    /// The appointment is only touched when the payment row matched.
    /// Returns the number of payment rows moved (0 when the intent is unknown
    /// or already in a state `status` may not replace).
    pub fn settle_payment(
        &self,
        provider_payment_id: &str,
        status: PaymentStatus,
        appointment_id: Option<i64>,
        tenant_id: Option<&str>,
    ) -> DbResult<usize> {
        self.with_write_tx(|tx| {
            let rows = set_payment_status(tx, provider_payment_id, status, tenant_id)?;
            if rows > 0 && status == PaymentStatus::Completed {
                if let Some(appointment_id) = appointment_id {
                    mark_appointment_paid(tx, appointment_id, tenant_id)?;
                }
            }
            Ok(rows)
        })
    }
}

/// Current states a payment may not leave for `target`. Refunds are final and
/// a failure never overrides a completed charge.
fn blocked_sources(target: PaymentStatus) -> &'static [PaymentStatus] {
    match target {
        PaymentStatus::Refunded => &[],
        PaymentStatus::Completed => &[PaymentStatus::Refunded],
        PaymentStatus::Failed => &[PaymentStatus::Completed, PaymentStatus::Refunded],
        PaymentStatus::Pending => &[
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ],
    }
}

/// Move a payment to a new status unless it already sits in a state the
/// target may not replace. Re-applying the same status matches again;
/// `paid_at` keeps its first stamp.
fn set_payment_status(
    conn: &Connection,
    provider_payment_id: &str,
    status: PaymentStatus,
    tenant_id: Option<&str>,
) -> DbResult<usize> {
    let now = Utc::now().to_rfc3339();
    let paid_at = if status == PaymentStatus::Completed { Some(now.clone()) } else { None };

    let blocked = blocked_sources(status);
    let guard = if blocked.is_empty() {
        String::new()
    } else {
        let states: Vec<String> = blocked.iter().map(|&s| format!("'{}'", s.as_ref())).collect();
        format!(" AND status NOT IN ({})", states.join(", "))
    };

    let rows = conn.execute(
        &format!(
            "UPDATE payments SET
                status = ?1,
                paid_at = COALESCE(paid_at, ?2),
                updated_at = ?3
             WHERE provider_payment_id = ?4 AND (?5 IS NULL OR tenant_id = ?5){}",
            guard
        ),
        rusqlite::params![status.as_ref(), paid_at, now, provider_payment_id, tenant_id],
    )?;
    Ok(rows)
}

/// Flag an appointment as paid. Appointments belong to the scheduling side;
/// this is the only column written here.
fn mark_appointment_paid(conn: &Connection, appointment_id: i64, tenant_id: Option<&str>) -> DbResult<usize> {
    let now = Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE appointments SET payment_status = 'paid', updated_at = ?1
         WHERE id = ?2 AND (?3 IS NULL OR tenant_id = ?3)",
        rusqlite::params![now, appointment_id, tenant_id],
    )?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_appointment(db: &Database, tenant_id: &str) -> i64 {
        let conn = db.conn().unwrap();
        conn.execute(
            "INSERT INTO appointments (tenant_id, updated_at) VALUES (?1, '2024-01-01T00:00:00Z')",
            [tenant_id],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn appointment_status(db: &Database, id: i64) -> String {
        let conn = db.conn().unwrap();
        conn.query_row("SELECT payment_status FROM appointments WHERE id = ?1", [id], |r| r.get(0))
            .unwrap()
    }

    fn status_of(db: &Database, provider_payment_id: &str) -> PaymentStatus {
        db.get_payment_by_provider_id(provider_payment_id).unwrap().unwrap().status
    }

    #[test]
    fn test_insert_payment_is_pending() {
        let db = Database::in_memory().unwrap();
        let payment = db.insert_payment("t1", "pi_1", 5000, "usd", None, None).unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.paid_at.is_none());
        assert_eq!(payment.amount_cents, 5000);
    }

    #[test]
    fn test_completed_twice_keeps_first_paid_at() {
        let db = Database::in_memory().unwrap();
        db.insert_payment("t1", "pi_1", 5000, "usd", None, None).unwrap();

        assert_eq!(db.settle_payment("pi_1", PaymentStatus::Completed, None, Some("t1")).unwrap(), 1);
        let first = db.get_payment_by_provider_id("pi_1").unwrap().unwrap();
        assert_eq!(db.settle_payment("pi_1", PaymentStatus::Completed, None, Some("t1")).unwrap(), 1);
        let second = db.get_payment_by_provider_id("pi_1").unwrap().unwrap();

        assert_eq!(second.status, PaymentStatus::Completed);
        assert_eq!(first.paid_at, second.paid_at);
        assert!(second.paid_at.is_some());
    }

    #[test]
    fn test_status_update_scoped_by_tenant() {
        let db = Database::in_memory().unwrap();
        db.insert_payment("t1", "pi_1", 100, "usd", None, None).unwrap();
        assert_eq!(db.settle_payment("pi_1", PaymentStatus::Failed, None, Some("t2")).unwrap(), 0);
        assert_eq!(db.settle_payment("pi_1", PaymentStatus::Failed, None, None).unwrap(), 1);
        assert_eq!(db.settle_payment("pi_unknown", PaymentStatus::Failed, None, None).unwrap(), 0);
    }

    #[test]
    fn test_refund_survives_succeeded_redelivery() {
        let db = Database::in_memory().unwrap();
        db.insert_payment("t1", "pi_1", 5000, "usd", None, None).unwrap();

        db.settle_payment("pi_1", PaymentStatus::Completed, None, Some("t1")).unwrap();
        assert_eq!(db.settle_payment("pi_1", PaymentStatus::Refunded, None, Some("t1")).unwrap(), 1);
        assert_eq!(db.settle_payment("pi_1", PaymentStatus::Completed, None, Some("t1")).unwrap(), 0);
        assert_eq!(db.settle_payment("pi_1", PaymentStatus::Failed, None, Some("t1")).unwrap(), 0);

        let payment = db.get_payment_by_provider_id("pi_1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert!(payment.paid_at.is_some());
    }

    #[test]
    fn test_failure_does_not_override_completion() {
        let db = Database::in_memory().unwrap();
        db.insert_payment("t1", "pi_1", 5000, "usd", None, None).unwrap();

        db.settle_payment("pi_1", PaymentStatus::Completed, None, None).unwrap();
        assert_eq!(db.settle_payment("pi_1", PaymentStatus::Failed, None, None).unwrap(), 0);
        assert_eq!(status_of(&db, "pi_1"), PaymentStatus::Completed);

        // A later success after a failed attempt still lands
        db.insert_payment("t1", "pi_2", 5000, "usd", None, None).unwrap();
        db.settle_payment("pi_2", PaymentStatus::Failed, None, None).unwrap();
        assert_eq!(db.settle_payment("pi_2", PaymentStatus::Completed, None, None).unwrap(), 1);
        assert_eq!(status_of(&db, "pi_2"), PaymentStatus::Completed);
    }

    #[test]
    fn test_appointment_marked_only_when_payment_matches() {
        let db = Database::in_memory().unwrap();
        let appointment_id = seed_appointment(&db, "t1");
        assert_eq!(appointment_status(&db, appointment_id), "unpaid");

        let rows = db
            .settle_payment("pi_unknown", PaymentStatus::Completed, Some(appointment_id), Some("t1"))
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(appointment_status(&db, appointment_id), "unpaid");

        db.insert_payment("t1", "pi_1", 5000, "usd", None, Some(appointment_id)).unwrap();
        db.settle_payment("pi_1", PaymentStatus::Completed, Some(appointment_id), Some("t2")).unwrap();
        assert_eq!(appointment_status(&db, appointment_id), "unpaid");

        db.settle_payment("pi_1", PaymentStatus::Completed, Some(appointment_id), Some("t1")).unwrap();
        assert_eq!(appointment_status(&db, appointment_id), "paid");
    }
}
