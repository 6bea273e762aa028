// --- File: crates/bookify_db/src/repositories/booking_sql.rs ---
//! SQL implementation of the booking repository.

use crate::error::DbError;
use crate::models::{from_ts_string, to_ts_string, Booking, BookingStatus};
use crate::repositories::booking::BookingRepository;
use crate::DbClient;
use bookify_common::services::BoxFuture;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// SQL implementation of the booking repository
#[derive(Debug, Clone)]
pub struct SqlBookingRepository {
    db_client: DbClient,
}

impl SqlBookingRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }
}

const BOOKING_COLUMNS: &str = r#"
    id, uid, host_id, event_type_id, start_time, end_time,
    guest_name, guest_email, guest_phone, guest_company, guest_notes,
    guest_timezone, custom_responses, idempotency_key, status,
    external_event_id, meeting_url, cancelled_at, cancel_reason,
    rescheduled_from_uid, created_at
"#;

fn map_get(e: sqlx::Error) -> DbError {
    DbError::QueryError(e.to_string())
}

fn row_to_booking(row: &sqlx::any::AnyRow) -> Result<Booking, DbError> {
    let status_raw: String = row.try_get("status").map_err(map_get)?;
    let custom_raw: String = row
        .try_get("custom_responses")
        .unwrap_or_else(|_| "{}".to_string());
    let custom_responses: BTreeMap<String, String> = serde_json::from_str(&custom_raw)?;

    let cancelled_at = match row.try_get::<String, _>("cancelled_at") {
        Ok(raw) => Some(from_ts_string(&raw)?),
        Err(_) => None,
    };

    Ok(Booking {
        id: row.try_get("id").ok(),
        uid: row.try_get("uid").map_err(map_get)?,
        host_id: row.try_get("host_id").map_err(map_get)?,
        event_type_id: row.try_get("event_type_id").map_err(map_get)?,
        start_time: from_ts_string(&row.try_get::<String, _>("start_time").map_err(map_get)?)?,
        end_time: from_ts_string(&row.try_get::<String, _>("end_time").map_err(map_get)?)?,
        guest_name: row.try_get("guest_name").map_err(map_get)?,
        guest_email: row.try_get("guest_email").map_err(map_get)?,
        guest_phone: row.try_get("guest_phone").ok(),
        guest_company: row.try_get("guest_company").ok(),
        guest_notes: row.try_get("guest_notes").ok(),
        guest_timezone: row.try_get("guest_timezone").map_err(map_get)?,
        custom_responses,
        idempotency_key: row.try_get("idempotency_key").ok(),
        status: BookingStatus::parse(&status_raw)?,
        external_event_id: row.try_get("external_event_id").ok(),
        meeting_url: row.try_get("meeting_url").ok(),
        cancelled_at,
        cancel_reason: row.try_get("cancel_reason").ok(),
        rescheduled_from_uid: row.try_get("rescheduled_from_uid").ok(),
        created_at: from_ts_string(&row.try_get::<String, _>("created_at").map_err(map_get)?)?,
    })
}

impl BookingRepository for SqlBookingRepository {
    fn init_schema(&self) -> BoxFuture<'_, (), DbError> {
        Box::pin(async move {
            debug!("Initializing booking schema");

            self.db_client
                .execute(
                    r#"
                CREATE TABLE IF NOT EXISTS bookings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uid TEXT NOT NULL UNIQUE,
                    host_id TEXT NOT NULL,
                    event_type_id TEXT NOT NULL,
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL,
                    guest_name TEXT NOT NULL,
                    guest_email TEXT NOT NULL,
                    guest_phone TEXT,
                    guest_company TEXT,
                    guest_notes TEXT,
                    guest_timezone TEXT NOT NULL,
                    custom_responses TEXT NOT NULL DEFAULT '{}',
                    idempotency_key TEXT,
                    status TEXT NOT NULL,
                    external_event_id TEXT,
                    meeting_url TEXT,
                    cancelled_at TEXT,
                    cancel_reason TEXT,
                    rescheduled_from_uid TEXT,
                    created_at TEXT NOT NULL
                )
            "#,
                )
                .await?;

            // At-most-one non-cancelled booking per (host, start, end): the
            // source of truth for concurrent commits.
            self.db_client
                .execute(
                    r#"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_slot
                ON bookings(host_id, start_time, end_time)
                WHERE status != 'CANCELLED'
            "#,
                )
                .await?;

            self.db_client
                .execute(
                    r#"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_idempotency
                ON bookings(idempotency_key)
                WHERE idempotency_key IS NOT NULL
            "#,
                )
                .await?;

            self.db_client
                .execute(
                    r#"
                CREATE INDEX IF NOT EXISTS idx_bookings_host_window
                ON bookings(host_id, start_time)
            "#,
                )
                .await?;

            info!("Booking schema initialized");
            Ok(())
        })
    }

    fn insert(&self, booking: Booking) -> BoxFuture<'_, Booking, DbError> {
        Box::pin(async move {
            debug!(
                "Inserting booking {} for host {} at {}",
                booking.uid, booking.host_id, booking.start_time
            );

            let mut tx = self.db_client.begin().await?;

            let query = format!(
                r#"
                INSERT INTO bookings (
                    uid, host_id, event_type_id, start_time, end_time,
                    guest_name, guest_email, guest_phone, guest_company, guest_notes,
                    guest_timezone, custom_responses, idempotency_key, status,
                    external_event_id, meeting_url, cancelled_at, cancel_reason,
                    rescheduled_from_uid, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                          $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
                RETURNING {}
            "#,
                BOOKING_COLUMNS
            );

            let row = sqlx::query(&query)
                .bind(&booking.uid)
                .bind(&booking.host_id)
                .bind(&booking.event_type_id)
                .bind(to_ts_string(booking.start_time))
                .bind(to_ts_string(booking.end_time))
                .bind(&booking.guest_name)
                .bind(&booking.guest_email)
                .bind(&booking.guest_phone)
                .bind(&booking.guest_company)
                .bind(&booking.guest_notes)
                .bind(&booking.guest_timezone)
                .bind(serde_json::to_string(&booking.custom_responses)?)
                .bind(&booking.idempotency_key)
                .bind(booking.status.as_str())
                .bind(&booking.external_event_id)
                .bind(&booking.meeting_url)
                .bind(booking.cancelled_at.map(to_ts_string))
                .bind(&booking.cancel_reason)
                .bind(&booking.rescheduled_from_uid)
                .bind(to_ts_string(booking.created_at))
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    let classified = DbError::from(e);
                    if !classified.is_conflict() {
                        error!("Failed to insert booking: {}", classified);
                    }
                    classified
                })?;

            tx.commit()
                .await
                .map_err(|e| DbError::TransactionError(e.to_string()))?;

            let inserted = row_to_booking(&row)?;
            info!("Booking {} committed", inserted.uid);
            Ok(inserted)
        })
    }

    fn find_by_uid(&self, uid: &str) -> BoxFuture<'_, Option<Booking>, DbError> {
        let uid = uid.to_string();
        Box::pin(async move {
            let query = format!("SELECT {} FROM bookings WHERE uid = $1", BOOKING_COLUMNS);
            let row = sqlx::query(&query)
                .bind(&uid)
                .fetch_optional(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            row.map(|r| row_to_booking(&r)).transpose()
        })
    }

    fn find_by_idempotency_key(&self, key: &str) -> BoxFuture<'_, Option<Booking>, DbError> {
        let key = key.to_string();
        Box::pin(async move {
            let query = format!(
                "SELECT {} FROM bookings WHERE idempotency_key = $1",
                BOOKING_COLUMNS
            );
            let row = sqlx::query(&query)
                .bind(&key)
                .fetch_optional(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            row.map(|r| row_to_booking(&r)).transpose()
        })
    }

    fn find_overlapping(
        &self,
        host_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'_, Vec<Booking>, DbError> {
        let host_id = host_id.to_string();
        Box::pin(async move {
            let query = format!(
                r#"
                SELECT {} FROM bookings
                WHERE host_id = $1
                  AND status IN ('PENDING', 'CONFIRMED')
                  AND start_time < $2
                  AND end_time > $3
                ORDER BY start_time ASC
            "#,
                BOOKING_COLUMNS
            );

            let rows = sqlx::query(&query)
                .bind(&host_id)
                .bind(to_ts_string(to))
                .bind(to_ts_string(from))
                .fetch_all(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            rows.iter().map(row_to_booking).collect()
        })
    }

    fn cancel(
        &self,
        uid: &str,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> BoxFuture<'_, Booking, DbError> {
        let uid = uid.to_string();
        Box::pin(async move {
            debug!("Cancelling booking {}", uid);

            let result = sqlx::query(
                r#"
                UPDATE bookings
                SET status = 'CANCELLED', cancelled_at = $1, cancel_reason = $2
                WHERE uid = $3 AND status != 'CANCELLED'
            "#,
            )
            .bind(to_ts_string(at))
            .bind(&reason)
            .bind(&uid)
            .execute(self.db_client.pool())
            .await
            .map_err(DbError::from)?;

            if result.rows_affected() == 0 {
                debug!("Booking {} already cancelled or missing", uid);
            }

            self.find_by_uid(&uid)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("booking {}", uid)))
        })
    }

    fn reschedule(
        &self,
        uid: &str,
        new_uid: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, Booking, DbError> {
        let uid = uid.to_string();
        let new_uid = new_uid.to_string();
        Box::pin(async move {
            debug!("Rescheduling booking {} to {}", uid, start);

            let mut tx = self.db_client.begin().await?;

            let result = sqlx::query(
                r#"
                UPDATE bookings
                SET uid = $1, start_time = $2, end_time = $3, rescheduled_from_uid = $4
                WHERE uid = $5 AND status != 'CANCELLED'
            "#,
            )
            .bind(&new_uid)
            .bind(to_ts_string(start))
            .bind(to_ts_string(end))
            .bind(&uid)
            .bind(&uid)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

            if result.rows_affected() == 0 {
                return Err(DbError::NotFound(format!("booking {}", uid)));
            }

            tx.commit()
                .await
                .map_err(|e| DbError::TransactionError(e.to_string()))?;

            self.find_by_uid(&new_uid)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("booking {}", new_uid)))
        })
    }

    fn set_external_ref(
        &self,
        uid: &str,
        event_id: &str,
        meeting_url: Option<String>,
    ) -> BoxFuture<'_, (), DbError> {
        let uid = uid.to_string();
        let event_id = event_id.to_string();
        Box::pin(async move {
            sqlx::query(
                "UPDATE bookings SET external_event_id = $1, meeting_url = $2 WHERE uid = $3",
            )
            .bind(&event_id)
            .bind(&meeting_url)
            .bind(&uid)
            .execute(self.db_client.pool())
            .await
            .map_err(DbError::from)?;
            Ok(())
        })
    }

    fn list_for_host(
        &self,
        host_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        include_cancelled: bool,
    ) -> BoxFuture<'_, Vec<Booking>, DbError> {
        let host_id = host_id.to_string();
        Box::pin(async move {
            let status_clause = if include_cancelled {
                ""
            } else {
                "AND status != 'CANCELLED'"
            };
            let query = format!(
                r#"
                SELECT {} FROM bookings
                WHERE host_id = $1
                  AND start_time < $2
                  AND end_time > $3
                  {}
                ORDER BY start_time ASC
            "#,
                BOOKING_COLUMNS, status_clause
            );

            let rows = sqlx::query(&query)
                .bind(&host_id)
                .bind(to_ts_string(to))
                .bind(to_ts_string(from))
                .fetch_all(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            rows.iter().map(row_to_booking).collect()
        })
    }
}
