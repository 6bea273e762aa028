// --- File: crates/bookify_db/src/repositories/account_sql.rs ---
//! SQL implementation of the account / calendar repository.

use crate::error::DbError;
use crate::models::{from_ts_string, to_ts_string, CalendarRecord, ConnectedAccount};
use crate::repositories::account::{AccountRepository, BusyTarget};
use crate::DbClient;
use bookify_common::services::BoxFuture;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{debug, info};

/// SQL implementation of the account repository
#[derive(Debug, Clone)]
pub struct SqlAccountRepository {
    db_client: DbClient,
}

impl SqlAccountRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }
}

fn map_get(e: sqlx::Error) -> DbError {
    DbError::QueryError(e.to_string())
}

fn row_to_account(row: &sqlx::any::AnyRow) -> Result<ConnectedAccount, DbError> {
    let token_expires_at = match row.try_get::<String, _>("token_expires_at") {
        Ok(raw) => Some(from_ts_string(&raw)?),
        Err(_) => None,
    };
    let last_sync_at = match row.try_get::<String, _>("last_sync_at") {
        Ok(raw) => Some(from_ts_string(&raw)?),
        Err(_) => None,
    };

    Ok(ConnectedAccount {
        id: row.try_get("id").map_err(map_get)?,
        host_id: row.try_get("host_id").map_err(map_get)?,
        external_identity: row.try_get("external_identity").map_err(map_get)?,
        access_token_enc: row.try_get("access_token").ok(),
        refresh_token_enc: row.try_get("refresh_token").ok(),
        token_expires_at,
        scopes: row.try_get("scopes").ok(),
        is_valid: row.try_get::<i64, _>("is_valid").map_err(map_get)? != 0,
        last_sync_at,
    })
}

fn row_to_calendar(row: &sqlx::any::AnyRow) -> Result<CalendarRecord, DbError> {
    Ok(CalendarRecord {
        id: row.try_get("id").map_err(map_get)?,
        account_id: row.try_get("account_id").map_err(map_get)?,
        external_calendar_id: row.try_get("external_calendar_id").map_err(map_get)?,
        writable: row.try_get::<i64, _>("writable").map_err(map_get)? != 0,
        selected_for_busy: row.try_get::<i64, _>("selected_for_busy").map_err(map_get)? != 0,
        destination_eligible: row
            .try_get::<i64, _>("destination_eligible")
            .map_err(map_get)?
            != 0,
    })
}

impl AccountRepository for SqlAccountRepository {
    fn init_schema(&self) -> BoxFuture<'_, (), DbError> {
        Box::pin(async move {
            debug!("Initializing account and calendar schema");

            self.db_client
                .execute(
                    r#"
                CREATE TABLE IF NOT EXISTS connected_accounts (
                    id TEXT PRIMARY KEY,
                    host_id TEXT NOT NULL,
                    external_identity TEXT NOT NULL,
                    access_token TEXT,
                    refresh_token TEXT,
                    token_expires_at TEXT,
                    scopes TEXT,
                    is_valid BIGINT NOT NULL DEFAULT 1,
                    last_sync_at TEXT
                )
            "#,
                )
                .await?;

            self.db_client
                .execute(
                    r#"
                CREATE TABLE IF NOT EXISTS calendars (
                    id TEXT PRIMARY KEY,
                    account_id TEXT NOT NULL,
                    external_calendar_id TEXT NOT NULL,
                    writable BIGINT NOT NULL DEFAULT 0,
                    selected_for_busy BIGINT NOT NULL DEFAULT 0,
                    destination_eligible BIGINT NOT NULL DEFAULT 0,
                    UNIQUE(account_id, external_calendar_id)
                )
            "#,
                )
                .await?;

            info!("Account and calendar schema initialized");
            Ok(())
        })
    }

    fn upsert_account(
        &self,
        account: ConnectedAccount,
    ) -> BoxFuture<'_, ConnectedAccount, DbError> {
        Box::pin(async move {
            debug!("Upserting connected account {}", account.id);

            let updated = sqlx::query(
                r#"
                UPDATE connected_accounts
                SET host_id = $1, external_identity = $2, access_token = $3,
                    refresh_token = $4, token_expires_at = $5, scopes = $6,
                    is_valid = $7, last_sync_at = $8
                WHERE id = $9
            "#,
            )
            .bind(&account.host_id)
            .bind(&account.external_identity)
            .bind(&account.access_token_enc)
            .bind(&account.refresh_token_enc)
            .bind(account.token_expires_at.map(to_ts_string))
            .bind(&account.scopes)
            .bind(account.is_valid as i64)
            .bind(account.last_sync_at.map(to_ts_string))
            .bind(&account.id)
            .execute(self.db_client.pool())
            .await
            .map_err(DbError::from)?;

            if updated.rows_affected() == 0 {
                sqlx::query(
                    r#"
                    INSERT INTO connected_accounts (
                        id, host_id, external_identity, access_token, refresh_token,
                        token_expires_at, scopes, is_valid, last_sync_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
                )
                .bind(&account.id)
                .bind(&account.host_id)
                .bind(&account.external_identity)
                .bind(&account.access_token_enc)
                .bind(&account.refresh_token_enc)
                .bind(account.token_expires_at.map(to_ts_string))
                .bind(&account.scopes)
                .bind(account.is_valid as i64)
                .bind(account.last_sync_at.map(to_ts_string))
                .execute(self.db_client.pool())
                .await
                .map_err(DbError::from)?;
            }

            Ok(account)
        })
    }

    fn find_by_id(&self, id: &str) -> BoxFuture<'_, Option<ConnectedAccount>, DbError> {
        let id = id.to_string();
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM connected_accounts WHERE id = $1")
                .bind(&id)
                .fetch_optional(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            row.map(|r| row_to_account(&r)).transpose()
        })
    }

    fn mark_invalid(&self, id: &str) -> BoxFuture<'_, (), DbError> {
        let id = id.to_string();
        Box::pin(async move {
            info!("Marking connected account {} invalid", id);
            sqlx::query("UPDATE connected_accounts SET is_valid = 0 WHERE id = $1")
                .bind(&id)
                .execute(self.db_client.pool())
                .await
                .map_err(DbError::from)?;
            Ok(())
        })
    }

    fn update_tokens(
        &self,
        id: &str,
        access_token_enc: &str,
        refresh_token_enc: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, (), DbError> {
        let id = id.to_string();
        let access_token_enc = access_token_enc.to_string();
        let refresh_token_enc = refresh_token_enc.map(|s| s.to_string());
        Box::pin(async move {
            debug!("Persisting refreshed tokens for account {}", id);

            if let Some(refresh) = &refresh_token_enc {
                sqlx::query(
                    r#"
                    UPDATE connected_accounts
                    SET access_token = $1, refresh_token = $2, token_expires_at = $3,
                        last_sync_at = $4, is_valid = 1
                    WHERE id = $5
                "#,
                )
                .bind(&access_token_enc)
                .bind(refresh)
                .bind(to_ts_string(expires_at))
                .bind(to_ts_string(now))
                .bind(&id)
                .execute(self.db_client.pool())
                .await
                .map_err(DbError::from)?;
            } else {
                sqlx::query(
                    r#"
                    UPDATE connected_accounts
                    SET access_token = $1, token_expires_at = $2, last_sync_at = $3, is_valid = 1
                    WHERE id = $4
                "#,
                )
                .bind(&access_token_enc)
                .bind(to_ts_string(expires_at))
                .bind(to_ts_string(now))
                .bind(&id)
                .execute(self.db_client.pool())
                .await
                .map_err(DbError::from)?;
            }
            Ok(())
        })
    }

    fn upsert_calendar(&self, calendar: CalendarRecord) -> BoxFuture<'_, CalendarRecord, DbError> {
        Box::pin(async move {
            let updated = sqlx::query(
                r#"
                UPDATE calendars
                SET external_calendar_id = $1, writable = $2,
                    selected_for_busy = $3, destination_eligible = $4
                WHERE id = $5
            "#,
            )
            .bind(&calendar.external_calendar_id)
            .bind(calendar.writable as i64)
            .bind(calendar.selected_for_busy as i64)
            .bind(calendar.destination_eligible as i64)
            .bind(&calendar.id)
            .execute(self.db_client.pool())
            .await
            .map_err(DbError::from)?;

            if updated.rows_affected() == 0 {
                sqlx::query(
                    r#"
                    INSERT INTO calendars (
                        id, account_id, external_calendar_id,
                        writable, selected_for_busy, destination_eligible
                    ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
                )
                .bind(&calendar.id)
                .bind(&calendar.account_id)
                .bind(&calendar.external_calendar_id)
                .bind(calendar.writable as i64)
                .bind(calendar.selected_for_busy as i64)
                .bind(calendar.destination_eligible as i64)
                .execute(self.db_client.pool())
                .await
                .map_err(DbError::from)?;
            }

            Ok(calendar)
        })
    }

    fn busy_targets(&self, host_id: &str) -> BoxFuture<'_, Vec<BusyTarget>, DbError> {
        let host_id = host_id.to_string();
        Box::pin(async move {
            let account_rows = sqlx::query(
                "SELECT * FROM connected_accounts WHERE host_id = $1 AND is_valid = 1",
            )
            .bind(&host_id)
            .fetch_all(self.db_client.pool())
            .await
            .map_err(DbError::from)?;

            let mut targets = Vec::with_capacity(account_rows.len());
            for account_row in &account_rows {
                let account = row_to_account(account_row)?;

                let calendar_rows = sqlx::query(
                    "SELECT * FROM calendars WHERE account_id = $1 AND selected_for_busy = 1",
                )
                .bind(&account.id)
                .fetch_all(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

                let calendars: Vec<CalendarRecord> = calendar_rows
                    .iter()
                    .map(row_to_calendar)
                    .collect::<Result<_, _>>()?;

                if !calendars.is_empty() {
                    targets.push(BusyTarget { account, calendars });
                }
            }

            Ok(targets)
        })
    }

    fn calendar_with_account(
        &self,
        calendar_id: &str,
    ) -> BoxFuture<'_, Option<(ConnectedAccount, CalendarRecord)>, DbError> {
        let calendar_id = calendar_id.to_string();
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM calendars WHERE id = $1")
                .bind(&calendar_id)
                .fetch_optional(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            let calendar = match row {
                Some(row) => row_to_calendar(&row)?,
                None => return Ok(None),
            };

            let account = self.find_by_id(&calendar.account_id).await?;
            Ok(account.map(|a| (a, calendar)))
        })
    }
}
