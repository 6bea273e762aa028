// --- File: crates/bookify_db/src/repositories/event_type_sql.rs ---
//! SQL implementation of the host / event-type repository.

use crate::error::DbError;
use crate::models::{EventType, Host, LocationKind, Question, WorkingHours};
use crate::repositories::event_type::EventTypeRepository;
use crate::DbClient;
use bookify_common::services::BoxFuture;
use sqlx::Row;
use tracing::{debug, error, info};

/// SQL implementation of the event type repository
#[derive(Debug, Clone)]
pub struct SqlEventTypeRepository {
    db_client: DbClient,
}

impl SqlEventTypeRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }
}

fn location_kind_to_str(kind: LocationKind) -> &'static str {
    match kind {
        LocationKind::Meet => "meet",
        LocationKind::Phone => "phone",
        LocationKind::InPerson => "in_person",
    }
}

fn location_kind_from_str(raw: &str) -> Result<LocationKind, DbError> {
    match raw {
        "meet" => Ok(LocationKind::Meet),
        "phone" => Ok(LocationKind::Phone),
        "in_person" => Ok(LocationKind::InPerson),
        other => Err(DbError::Serialization(format!(
            "unknown location kind '{}'",
            other
        ))),
    }
}

fn row_to_event_type(row: &sqlx::any::AnyRow) -> Result<EventType, DbError> {
    let working_hours: Vec<WorkingHours> =
        serde_json::from_str(&row.try_get::<String, _>("working_hours").map_err(map_get)?)?;
    let questions: Vec<Question> =
        serde_json::from_str(&row.try_get::<String, _>("questions").map_err(map_get)?)?;
    let participating: Vec<String> = serde_json::from_str(
        &row.try_get::<String, _>("participating_calendars")
            .map_err(map_get)?,
    )?;
    let location_raw: String = row.try_get("location_kind").map_err(map_get)?;

    Ok(EventType {
        id: row.try_get("id").map_err(map_get)?,
        host_id: row.try_get("host_id").map_err(map_get)?,
        slug: row.try_get("slug").map_err(map_get)?,
        title: row.try_get("title").map_err(map_get)?,
        description: row.try_get("description").ok(),
        duration_minutes: row.try_get("duration_minutes").map_err(map_get)?,
        buffer_before_minutes: row.try_get("buffer_before_minutes").map_err(map_get)?,
        buffer_after_minutes: row.try_get("buffer_after_minutes").map_err(map_get)?,
        minimum_notice_minutes: row.try_get("minimum_notice_minutes").map_err(map_get)?,
        scheduling_window_days: row.try_get("scheduling_window_days").map_err(map_get)?,
        slot_interval_minutes: row.try_get("slot_interval_minutes").map_err(map_get)?,
        working_hours,
        questions,
        participating_calendars: participating,
        destination_calendar_id: row.try_get("destination_calendar_id").ok(),
        location_kind: location_kind_from_str(&location_raw)?,
        requires_confirmation: row.try_get::<i64, _>("requires_confirmation").map_err(map_get)? != 0,
        active: row.try_get::<i64, _>("active").map_err(map_get)? != 0,
    })
}

fn map_get(e: sqlx::Error) -> DbError {
    DbError::QueryError(e.to_string())
}

impl EventTypeRepository for SqlEventTypeRepository {
    fn init_schema(&self) -> BoxFuture<'_, (), DbError> {
        Box::pin(async move {
            debug!("Initializing host and event type schema");

            self.db_client
                .execute(
                    r#"
                CREATE TABLE IF NOT EXISTS hosts (
                    id TEXT PRIMARY KEY,
                    display_timezone TEXT NOT NULL
                )
            "#,
                )
                .await?;

            self.db_client
                .execute(
                    r#"
                CREATE TABLE IF NOT EXISTS event_types (
                    id TEXT PRIMARY KEY,
                    host_id TEXT NOT NULL,
                    slug TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT,
                    duration_minutes BIGINT NOT NULL,
                    buffer_before_minutes BIGINT NOT NULL DEFAULT 0,
                    buffer_after_minutes BIGINT NOT NULL DEFAULT 0,
                    minimum_notice_minutes BIGINT NOT NULL DEFAULT 0,
                    scheduling_window_days BIGINT NOT NULL DEFAULT 30,
                    slot_interval_minutes BIGINT NOT NULL DEFAULT 15,
                    working_hours TEXT NOT NULL,
                    questions TEXT NOT NULL DEFAULT '[]',
                    participating_calendars TEXT NOT NULL DEFAULT '[]',
                    destination_calendar_id TEXT,
                    location_kind TEXT NOT NULL,
                    requires_confirmation BIGINT NOT NULL DEFAULT 0,
                    active BIGINT NOT NULL DEFAULT 1,
                    UNIQUE(host_id, slug)
                )
            "#,
                )
                .await?;

            info!("Host and event type schema initialized");
            Ok(())
        })
    }

    fn upsert_host(&self, host: Host) -> BoxFuture<'_, Host, DbError> {
        Box::pin(async move {
            debug!("Upserting host: {}", host.id);

            // Portable upsert: update first, insert when nothing matched.
            let updated = sqlx::query("UPDATE hosts SET display_timezone = $1 WHERE id = $2")
                .bind(&host.display_timezone)
                .bind(&host.id)
                .execute(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            if updated.rows_affected() == 0 {
                sqlx::query("INSERT INTO hosts (id, display_timezone) VALUES ($1, $2)")
                    .bind(&host.id)
                    .bind(&host.display_timezone)
                    .execute(self.db_client.pool())
                    .await
                    .map_err(DbError::from)?;
            }

            Ok(host)
        })
    }

    fn find_host(&self, host_id: &str) -> BoxFuture<'_, Option<Host>, DbError> {
        let host_id = host_id.to_string();
        Box::pin(async move {
            let row = sqlx::query("SELECT id, display_timezone FROM hosts WHERE id = $1")
                .bind(&host_id)
                .fetch_optional(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            match row {
                Some(row) => Ok(Some(Host {
                    id: row.try_get("id").map_err(map_get)?,
                    display_timezone: row.try_get("display_timezone").map_err(map_get)?,
                })),
                None => Ok(None),
            }
        })
    }

    fn insert(&self, event_type: EventType) -> BoxFuture<'_, EventType, DbError> {
        Box::pin(async move {
            event_type.validate()?;
            debug!(
                "Inserting event type '{}' for host {}",
                event_type.slug, event_type.host_id
            );

            let query = r#"
                INSERT INTO event_types (
                    id, host_id, slug, title, description,
                    duration_minutes, buffer_before_minutes, buffer_after_minutes,
                    minimum_notice_minutes, scheduling_window_days, slot_interval_minutes,
                    working_hours, questions, participating_calendars,
                    destination_calendar_id, location_kind, requires_confirmation, active
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#;

            sqlx::query(query)
                .bind(&event_type.id)
                .bind(&event_type.host_id)
                .bind(&event_type.slug)
                .bind(&event_type.title)
                .bind(&event_type.description)
                .bind(event_type.duration_minutes)
                .bind(event_type.buffer_before_minutes)
                .bind(event_type.buffer_after_minutes)
                .bind(event_type.minimum_notice_minutes)
                .bind(event_type.scheduling_window_days)
                .bind(event_type.slot_interval_minutes)
                .bind(serde_json::to_string(&event_type.working_hours)?)
                .bind(serde_json::to_string(&event_type.questions)?)
                .bind(serde_json::to_string(&event_type.participating_calendars)?)
                .bind(&event_type.destination_calendar_id)
                .bind(location_kind_to_str(event_type.location_kind))
                .bind(event_type.requires_confirmation as i64)
                .bind(event_type.active as i64)
                .execute(self.db_client.pool())
                .await
                .map_err(|e| {
                    error!("Failed to insert event type: {}", e);
                    DbError::from(e)
                })?;

            Ok(event_type)
        })
    }

    fn find_by_id(&self, id: &str) -> BoxFuture<'_, Option<EventType>, DbError> {
        let id = id.to_string();
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM event_types WHERE id = $1")
                .bind(&id)
                .fetch_optional(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            row.map(|r| row_to_event_type(&r)).transpose()
        })
    }

    fn find_by_slug(
        &self,
        host_id: &str,
        slug: &str,
    ) -> BoxFuture<'_, Option<EventType>, DbError> {
        let host_id = host_id.to_string();
        let slug = slug.to_string();
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM event_types WHERE host_id = $1 AND slug = $2")
                .bind(&host_id)
                .bind(&slug)
                .fetch_optional(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            row.map(|r| row_to_event_type(&r)).transpose()
        })
    }

    fn set_active(&self, id: &str, active: bool) -> BoxFuture<'_, (), DbError> {
        let id = id.to_string();
        Box::pin(async move {
            let result = sqlx::query("UPDATE event_types SET active = $1 WHERE id = $2")
                .bind(active as i64)
                .bind(&id)
                .execute(self.db_client.pool())
                .await
                .map_err(DbError::from)?;

            if result.rows_affected() == 0 {
                return Err(DbError::NotFound(format!("event type {}", id)));
            }
            Ok(())
        })
    }
}
