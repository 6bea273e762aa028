// --- File: crates/bookify_db/src/models.rs ---
//! Domain records persisted in the booking ledger.

use crate::error::DbError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamps are stored as RFC3339 UTC text with second precision; the
/// fixed format keeps lexicographic and chronological order identical, which
/// the overlap queries rely on.
pub fn to_ts_string(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn from_ts_string(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(format!("invalid timestamp '{}': {}", raw, e)))
}

/// A host who owns event types, connected accounts and bookings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    /// IANA zone name, e.g. "America/New_York".
    pub display_timezone: String,
}

/// Booking lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DbError> {
        match raw {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(DbError::Serialization(format!(
                "unknown booking status '{}'",
                other
            ))),
        }
    }

    /// PENDING blocks the slot just like CONFIRMED does.
    pub fn blocks_slot(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

/// One working-hours rule, interpreted in the host timezone.
/// `day_of_week`: 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub day_of_week: u8,
    /// "HH:MM"
    pub start: String,
    /// "HH:MM", strictly after `start`
    pub end: String,
}

fn parse_hhmm(raw: &str) -> Option<u32> {
    let (h, m) = raw.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

impl WorkingHours {
    pub fn start_minutes(&self) -> Option<u32> {
        parse_hhmm(&self.start)
    }

    pub fn end_minutes(&self) -> Option<u32> {
        parse_hhmm(&self.end)
    }

    pub fn is_valid(&self) -> bool {
        match (self.start_minutes(), self.end_minutes()) {
            (Some(s), Some(e)) => self.day_of_week <= 6 && s < e,
            _ => false,
        }
    }
}

/// Where the meeting happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// Video conference; the external writer is asked for a meet link.
    Meet,
    Phone,
    InPerson,
}

/// A custom question the host asks at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Question {
    Text {
        id: String,
        label: String,
        required: bool,
    },
    Textarea {
        id: String,
        label: String,
        required: bool,
    },
    Select {
        id: String,
        label: String,
        required: bool,
        options: Vec<String>,
    },
}

impl Question {
    pub fn id(&self) -> &str {
        match self {
            Question::Text { id, .. } => id,
            Question::Textarea { id, .. } => id,
            Question::Select { id, .. } => id,
        }
    }

    pub fn required(&self) -> bool {
        match self {
            Question::Text { required, .. } => *required,
            Question::Textarea { required, .. } => *required,
            Question::Select { required, .. } => *required,
        }
    }

    /// Checks one answer against the question's constraints.
    pub fn accepts(&self, answer: &str) -> bool {
        match self {
            Question::Select { options, .. } => options.iter().any(|o| o == answer),
            _ => !answer.trim().is_empty(),
        }
    }
}

/// A bookable meeting template owned by one host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventType {
    pub id: String,
    pub host_id: String,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: i64,
    pub buffer_before_minutes: i64,
    pub buffer_after_minutes: i64,
    pub minimum_notice_minutes: i64,
    pub scheduling_window_days: i64,
    pub slot_interval_minutes: i64,
    pub working_hours: Vec<WorkingHours>,
    pub questions: Vec<Question>,
    /// Calendar record ids consulted for busy blocks. Empty means every
    /// calendar the host selected.
    pub participating_calendars: Vec<String>,
    /// Calendar record id that receives the external event.
    pub destination_calendar_id: Option<String>,
    pub location_kind: LocationKind,
    pub requires_confirmation: bool,
    pub active: bool,
}

impl EventType {
    /// Validates the configuration invariants before it is persisted.
    pub fn validate(&self) -> Result<(), DbError> {
        if !(5..=480).contains(&self.duration_minutes) {
            return Err(DbError::Serialization(format!(
                "duration_minutes must be within [5, 480], got {}",
                self.duration_minutes
            )));
        }
        if !(5..=60).contains(&self.slot_interval_minutes) {
            return Err(DbError::Serialization(format!(
                "slot_interval_minutes must be within [5, 60], got {}",
                self.slot_interval_minutes
            )));
        }
        if self.minimum_notice_minutes < 0 || self.scheduling_window_days < 0 {
            return Err(DbError::Serialization(
                "notice and window must be non-negative".to_string(),
            ));
        }
        if self.slug.trim().is_empty() {
            return Err(DbError::Serialization("slug must not be empty".to_string()));
        }
        for hours in &self.working_hours {
            if !hours.is_valid() {
                return Err(DbError::Serialization(format!(
                    "invalid working hours rule: day {} {}-{}",
                    hours.day_of_week, hours.start, hours.end
                )));
            }
        }
        if let Some(dest) = &self.destination_calendar_id {
            if !self.participating_calendars.is_empty()
                && !self.participating_calendars.contains(dest)
            {
                return Err(DbError::Serialization(
                    "destination calendar must be one of the participating calendars".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A durable booking row. The partial unique index over
/// `(host_id, start_time, end_time)` for non-cancelled rows is the source of
/// truth for at-most-one booking per slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Option<i64>,
    pub uid: String,
    pub host_id: String,
    pub event_type_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub guest_company: Option<String>,
    pub guest_notes: Option<String>,
    pub guest_timezone: String,
    pub custom_responses: BTreeMap<String, String>,
    pub idempotency_key: Option<String>,
    pub status: BookingStatus,
    pub external_event_id: Option<String>,
    pub meeting_url: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    /// Prior uid when this booking was produced by a reschedule.
    pub rescheduled_from_uid: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An external account connected by a host. Tokens are stored sealed by the
/// vault; this crate never sees plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
    pub host_id: String,
    /// Provider-side identity, e.g. the Google account email.
    pub external_identity: String,
    pub access_token_enc: Option<String>,
    pub refresh_token_enc: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<String>,
    pub is_valid: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// One calendar under a connected account, reconciled from the provider.
/// Selection is host-controlled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarRecord {
    pub id: String,
    pub account_id: String,
    pub external_calendar_id: String,
    pub writable: bool,
    pub selected_for_busy: bool,
    pub destination_eligible: bool,
}
