// --- File: crates/bookify_gcal/src/service.rs ---
//! Google Calendar REST client.
//!
//! Implements the `CalendarApi` trait over the Calendar v3 endpoints with
//! per-account bearer tokens from the token manager. One free/busy request
//! carries every calendar of the account.

use crate::auth::TokenManager;
use crate::error::GcalError;
use bookify_common::services::{
    BoxFuture, BoxedError, BusyBlock, CalendarApi, ExternalEvent, ExternalEventRef,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct GoogleCalendarClient {
    tokens: Arc<TokenManager>,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Deserialize, Debug)]
struct FreeBusyPeriod {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Deserialize, Debug)]
struct FreeBusyCalendar {
    busy: Option<Vec<FreeBusyPeriod>>,
    errors: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize, Debug)]
struct FreeBusyResponse {
    calendars: Option<HashMap<String, FreeBusyCalendar>>,
}

#[derive(Deserialize, Debug)]
struct EntryPoint {
    #[serde(rename = "entryPointType")]
    entry_point_type: Option<String>,
    uri: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ConferenceData {
    #[serde(rename = "entryPoints")]
    entry_points: Option<Vec<EntryPoint>>,
}

#[derive(Deserialize, Debug)]
struct EventResource {
    id: String,
    #[serde(rename = "hangoutLink")]
    hangout_link: Option<String>,
    #[serde(rename = "conferenceData")]
    conference_data: Option<ConferenceData>,
}

/// Parses a free/busy boundary. Timed periods arrive as RFC3339; date-only
/// values come from all-day events and resolve to local midnight in the host
/// timezone.
pub(crate) fn parse_busy_time(raw: &str, host_tz: Tz) -> Result<DateTime<Utc>, GcalError> {
    if raw.contains('T') {
        return DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| GcalError::TimeParseError(format!("'{}': {}", raw, e)));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| GcalError::TimeParseError(format!("'{}': {}", raw, e)))?;
    let midnight = date.and_hms_opt(0, 0, 0).unwrap();
    host_tz
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| GcalError::TimeParseError(format!("no instant for '{}'", raw)))
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl GoogleCalendarClient {
    pub fn new(tokens: Arc<TokenManager>, api_base: String, http: reqwest::Client) -> Self {
        Self {
            tokens,
            api_base,
            http,
        }
    }

    async fn api_error(response: reqwest::Response) -> GcalError {
        let status_code = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        GcalError::ApiError {
            status_code,
            message,
        }
    }

    async fn free_busy_inner(
        &self,
        account_id: &str,
        calendar_ids: &[String],
        host_tz: Tz,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyBlock>, GcalError> {
        let token = self.tokens.access_token(account_id).await?;

        let items: Vec<serde_json::Value> =
            calendar_ids.iter().map(|id| json!({ "id": id })).collect();
        let body = json!({
            "timeMin": rfc3339(time_min),
            "timeMax": rfc3339(time_max),
            "timeZone": "UTC",
            "items": items,
        });

        debug!(
            "Querying free/busy for account {} over {} calendars",
            account_id,
            calendar_ids.len()
        );

        let response = self
            .http
            .post(format!("{}/freeBusy", self.api_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let parsed: FreeBusyResponse = response.json().await?;
        let mut blocks = Vec::new();

        if let Some(calendars) = parsed.calendars {
            for (calendar_id, info) in calendars {
                if let Some(errors) = &info.errors {
                    if !errors.is_empty() {
                        warn!(
                            "Free/busy reported errors for calendar {}: {:?}",
                            calendar_id, errors
                        );
                        continue;
                    }
                }
                for period in info.busy.unwrap_or_default() {
                    match (&period.start, &period.end) {
                        (Some(start), Some(end)) => {
                            let start = parse_busy_time(start, host_tz)?;
                            let end = parse_busy_time(end, host_tz)?;
                            if start < end {
                                blocks.push(BusyBlock::new(start, end, calendar_id.clone()));
                            }
                        }
                        _ => {
                            warn!(
                                "Skipping busy period with missing start/end: {:?}",
                                period
                            );
                        }
                    }
                }
            }
        }

        blocks.sort_by_key(|b| b.start);
        Ok(blocks)
    }

    async fn create_event_inner(
        &self,
        account_id: &str,
        calendar_id: &str,
        event: ExternalEvent,
    ) -> Result<ExternalEventRef, GcalError> {
        let token = self.tokens.access_token(account_id).await?;

        let mut body = json!({
            "summary": event.summary,
            "description": event.description,
            "start": { "dateTime": rfc3339(event.start), "timeZone": "UTC" },
            "end": { "dateTime": rfc3339(event.end), "timeZone": "UTC" },
            "attendees": [
                { "email": event.guest_email, "displayName": event.guest_name }
            ],
        });
        if event.request_meet_link {
            body["conferenceData"] = json!({
                "createRequest": { "requestId": Uuid::new_v4().to_string() }
            });
        }

        let response = self
            .http
            .post(format!(
                "{}/calendars/{}/events?conferenceDataVersion=1&sendUpdates=all",
                self.api_base, calendar_id
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let created: EventResource = response.json().await?;
        let meeting_url = created.hangout_link.or_else(|| {
            created.conference_data.and_then(|data| {
                data.entry_points.and_then(|points| {
                    points
                        .into_iter()
                        .find(|p| p.entry_point_type.as_deref() == Some("video"))
                        .and_then(|p| p.uri)
                })
            })
        });

        Ok(ExternalEventRef {
            event_id: created.id,
            meeting_url,
        })
    }

    async fn update_event_inner(
        &self,
        account_id: &str,
        calendar_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), GcalError> {
        let token = self.tokens.access_token(account_id).await?;

        let body = json!({
            "start": { "dateTime": rfc3339(start), "timeZone": "UTC" },
            "end": { "dateTime": rfc3339(end), "timeZone": "UTC" },
        });

        let response = self
            .http
            .patch(format!(
                "{}/calendars/{}/events/{}?sendUpdates=all",
                self.api_base, calendar_id, event_id
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    async fn delete_event_inner(
        &self,
        account_id: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), GcalError> {
        let token = self.tokens.access_token(account_id).await?;

        let response = self
            .http
            .delete(format!(
                "{}/calendars/{}/events/{}?sendUpdates=all",
                self.api_base, calendar_id, event_id
            ))
            .bearer_auth(&token)
            .send()
            .await?;

        // An event that is already gone counts as deleted.
        if response.status().as_u16() == 404 || response.status().as_u16() == 410 {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }
}

impl CalendarApi for GoogleCalendarClient {
    fn free_busy(
        &self,
        account_id: &str,
        calendar_ids: &[String],
        host_tz: Tz,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> BoxFuture<'_, Vec<BusyBlock>, BoxedError> {
        let account_id = account_id.to_string();
        let calendar_ids = calendar_ids.to_vec();
        Box::pin(async move {
            self.free_busy_inner(&account_id, &calendar_ids, host_tz, time_min, time_max)
                .await
                .map_err(BoxedError::new)
        })
    }

    fn create_event(
        &self,
        account_id: &str,
        calendar_id: &str,
        event: ExternalEvent,
    ) -> BoxFuture<'_, ExternalEventRef, BoxedError> {
        let account_id = account_id.to_string();
        let calendar_id = calendar_id.to_string();
        Box::pin(async move {
            self.create_event_inner(&account_id, &calendar_id, event)
                .await
                .map_err(BoxedError::new)
        })
    }

    fn update_event(
        &self,
        account_id: &str,
        calendar_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, (), BoxedError> {
        let account_id = account_id.to_string();
        let calendar_id = calendar_id.to_string();
        let event_id = event_id.to_string();
        Box::pin(async move {
            self.update_event_inner(&account_id, &calendar_id, &event_id, start, end)
                .await
                .map_err(BoxedError::new)
        })
    }

    fn delete_event(
        &self,
        account_id: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> BoxFuture<'_, (), BoxedError> {
        let account_id = account_id.to_string();
        let calendar_id = calendar_id.to_string();
        let event_id = event_id.to_string();
        Box::pin(async move {
            self.delete_event_inner(&account_id, &calendar_id, &event_id)
                .await
                .map_err(BoxedError::new)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timed_periods_parse_as_utc_instants() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let parsed = parse_busy_time("2024-01-15T15:00:00Z", tz).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap());
    }

    #[test]
    fn all_day_boundaries_resolve_to_host_local_midnight() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // Midnight Jan 15 in New York is 05:00 UTC.
        let parsed = parse_busy_time("2024-01-15", tz).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 5, 0, 0).unwrap());
    }

    #[test]
    fn garbage_timestamps_are_rejected() {
        let tz: Tz = "UTC".parse().unwrap();
        assert!(parse_busy_time("not-a-time", tz).is_err());
    }
}
