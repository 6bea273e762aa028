// --- File: crates/bookify_availability/src/handlers.rs ---
use crate::logic::{AvailabilityEngine, SlotsByDay};
use crate::tz;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    response::{Json, Response},
};
use bookify_common::{
    client_ip, error_response, invalid_input, rate_limited_response, Clock, EndpointClass,
    FixedWindowLimiter,
};
use chrono::{Duration, NaiveDate, SecondsFormat};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Shared state for the availability routes.
pub struct AvailabilityState {
    pub engine: AvailabilityEngine,
    pub limiter: Arc<FixedWindowLimiter>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    /// Event type to list slots for
    pub event_type_id: String,
    /// Start date in YYYY-MM-DD format, interpreted in the guest timezone
    pub start_date: String,
    /// End date in YYYY-MM-DD format, inclusive
    pub end_date: String,
    /// Guest IANA timezone used for grouping
    pub timezone: String,
}

#[derive(Serialize, Debug)]
pub struct SlotDto {
    pub start: String,
    pub end: String,
}

#[derive(Serialize, Debug)]
pub struct AvailabilityResponse {
    /// Local guest dates mapped to the bookable slots of that day,
    /// ascending by start. Slot instants are RFC3339 UTC.
    pub slots: BTreeMap<String, Vec<SlotDto>>,
    pub timezone: String,
}

fn to_response(days: SlotsByDay, timezone: String) -> AvailabilityResponse {
    let slots = days
        .into_iter()
        .map(|(date, day_slots)| {
            let dtos = day_slots
                .into_iter()
                .map(|slot| SlotDto {
                    start: slot.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                    end: slot.end.to_rfc3339_opts(SecondsFormat::Secs, true),
                })
                .collect();
            (date.format("%Y-%m-%d").to_string(), dtos)
        })
        .collect();
    AvailabilityResponse { slots, timezone }
}

/// Handler to list bookable slots for an event type.
#[axum::debug_handler]
pub async fn get_availability_handler(
    State(state): State<Arc<AvailabilityState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, Response> {
    let client = client_ip(&headers, peer);
    let decision = state
        .limiter
        .check(EndpointClass::Availability, &client, state.clock.now());
    if !decision.allowed {
        info!("Availability rate limit hit for {}", client);
        return Err(rate_limited_response(decision));
    }

    let guest_tz: Tz = query
        .timezone
        .parse()
        .map_err(|_| error_response(invalid_input("Invalid timezone")))?;

    let start_date = NaiveDate::parse_from_str(&query.start_date, "%Y-%m-%d").map_err(|_| {
        error_response(invalid_input("Invalid start_date format (YYYY-MM-DD)"))
    })?;
    let end_date = NaiveDate::parse_from_str(&query.end_date, "%Y-%m-%d")
        .map_err(|_| error_response(invalid_input("Invalid end_date format (YYYY-MM-DD)")))?;

    if end_date < start_date {
        return Err(error_response(invalid_input(
            "end_date must not be before start_date",
        )));
    }

    // The request window spans guest-local midnights. A midnight erased by
    // DST slides forward to the first existing wall time.
    let range_start = resolve_midnight(start_date, guest_tz)
        .ok_or_else(|| error_response(invalid_input("start_date has no midnight in timezone")))?;
    let end_exclusive = end_date + Duration::days(1);
    let range_end = resolve_midnight(end_exclusive, guest_tz)
        .ok_or_else(|| error_response(invalid_input("end_date has no midnight in timezone")))?;

    let days = state
        .engine
        .list_slots(&query.event_type_id, range_start, range_end, guest_tz)
        .await
        .map_err(error_response)?;

    Ok(Json(to_response(days, query.timezone)))
}

fn resolve_midnight(date: NaiveDate, zone: Tz) -> Option<chrono::DateTime<chrono::Utc>> {
    let mut candidate = date.and_hms_opt(0, 0, 0).unwrap();
    // Some zones skip midnight on DST days; probe forward by the hour.
    for _ in 0..3 {
        if let Some(instant) = tz::to_instant(candidate, zone) {
            return Some(instant);
        }
        candidate = candidate + Duration::hours(1);
    }
    None
}
