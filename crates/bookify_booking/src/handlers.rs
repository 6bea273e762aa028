// --- File: crates/bookify_booking/src/handlers.rs ---
use crate::logic::{BookingRequest, BookingService, Caller};
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Json, Response},
};
use bookify_common::{
    client_ip, error_response, invalid_input, rate_limited_response, Clock, EndpointClass,
    FixedWindowLimiter,
};
use bookify_db::{Booking, BookingStatus};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Shared state for the booking routes.
pub struct BookingState {
    pub service: BookingService,
    pub limiter: Arc<FixedWindowLimiter>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Deserialize, Debug)]
pub struct GuestBody {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingBody {
    pub event_type_id: String,
    /// RFC3339 start instant
    pub start_time: String,
    /// Guest IANA timezone
    pub timezone: String,
    pub guest: GuestBody,
    #[serde(default)]
    pub custom_responses: BTreeMap<String, String>,
    pub idempotency_key: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CancelBody {
    pub email: Option<String>,
    pub reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleBody {
    /// RFC3339 start instant of the new slot
    pub new_start_time: String,
    pub timezone: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminBookingsQuery {
    pub host_id: String,
    pub start_date: String,
    pub end_date: String,
    pub include_cancelled: Option<bool>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BookingDto {
    pub uid: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_url: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct BookingResponse {
    pub booking: BookingDto,
}

/// The guest-facing view: host-private fields are stripped.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicBookingDto {
    pub uid: String,
    pub event_type_id: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub guest_name: String,
    pub guest_timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_url: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminBookingDto {
    pub uid: String,
    pub event_type_id: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub guest_name: String,
    pub guest_email: String,
    pub external_event_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct CancellationResponse {
    pub success: bool,
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn status_str(status: BookingStatus) -> String {
    status.as_str().to_string()
}

fn booking_dto(booking: &Booking) -> BookingDto {
    BookingDto {
        uid: booking.uid.clone(),
        start_time: rfc3339(booking.start_time),
        end_time: rfc3339(booking.end_time),
        status: status_str(booking.status),
        meeting_url: booking.meeting_url.clone(),
    }
}

fn check_rate(
    state: &BookingState,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<(), Response> {
    let client = client_ip(headers, peer);
    let decision = state
        .limiter
        .check(EndpointClass::Booking, &client, state.clock.now());
    if !decision.allowed {
        info!("Booking rate limit hit for {}", client);
        return Err(rate_limited_response(decision));
    }
    Ok(())
}

fn parse_instant(raw: &str, field: &str) -> Result<DateTime<Utc>, Response> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| error_response(invalid_input(format!("Invalid {} format", field))))
}

/// Handler to commit a booking. Replays of a prior idempotency key return
/// 200 with the stored booking; fresh commits return 201.
#[axum::debug_handler]
pub async fn create_booking_handler(
    State(state): State<Arc<BookingState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingBody>,
) -> Result<(StatusCode, Json<BookingResponse>), Response> {
    check_rate(&state, &headers, peer)?;

    let start_time = parse_instant(&body.start_time, "startTime")?;

    let request = BookingRequest {
        event_type_id: body.event_type_id,
        start_time,
        guest_name: body.guest.name,
        guest_email: body.guest.email,
        guest_phone: body.guest.phone,
        guest_company: body.guest.company,
        guest_notes: body.guest.notes,
        guest_timezone: body.timezone,
        custom_responses: body.custom_responses,
        idempotency_key: body.idempotency_key,
    };

    let outcome = state.service.commit(request).await.map_err(error_response)?;

    let code = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        code,
        Json(BookingResponse {
            booking: booking_dto(&outcome.booking),
        }),
    ))
}

/// Handler for the public booking view.
#[axum::debug_handler]
pub async fn get_booking_handler(
    State(state): State<Arc<BookingState>>,
    Path(uid): Path<String>,
) -> Result<Json<PublicBookingDto>, Response> {
    let booking = state.service.get(&uid).await.map_err(error_response)?;

    Ok(Json(PublicBookingDto {
        uid: booking.uid.clone(),
        event_type_id: booking.event_type_id.clone(),
        start_time: rfc3339(booking.start_time),
        end_time: rfc3339(booking.end_time),
        status: status_str(booking.status),
        guest_name: booking.guest_name.clone(),
        guest_timezone: booking.guest_timezone.clone(),
        meeting_url: booking.meeting_url.clone(),
    }))
}

/// Handler for guest-initiated cancellation. The guest proves identity by
/// matching the booking's email.
#[axum::debug_handler]
pub async fn cancel_booking_handler(
    State(state): State<Arc<BookingState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(uid): Path<String>,
    body: Option<Json<CancelBody>>,
) -> Result<Json<CancellationResponse>, Response> {
    check_rate(&state, &headers, peer)?;

    let body = body.map(|Json(b)| b).unwrap_or_default();
    state
        .service
        .cancel(&uid, Caller::Guest { email: body.email }, body.reason)
        .await
        .map_err(error_response)?;

    Ok(Json(CancellationResponse { success: true }))
}

/// Handler for guest-initiated reschedule; 409 when the new slot is gone.
#[axum::debug_handler]
pub async fn reschedule_booking_handler(
    State(state): State<Arc<BookingState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(uid): Path<String>,
    Json(body): Json<RescheduleBody>,
) -> Result<Json<BookingResponse>, Response> {
    check_rate(&state, &headers, peer)?;

    let new_start = parse_instant(&body.new_start_time, "newStartTime")?;

    let moved = state
        .service
        .reschedule(&uid, new_start, Caller::Guest { email: body.email })
        .await
        .map_err(error_response)?;

    Ok(Json(BookingResponse {
        booking: booking_dto(&moved),
    }))
}

/// Handler for the host's ledger view.
#[axum::debug_handler]
pub async fn list_bookings_handler(
    State(state): State<Arc<BookingState>>,
    Query(query): Query<AdminBookingsQuery>,
) -> Result<Json<Vec<AdminBookingDto>>, Response> {
    let start_date = NaiveDate::parse_from_str(&query.start_date, "%Y-%m-%d").map_err(|_| {
        error_response(invalid_input("Invalid startDate format (YYYY-MM-DD)"))
    })?;
    let end_date = NaiveDate::parse_from_str(&query.end_date, "%Y-%m-%d")
        .map_err(|_| error_response(invalid_input("Invalid endDate format (YYYY-MM-DD)")))?;

    if end_date < start_date {
        return Err(error_response(invalid_input(
            "endDate must not be before startDate",
        )));
    }

    let from = start_date.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let to = (end_date + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();

    let bookings = state
        .service
        .list_for_host(
            &query.host_id,
            from,
            to,
            query.include_cancelled.unwrap_or(false),
        )
        .await
        .map_err(error_response)?;

    let dtos = bookings
        .iter()
        .map(|b| AdminBookingDto {
            uid: b.uid.clone(),
            event_type_id: b.event_type_id.clone(),
            start_time: rfc3339(b.start_time),
            end_time: rfc3339(b.end_time),
            status: status_str(b.status),
            guest_name: b.guest_name.clone(),
            guest_email: b.guest_email.clone(),
            external_event_created: b.external_event_id.is_some(),
            cancel_reason: b.cancel_reason.clone(),
        })
        .collect();

    Ok(Json(dtos))
}

/// Handler for host-side cancellation without a guest email.
#[axum::debug_handler]
pub async fn admin_cancel_handler(
    State(state): State<Arc<BookingState>>,
    Path(uid): Path<String>,
    body: Option<Json<CancelBody>>,
) -> Result<Json<CancellationResponse>, Response> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    state
        .service
        .cancel(&uid, Caller::Host, body.reason)
        .await
        .map_err(error_response)?;

    Ok(Json(CancellationResponse { success: true }))
}
