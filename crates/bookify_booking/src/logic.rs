// --- File: crates/bookify_booking/src/logic.rs ---
//! The booking commit path.
//!
//! `commit` serializes reservation of a slot: idempotency short-circuit,
//! validation, pre-commit availability check, then a transactional insert
//! whose partial unique index decides every race. External side effects run
//! after the commit and never gate it. Cancellation and reschedule are
//! fail-closed on their external mutation instead, so the host's calendar
//! cannot silently drift from the ledger.

use bookify_availability::AvailabilityEngine;
use bookify_common::services::{CalendarApi, ExternalEvent, MailMessage, Mailer};
use bookify_common::{
    invalid_input, not_found, unauthorized, upstream_unavailable, BookifyError, Clock,
};
use bookify_db::{
    AccountRepository, Booking, BookingRepository, BookingStatus, CalendarRecord,
    ConnectedAccount, DbError, EventType, EventTypeRepository,
};
use bookify_mailer::ical::{self, Invite, InviteMethod};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A commit request, already syntactically parsed by the HTTP layer.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub event_type_id: String,
    pub start_time: DateTime<Utc>,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub guest_company: Option<String>,
    pub guest_notes: Option<String>,
    pub guest_timezone: String,
    pub custom_responses: BTreeMap<String, String>,
    pub idempotency_key: Option<String>,
}

/// Outcome of a commit: the durable booking, and whether it was replayed
/// from a prior request with the same idempotency key.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub booking: Booking,
    pub replayed: bool,
}

/// Who is asking for a cancel/reschedule.
#[derive(Debug, Clone)]
pub enum Caller {
    /// Public surface: identity proven by matching the guest email.
    Guest { email: Option<String> },
    /// Admin surface, host-authenticated upstream.
    Host,
}

pub struct BookingService {
    engine: AvailabilityEngine,
    event_types: Arc<dyn EventTypeRepository>,
    bookings: Arc<dyn BookingRepository>,
    accounts: Arc<dyn AccountRepository>,
    calendar: Option<Arc<dyn CalendarApi>>,
    mailer: Option<Arc<dyn Mailer>>,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(
        engine: AvailabilityEngine,
        event_types: Arc<dyn EventTypeRepository>,
        bookings: Arc<dyn BookingRepository>,
        accounts: Arc<dyn AccountRepository>,
        calendar: Option<Arc<dyn CalendarApi>>,
        mailer: Option<Arc<dyn Mailer>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            event_types,
            bookings,
            accounts,
            calendar,
            mailer,
            clock,
        }
    }

    /// Commits a booking. Exactly one of two concurrent commits for the
    /// same slot returns Ok; the other observes the unique index and gets
    /// `SlotTaken`.
    pub async fn commit(&self, request: BookingRequest) -> Result<CommitOutcome, BookifyError> {
        let now = self.clock.now();

        // A server-derived key dedupes a naive client double-submit within
        // the same wall-clock millisecond without blocking real retries.
        let idempotency_key = request.idempotency_key.clone().unwrap_or_else(|| {
            format!(
                "{}:{}:{}:{}",
                request.event_type_id,
                request.start_time.timestamp_millis(),
                request.guest_email.to_lowercase(),
                now.timestamp_millis()
            )
        });

        // Idempotency hit: same key, same answer, no new row.
        if let Some(prior) = self
            .bookings
            .find_by_idempotency_key(&idempotency_key)
            .await?
        {
            info!("Idempotency replay for key {}", idempotency_key);
            return Ok(CommitOutcome {
                booking: prior,
                replayed: true,
            });
        }

        // Syntactic validation happens before anything touches the ledger.
        validate_request(&request)?;

        let (event_type, _host, host_tz) = self
            .engine
            .load_active_event_type(&request.event_type_id)
            .await?;

        validate_responses(&event_type, &request.custom_responses)?;

        // Pre-commit check against fresh busy and ledger data.
        if !self
            .engine
            .slot_is_open(&event_type, host_tz, request.start_time)
            .await?
        {
            return Err(BookifyError::SlotTaken);
        }

        let end_time = request.start_time + Duration::minutes(event_type.duration_minutes);

        let status = if event_type.requires_confirmation {
            BookingStatus::Pending
        } else {
            BookingStatus::Confirmed
        };

        let booking = Booking {
            id: None,
            uid: Uuid::new_v4().to_string(),
            host_id: event_type.host_id.clone(),
            event_type_id: event_type.id.clone(),
            start_time: request.start_time,
            end_time,
            guest_name: request.guest_name.clone(),
            guest_email: request.guest_email.clone(),
            guest_phone: request.guest_phone.clone(),
            guest_company: request.guest_company.clone(),
            guest_notes: request.guest_notes.clone(),
            guest_timezone: request.guest_timezone.clone(),
            custom_responses: request.custom_responses.clone(),
            idempotency_key: Some(idempotency_key.clone()),
            status,
            external_event_id: None,
            meeting_url: None,
            cancelled_at: None,
            cancel_reason: None,
            rescheduled_from_uid: None,
            created_at: now,
        };

        let mut booking = match self.bookings.insert(booking).await {
            Ok(inserted) => inserted,
            Err(DbError::Conflict(_)) => {
                // Either another commit won the slot, or a concurrent retry
                // with the same key won the key. The key case is a replay.
                if let Some(prior) = self
                    .bookings
                    .find_by_idempotency_key(&idempotency_key)
                    .await?
                {
                    return Ok(CommitOutcome {
                        booking: prior,
                        replayed: true,
                    });
                }
                return Err(BookifyError::SlotTaken);
            }
            Err(other) => return Err(other.into()),
        };

        // Post-commit side effects. Failures are recorded, never raised.
        let organizer = self.write_external_event(&mut booking, &event_type).await;
        self.send_booking_mail(&booking, &event_type, InviteMethod::Request, 0, organizer)
            .await;

        Ok(CommitOutcome {
            booking,
            replayed: false,
        })
    }

    /// Public booking lookup by uid.
    pub async fn get(&self, uid: &str) -> Result<Booking, BookifyError> {
        self.bookings
            .find_by_uid(uid)
            .await?
            .ok_or_else(|| not_found(format!("booking {}", uid)))
    }

    /// Cancels a booking. Fail-closed on the external event: when the
    /// provider cannot delete the host's calendar event the ledger stays
    /// untouched and the caller sees `UpstreamUnavailable`.
    pub async fn cancel(
        &self,
        uid: &str,
        caller: Caller,
        reason: Option<String>,
    ) -> Result<Booking, BookifyError> {
        let booking = self.get(uid).await?;

        if booking.status == BookingStatus::Cancelled {
            return Ok(booking);
        }

        authorize(&booking, &caller)?;

        let event_type = self
            .event_types
            .find_by_id(&booking.event_type_id)
            .await?;

        let mut organizer = None;
        if let Some(event_id) = &booking.external_event_id {
            match self.destination(&event_type).await {
                Some((account, calendar_record)) => {
                    if let Some(api) = &self.calendar {
                        api.delete_event(
                            &account.id,
                            &calendar_record.external_calendar_id,
                            event_id,
                        )
                        .await
                        .map_err(|e| {
                            warn!("External delete failed for booking {}: {}", uid, e);
                            upstream_unavailable("calendar event could not be removed")
                        })?;
                    }
                    organizer = Some((account.external_identity, booking.guest_name.clone()));
                }
                None => {
                    debug!("Booking {} has an external ref but no destination", uid);
                }
            }
        }

        let now = self.clock.now();
        let cancelled = self.bookings.cancel(uid, now, reason).await?;
        info!("Booking {} cancelled", uid);

        if let Some(event_type) = &event_type {
            self.send_booking_mail(&cancelled, event_type, InviteMethod::Cancel, 1, organizer)
                .await;
        }

        Ok(cancelled)
    }

    /// Moves a booking to a new start. The external event is updated first
    /// (fail-closed), then the row moves under the unique index; a losing
    /// race reverts the external update best-effort.
    pub async fn reschedule(
        &self,
        uid: &str,
        new_start: DateTime<Utc>,
        caller: Caller,
    ) -> Result<Booking, BookifyError> {
        let booking = self.get(uid).await?;
        if booking.status == BookingStatus::Cancelled {
            return Err(not_found(format!("booking {}", uid)));
        }

        authorize(&booking, &caller)?;

        let (event_type, _host, host_tz) = self
            .engine
            .load_active_event_type(&booking.event_type_id)
            .await?;
        let new_end = new_start + Duration::minutes(event_type.duration_minutes);

        if !self
            .engine
            .slot_is_open_excluding(&event_type, host_tz, new_start, Some(uid))
            .await?
        {
            return Err(BookifyError::SlotTaken);
        }

        // External first: if the provider refuses, nothing moved locally.
        let destination = self.destination(&Some(event_type.clone())).await;
        let mut organizer = None;
        if let (Some(event_id), Some((account, calendar_record)), Some(api)) = (
            &booking.external_event_id,
            destination.as_ref(),
            self.calendar.as_ref(),
        ) {
            api.update_event(
                &account.id,
                &calendar_record.external_calendar_id,
                event_id,
                new_start,
                new_end,
            )
            .await
            .map_err(|e| {
                warn!("External update failed for booking {}: {}", uid, e);
                upstream_unavailable("calendar event could not be moved")
            })?;
            organizer = Some((account.external_identity.clone(), booking.guest_name.clone()));
        }

        let new_uid = Uuid::new_v4().to_string();
        let moved = match self
            .bookings
            .reschedule(uid, &new_uid, new_start, new_end)
            .await
        {
            Ok(moved) => moved,
            Err(DbError::Conflict(_)) => {
                // Put the external event back where it was; the calendar is
                // eventually repaired even if this also fails.
                if let (Some(event_id), Some((account, calendar_record)), Some(api)) = (
                    &booking.external_event_id,
                    destination.as_ref(),
                    self.calendar.as_ref(),
                ) {
                    if let Err(e) = api
                        .update_event(
                            &account.id,
                            &calendar_record.external_calendar_id,
                            event_id,
                            booking.start_time,
                            booking.end_time,
                        )
                        .await
                    {
                        warn!("Failed to revert external event for {}: {}", uid, e);
                    }
                }
                return Err(BookifyError::SlotTaken);
            }
            Err(other) => return Err(other.into()),
        };

        info!("Booking {} rescheduled to {} as {}", uid, new_start, moved.uid);
        self.send_booking_mail(&moved, &event_type, InviteMethod::Request, 1, organizer)
            .await;

        Ok(moved)
    }

    /// Host-facing ledger listing.
    pub async fn list_for_host(
        &self,
        host_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        include_cancelled: bool,
    ) -> Result<Vec<Booking>, BookifyError> {
        Ok(self
            .bookings
            .list_for_host(host_id, from, to, include_cancelled)
            .await?)
    }

    async fn destination(
        &self,
        event_type: &Option<EventType>,
    ) -> Option<(ConnectedAccount, CalendarRecord)> {
        let destination_id = event_type
            .as_ref()
            .and_then(|et| et.destination_calendar_id.as_ref())?;
        match self.accounts.calendar_with_account(destination_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Failed to resolve destination calendar {}: {}", destination_id, e);
                None
            }
        }
    }

    /// Best-effort external event creation. Returns the organizer identity
    /// when the destination resolved, for the invite mail.
    async fn write_external_event(
        &self,
        booking: &mut Booking,
        event_type: &EventType,
    ) -> Option<(String, String)> {
        let api = self.calendar.as_ref()?;
        let (account, calendar_record) =
            self.destination(&Some(event_type.clone())).await?;

        if !calendar_record.writable {
            warn!(
                "Destination calendar {} is not writable; skipping event creation",
                calendar_record.id
            );
            return Some((account.external_identity, booking.guest_name.clone()));
        }

        let event = ExternalEvent {
            summary: format!("{} with {}", event_type.title, booking.guest_name),
            description: booking.guest_notes.clone(),
            start: booking.start_time,
            end: booking.end_time,
            guest_email: booking.guest_email.clone(),
            guest_name: booking.guest_name.clone(),
            request_meet_link: matches!(
                event_type.location_kind,
                bookify_db::LocationKind::Meet
            ),
        };

        match api
            .create_event(&account.id, &calendar_record.external_calendar_id, event)
            .await
        {
            Ok(event_ref) => {
                if let Err(e) = self
                    .bookings
                    .set_external_ref(&booking.uid, &event_ref.event_id, event_ref.meeting_url.clone())
                    .await
                {
                    warn!("Failed to record external ref for {}: {}", booking.uid, e);
                }
                booking.external_event_id = Some(event_ref.event_id);
                booking.meeting_url = event_ref.meeting_url;
            }
            Err(e) => {
                // The booking stands; the gap is visible through the missing
                // external ref and the log line.
                warn!(
                    "External event creation failed for booking {}: {}",
                    booking.uid, e
                );
            }
        }

        Some((account.external_identity, booking.guest_name.clone()))
    }

    async fn send_booking_mail(
        &self,
        booking: &Booking,
        event_type: &EventType,
        method: InviteMethod,
        sequence: u32,
        organizer: Option<(String, String)>,
    ) {
        let Some(mailer) = self.mailer.as_ref() else {
            return;
        };

        let verb = match method {
            InviteMethod::Request => "confirmed",
            InviteMethod::Cancel => "cancelled",
        };
        let invite = Invite {
            uid: booking.uid.clone(),
            summary: format!("{} with {}", event_type.title, booking.guest_name),
            description: booking.guest_notes.clone(),
            start: booking.start_time,
            end: booking.end_time,
            organizer_email: organizer.as_ref().map(|(email, _)| email.clone()),
            organizer_name: None,
            attendee_email: booking.guest_email.clone(),
            attendee_name: booking.guest_name.clone(),
            method,
            sequence,
        };
        let ics = ical::render(&invite, self.clock.now());

        let mut body = format!(
            "Your booking '{}' on {} has been {}.",
            event_type.title,
            booking.start_time.to_rfc3339(),
            verb
        );
        if let Some(url) = &booking.meeting_url {
            body.push_str(&format!("\n\nJoin: {}", url));
        }

        let message = MailMessage {
            to: booking.guest_email.clone(),
            subject: format!("{}: {}", verb, event_type.title),
            body,
            ics: Some(ics),
        };

        if let Err(e) = mailer.send(message).await {
            warn!("Mail dispatch failed for booking {}: {}", booking.uid, e);
        }
    }
}

fn validate_request(request: &BookingRequest) -> Result<(), BookifyError> {
    if request.guest_name.trim().is_empty() {
        return Err(invalid_input("guest name must not be empty"));
    }
    let email = request.guest_email.trim();
    if email.is_empty() || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(invalid_input("guest email is not valid"));
    }
    if request.guest_timezone.parse::<Tz>().is_err() {
        return Err(invalid_input("guest timezone is not a valid IANA zone"));
    }
    if let Some(key) = &request.idempotency_key {
        if key.trim().is_empty() {
            return Err(invalid_input("idempotency key must not be empty"));
        }
    }
    Ok(())
}

fn validate_responses(
    event_type: &EventType,
    responses: &BTreeMap<String, String>,
) -> Result<(), BookifyError> {
    for question in &event_type.questions {
        match responses.get(question.id()) {
            Some(answer) => {
                if !question.accepts(answer) {
                    return Err(invalid_input(format!(
                        "answer for '{}' is not acceptable",
                        question.id()
                    )));
                }
            }
            None => {
                if question.required() {
                    return Err(invalid_input(format!(
                        "question '{}' requires an answer",
                        question.id()
                    )));
                }
            }
        }
    }
    Ok(())
}

fn authorize(booking: &Booking, caller: &Caller) -> Result<(), BookifyError> {
    match caller {
        Caller::Host => Ok(()),
        Caller::Guest { email } => match email {
            Some(email) if email.trim().eq_ignore_ascii_case(booking.guest_email.trim()) => Ok(()),
            _ => Err(unauthorized(
                "caller is neither the host nor the identified guest",
            )),
        },
    }
}
