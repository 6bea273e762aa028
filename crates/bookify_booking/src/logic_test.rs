#[cfg(test)]
mod tests {
    use crate::logic::{BookingRequest, BookingService, Caller};
    use bookify_availability::AvailabilityEngine;
    use bookify_common::services::{
        BoxFuture, BoxedError, BusyFetch, BusySource, CalendarApi, ExternalEvent,
        ExternalEventRef, MailMessage, Mailer,
    };
    use bookify_common::{BookifyError, FixedClock};
    use bookify_db::{
        AccountRepository, BookingRepository, BookingStatus, CalendarRecord, ConnectedAccount,
        EventType, EventTypeRepository, Host, InMemoryAccountRepository,
        InMemoryBookingRepository, InMemoryEventTypeRepository, LocationKind, Question,
        WorkingHours,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use chrono_tz::Tz;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    struct EmptyBusySource;

    impl BusySource for EmptyBusySource {
        fn busy_blocks(
            &self,
            _host_id: &str,
            _participating: &[String],
            _host_tz: Tz,
            _time_min: DateTime<Utc>,
            _time_max: DateTime<Utc>,
        ) -> BoxFuture<'_, BusyFetch, BoxedError> {
            Box::pin(async { Ok(BusyFetch::default()) })
        }
    }

    /// Calendar API stub that records calls and can be told to fail.
    #[derive(Default)]
    struct RecordingCalendarApi {
        fail_create: AtomicBool,
        fail_update: AtomicBool,
        fail_delete: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingCalendarApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CalendarApi for RecordingCalendarApi {
        fn free_busy(
            &self,
            _account_id: &str,
            _calendar_ids: &[String],
            _host_tz: Tz,
            _time_min: DateTime<Utc>,
            _time_max: DateTime<Utc>,
        ) -> BoxFuture<'_, Vec<bookify_common::BusyBlock>, BoxedError> {
            Box::pin(async { Ok(vec![]) })
        }

        fn create_event(
            &self,
            _account_id: &str,
            calendar_id: &str,
            _event: ExternalEvent,
        ) -> BoxFuture<'_, ExternalEventRef, BoxedError> {
            self.calls.lock().unwrap().push(format!("create:{}", calendar_id));
            let fail = self.fail_create.load(Ordering::SeqCst);
            Box::pin(async move {
                if fail {
                    Err(BoxedError::msg("provider down"))
                } else {
                    Ok(ExternalEventRef {
                        event_id: "ext-evt-1".to_string(),
                        meeting_url: Some("https://meet.example.com/abc".to_string()),
                    })
                }
            })
        }

        fn update_event(
            &self,
            _account_id: &str,
            _calendar_id: &str,
            event_id: &str,
            start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> BoxFuture<'_, (), BoxedError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("update:{}:{}", event_id, start));
            let fail = self.fail_update.load(Ordering::SeqCst);
            Box::pin(async move {
                if fail {
                    Err(BoxedError::msg("provider down"))
                } else {
                    Ok(())
                }
            })
        }

        fn delete_event(
            &self,
            _account_id: &str,
            _calendar_id: &str,
            event_id: &str,
        ) -> BoxFuture<'_, (), BoxedError> {
            self.calls.lock().unwrap().push(format!("delete:{}", event_id));
            let fail = self.fail_delete.load(Ordering::SeqCst);
            Box::pin(async move {
                if fail {
                    Err(BoxedError::msg("provider down"))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<MailMessage>>,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, message: MailMessage) -> BoxFuture<'_, (), BoxedError> {
            self.sent.lock().unwrap().push(message);
            Box::pin(async { Ok(()) })
        }
    }

    struct TestContext {
        service: BookingService,
        bookings: Arc<InMemoryBookingRepository>,
        calendar: Arc<RecordingCalendarApi>,
        mailer: Arc<RecordingMailer>,
        clock: Arc<FixedClock>,
    }

    fn base_event_type() -> EventType {
        EventType {
            id: "et-1".to_string(),
            host_id: "host-1".to_string(),
            slug: "intro-call".to_string(),
            title: "Intro call".to_string(),
            description: None,
            duration_minutes: 30,
            buffer_before_minutes: 0,
            buffer_after_minutes: 0,
            minimum_notice_minutes: 0,
            scheduling_window_days: 60,
            slot_interval_minutes: 15,
            working_hours: (1..=5)
                .map(|day| WorkingHours {
                    day_of_week: day,
                    start: "09:00".to_string(),
                    end: "17:00".to_string(),
                })
                .collect(),
            questions: vec![],
            participating_calendars: vec![],
            destination_calendar_id: Some("cal-1".to_string()),
            location_kind: LocationKind::Meet,
            requires_confirmation: false,
            active: true,
        }
    }

    async fn context_with(et: EventType) -> TestContext {
        let event_types = Arc::new(InMemoryEventTypeRepository::new());
        event_types
            .upsert_host(Host {
                id: "host-1".to_string(),
                display_timezone: "UTC".to_string(),
            })
            .await
            .unwrap();
        event_types.insert(et).await.unwrap();

        let accounts = Arc::new(InMemoryAccountRepository::new());
        accounts
            .upsert_account(ConnectedAccount {
                id: "acct-1".to_string(),
                host_id: "host-1".to_string(),
                external_identity: "host@example.com".to_string(),
                access_token_enc: None,
                refresh_token_enc: None,
                token_expires_at: None,
                scopes: None,
                is_valid: true,
                last_sync_at: None,
            })
            .await
            .unwrap();
        accounts
            .upsert_calendar(CalendarRecord {
                id: "cal-1".to_string(),
                account_id: "acct-1".to_string(),
                external_calendar_id: "primary".to_string(),
                writable: true,
                selected_for_busy: true,
                destination_eligible: true,
            })
            .await
            .unwrap();

        let bookings = Arc::new(InMemoryBookingRepository::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap(),
        ));
        let engine = AvailabilityEngine::new(
            event_types.clone(),
            bookings.clone(),
            Arc::new(EmptyBusySource),
            clock.clone(),
        );
        let calendar = Arc::new(RecordingCalendarApi::default());
        let mailer = Arc::new(RecordingMailer::default());
        let calendar_dyn: Arc<dyn CalendarApi> = calendar.clone();
        let mailer_dyn: Arc<dyn Mailer> = mailer.clone();
        let service = BookingService::new(
            engine,
            event_types,
            bookings.clone(),
            accounts,
            Some(calendar_dyn),
            Some(mailer_dyn),
            clock.clone(),
        );

        TestContext {
            service,
            bookings,
            calendar,
            mailer,
            clock,
        }
    }

    async fn context() -> TestContext {
        context_with(base_event_type()).await
    }

    fn monday_10() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn request(start: DateTime<Utc>, key: Option<&str>) -> BookingRequest {
        BookingRequest {
            event_type_id: "et-1".to_string(),
            start_time: start,
            guest_name: "Ada Lovelace".to_string(),
            guest_email: "ada@example.com".to_string(),
            guest_phone: None,
            guest_company: None,
            guest_notes: Some("Looking forward".to_string()),
            guest_timezone: "Europe/London".to_string(),
            custom_responses: BTreeMap::new(),
            idempotency_key: key.map(|k| k.to_string()),
        }
    }

    #[tokio::test]
    async fn commit_creates_confirmed_booking_with_external_event() {
        let ctx = context().await;
        let outcome = ctx.service.commit(request(monday_10(), None)).await.unwrap();

        assert!(!outcome.replayed);
        let booking = &outcome.booking;
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.end_time, monday_10() + Duration::minutes(30));
        assert_eq!(booking.external_event_id.as_deref(), Some("ext-evt-1"));
        assert_eq!(
            booking.meeting_url.as_deref(),
            Some("https://meet.example.com/abc")
        );
        assert_eq!(ctx.calendar.calls(), vec!["create:primary".to_string()]);

        // Confirmation mail with the booking uid inside the ics payload
        let sent = ctx.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0]
            .ics
            .as_ref()
            .unwrap()
            .contains(&format!("UID:{}", booking.uid)));
    }

    #[tokio::test]
    async fn identical_idempotency_keys_return_one_booking() {
        let ctx = context().await;

        let first = ctx
            .service
            .commit(request(monday_10(), Some("retry-key")))
            .await
            .unwrap();
        let second = ctx
            .service
            .commit(request(monday_10(), Some("retry-key")))
            .await
            .unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.booking.uid, second.booking.uid);
        assert_eq!(ctx.bookings.all().len(), 1);
    }

    #[tokio::test]
    async fn same_millisecond_retry_without_key_is_deduplicated() {
        // The clock is frozen, so both requests derive the same key.
        let ctx = context().await;

        let first = ctx.service.commit(request(monday_10(), None)).await.unwrap();
        let second = ctx.service.commit(request(monday_10(), None)).await.unwrap();

        assert!(second.replayed);
        assert_eq!(first.booking.uid, second.booking.uid);
        assert_eq!(ctx.bookings.all().len(), 1);
    }

    #[tokio::test]
    async fn later_retry_without_key_sees_slot_taken() {
        let ctx = context().await;
        ctx.service.commit(request(monday_10(), None)).await.unwrap();

        // A millisecond later the derived key differs and the slot is gone.
        ctx.clock.advance(Duration::milliseconds(5));
        let err = ctx
            .service
            .commit(request(monday_10(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, BookifyError::SlotTaken));
    }

    #[tokio::test]
    async fn concurrent_commits_for_one_slot_admit_exactly_one() {
        let ctx = context().await;

        let (a, b) = tokio::join!(
            ctx.service.commit(request(monday_10(), Some("key-a"))),
            ctx.service.commit(request(monday_10(), Some("key-b"))),
        );

        let outcomes = [a, b];
        let won = outcomes.iter().filter(|r| r.is_ok()).count();
        let lost = outcomes
            .iter()
            .filter(|r| matches!(r, Err(BookifyError::SlotTaken)))
            .count();
        assert_eq!(won, 1, "exactly one commit must win");
        assert_eq!(lost, 1, "the other must observe SlotTaken");
        assert_eq!(ctx.bookings.all().len(), 1);
    }

    #[tokio::test]
    async fn cancel_then_rebook_succeeds() {
        let ctx = context().await;
        let first = ctx.service.commit(request(monday_10(), None)).await.unwrap();

        ctx.service
            .cancel(
                &first.booking.uid,
                Caller::Guest {
                    email: Some("ada@example.com".to_string()),
                },
                Some("schedule change".to_string()),
            )
            .await
            .unwrap();

        // The freed slot is immediately committable again.
        ctx.clock.advance(Duration::milliseconds(1));
        let second = ctx.service.commit(request(monday_10(), None)).await.unwrap();
        assert!(!second.replayed);
        assert_ne!(first.booking.uid, second.booking.uid);
    }

    #[tokio::test]
    async fn cancel_requires_matching_guest_email() {
        let ctx = context().await;
        let outcome = ctx.service.commit(request(monday_10(), None)).await.unwrap();

        let err = ctx
            .service
            .cancel(
                &outcome.booking.uid,
                Caller::Guest {
                    email: Some("mallory@example.com".to_string()),
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookifyError::Unauthorized(_)));

        // Email match is case-insensitive
        ctx.service
            .cancel(
                &outcome.booking.uid,
                Caller::Guest {
                    email: Some("ADA@example.com".to_string()),
                },
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_is_fail_closed_on_external_delete() {
        let ctx = context().await;
        let outcome = ctx.service.commit(request(monday_10(), None)).await.unwrap();

        ctx.calendar.fail_delete.store(true, Ordering::SeqCst);
        let err = ctx
            .service
            .cancel(&outcome.booking.uid, Caller::Host, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookifyError::UpstreamUnavailable(_)));

        // The ledger did not move; the slot is still held.
        let stored = ctx
            .bookings
            .find_by_uid(&outcome.booking.uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn external_event_failure_leaves_booking_confirmed() {
        let ctx = context().await;
        ctx.calendar.fail_create.store(true, Ordering::SeqCst);

        let outcome = ctx.service.commit(request(monday_10(), None)).await.unwrap();
        let booking = &outcome.booking;

        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert!(booking.external_event_id.is_none());
        assert!(booking.meeting_url.is_none());

        // The failure channel: the stored row shows no external event.
        let stored = ctx.bookings.find_by_uid(&booking.uid).await.unwrap().unwrap();
        assert!(stored.external_event_id.is_none());
    }

    #[tokio::test]
    async fn reschedule_moves_booking_and_updates_external_event() {
        let ctx = context().await;
        let outcome = ctx.service.commit(request(monday_10(), None)).await.unwrap();

        let new_start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let moved = ctx
            .service
            .reschedule(
                &outcome.booking.uid,
                new_start,
                Caller::Guest {
                    email: Some("ada@example.com".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(moved.start_time, new_start);
        assert_eq!(
            moved.rescheduled_from_uid.as_deref(),
            Some(outcome.booking.uid.as_str())
        );
        assert_ne!(moved.uid, outcome.booking.uid);
        assert!(ctx
            .calendar
            .calls()
            .iter()
            .any(|c| c.starts_with("update:ext-evt-1")));
    }

    #[tokio::test]
    async fn reschedule_into_taken_slot_is_rejected() {
        let ctx = context().await;
        let first = ctx.service.commit(request(monday_10(), None)).await.unwrap();
        ctx.clock.advance(Duration::milliseconds(1));
        let other_start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        ctx.service
            .commit(request(other_start, Some("other")))
            .await
            .unwrap();

        let err = ctx
            .service
            .reschedule(
                &first.booking.uid,
                other_start,
                Caller::Guest {
                    email: Some("ada@example.com".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookifyError::SlotTaken));

        // The original booking is untouched.
        let stored = ctx
            .bookings
            .find_by_uid(&first.booking.uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.start_time, monday_10());
    }

    #[tokio::test]
    async fn reschedule_within_own_slot_window_is_allowed() {
        // Moving by one interval overlaps the booking's own old time; the
        // check must not trip over the row being moved.
        let ctx = context().await;
        let outcome = ctx.service.commit(request(monday_10(), None)).await.unwrap();

        let new_start = monday_10() + Duration::minutes(15);
        let moved = ctx
            .service
            .reschedule(
                &outcome.booking.uid,
                new_start,
                Caller::Guest {
                    email: Some("ada@example.com".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.start_time, new_start);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_row_exists() {
        let ctx = context().await;

        let mut bad_email = request(monday_10(), None);
        bad_email.guest_email = "not-an-email".to_string();
        let err = ctx.service.commit(bad_email).await.unwrap_err();
        assert!(matches!(err, BookifyError::InvalidInput(_)));

        let mut bad_tz = request(monday_10(), None);
        bad_tz.guest_timezone = "Mars/Olympus".to_string();
        let err = ctx.service.commit(bad_tz).await.unwrap_err();
        assert!(matches!(err, BookifyError::InvalidInput(_)));

        assert!(ctx.bookings.all().is_empty());
        assert!(ctx.calendar.calls().is_empty());
    }

    #[tokio::test]
    async fn required_question_must_be_answered() {
        let mut et = base_event_type();
        et.questions = vec![Question::Select {
            id: "topic".to_string(),
            label: "Topic".to_string(),
            required: true,
            options: vec!["sales".to_string(), "support".to_string()],
        }];
        let ctx = context_with(et).await;

        let err = ctx
            .service
            .commit(request(monday_10(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, BookifyError::InvalidInput(_)));

        let mut answered = request(monday_10(), None);
        answered
            .custom_responses
            .insert("topic".to_string(), "sales".to_string());
        ctx.service.commit(answered).await.unwrap();

        // An answer outside the options is rejected too
        ctx.clock.advance(Duration::milliseconds(1));
        let mut off_menu = request(monday_10() + Duration::hours(1), None);
        off_menu
            .custom_responses
            .insert("topic".to_string(), "gossip".to_string());
        let err = ctx.service.commit(off_menu).await.unwrap_err();
        assert!(matches!(err, BookifyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn confirmation_required_types_commit_as_pending() {
        let mut et = base_event_type();
        et.requires_confirmation = true;
        let ctx = context_with(et).await;

        let outcome = ctx.service.commit(request(monday_10(), None)).await.unwrap();
        assert_eq!(outcome.booking.status, BookingStatus::Pending);

        // A PENDING booking still blocks the slot for the next guest.
        ctx.clock.advance(Duration::milliseconds(1));
        let mut rival = request(monday_10(), None);
        rival.guest_email = "rival@example.com".to_string();
        let err = ctx.service.commit(rival).await.unwrap_err();
        assert!(matches!(err, BookifyError::SlotTaken));
    }

    #[tokio::test]
    async fn unknown_event_type_is_not_found() {
        let ctx = context().await;
        let mut req = request(monday_10(), None);
        req.event_type_id = "missing".to_string();
        let err = ctx.service.commit(req).await.unwrap_err();
        assert!(matches!(err, BookifyError::NotFound(_)));
    }
}
