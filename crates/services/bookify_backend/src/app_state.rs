// File: crates/services/bookify_backend/src/app_state.rs
//! Builds every service from configuration: repositories over the shared
//! pool, the busy provider (or its null stand-in), the mailer, the engine
//! and the commit path.

use bookify_availability::handlers::AvailabilityState;
use bookify_availability::AvailabilityEngine;
use bookify_booking::handlers::BookingState;
use bookify_booking::BookingService;
use bookify_common::services::{BusySource, CalendarApi, Mailer, NullBusySource};
use bookify_common::{Clock, FixedWindowLimiter, SystemClock, HTTP_CLIENT};
use bookify_config::AppConfig;
use bookify_db::{
    AccountRepository, BookingRepository, DbClient, EventTypeRepository, SqlAccountRepository,
    SqlBookingRepository, SqlEventTypeRepository,
};
use bookify_gcal::{GoogleBusyProvider, GoogleCalendarClient, TokenManager};
use bookify_mailer::HttpMailer;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbClient,
    pub availability_state: Arc<AvailabilityState>,
    pub booking_state: Arc<BookingState>,
}

impl AppState {
    pub async fn new(config: Arc<AppConfig>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let db = DbClient::new(&config).await?;

        let event_types: Arc<dyn EventTypeRepository> =
            Arc::new(SqlEventTypeRepository::new(db.clone()));
        let bookings: Arc<dyn BookingRepository> = Arc::new(SqlBookingRepository::new(db.clone()));
        let accounts: Arc<dyn AccountRepository> = Arc::new(SqlAccountRepository::new(db.clone()));

        event_types.init_schema().await?;
        bookings.init_schema().await?;
        accounts.init_schema().await?;
        info!("✅ Ledger schema ready.");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let limiter = Arc::new(FixedWindowLimiter::new());

        let mailer: Option<Arc<dyn Mailer>> = match (config.use_mailer, config.mailer.as_ref()) {
            (true, Some(mailer_config)) => {
                info!("🔌 Mailer enabled.");
                Some(Arc::new(HttpMailer::new(
                    mailer_config.clone(),
                    HTTP_CLIENT.clone(),
                )))
            }
            (true, None) => {
                warn!("use_mailer is set but the mailer config section is missing.");
                None
            }
            _ => None,
        };

        let (busy, calendar_api): (Arc<dyn BusySource>, Option<Arc<dyn CalendarApi>>) =
            match (config.use_gcal, config.google.as_ref()) {
                (true, Some(google)) => {
                    // The token manager mails the host when a refresh
                    // failure disconnects an account.
                    let tokens = Arc::new(TokenManager::new(
                        accounts.clone(),
                        google.clone(),
                        HTTP_CLIENT.clone(),
                        clock.clone(),
                        mailer.clone(),
                    ));
                    let client: Arc<dyn CalendarApi> = Arc::new(GoogleCalendarClient::new(
                        tokens,
                        google.api_base().to_string(),
                        HTTP_CLIENT.clone(),
                    ));
                    let provider = Arc::new(GoogleBusyProvider::new(
                        accounts.clone(),
                        client.clone(),
                        Duration::from_secs(google.busy_fetch_timeout_secs()),
                    ));
                    info!("🔌 Google Calendar busy provider enabled.");
                    (provider as Arc<dyn BusySource>, Some(client))
                }
                (true, None) => {
                    warn!("use_gcal is set but the google config section is missing.");
                    (Arc::new(NullBusySource), None)
                }
                _ => (Arc::new(NullBusySource), None),
            };

        let engine = AvailabilityEngine::new(
            event_types.clone(),
            bookings.clone(),
            busy,
            clock.clone(),
        );
        let service = BookingService::new(
            engine.clone(),
            event_types,
            bookings,
            accounts,
            calendar_api,
            mailer,
            clock.clone(),
        );

        let availability_state = Arc::new(AvailabilityState {
            engine,
            limiter: limiter.clone(),
            clock: clock.clone(),
        });
        let booking_state = Arc::new(BookingState {
            service,
            limiter,
            clock,
        });

        Ok(Self {
            config,
            db,
            availability_state,
            booking_state,
        })
    }
}
