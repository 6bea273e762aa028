// --- File: crates/bookify_booking/src/routes.rs ---

use crate::handlers::{
    admin_cancel_handler, cancel_booking_handler, create_booking_handler, get_booking_handler,
    list_bookings_handler, reschedule_booking_handler, BookingState,
};
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

/// Creates a router containing all booking routes.
pub fn routes(state: Arc<BookingState>) -> Router {
    Router::new()
        .route("/bookings", post(create_booking_handler))
        .route(
            "/bookings/{uid}",
            get(get_booking_handler)
                .delete(cancel_booking_handler)
                .patch(reschedule_booking_handler),
        )
        .route("/admin/bookings", get(list_bookings_handler))
        .route("/admin/bookings/{uid}", delete(admin_cancel_handler))
        .with_state(state)
}
