// --- File: crates/bookify_availability/src/routes.rs ---

use crate::handlers::{get_availability_handler, AvailabilityState};
use axum::{routing::get, Router};
use std::sync::Arc;

/// Creates a router containing the availability routes.
pub fn routes(state: Arc<AvailabilityState>) -> Router {
    Router::new()
        .route("/availability", get(get_availability_handler))
        .with_state(state)
}
