//! End-to-end tests over the merged HTTP surface.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;


async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn availability_request() -> Request<Body> {
    Request::builder()
        .uri("/availability?eventTypeId=et-1&startDate=2024-01-15&endDate=2024-01-15&timezone=UTC")
        .method("GET")
        .body(Body::empty())
        .unwrap()
}

fn booking_request(start: &str, idempotency_key: Option<&str>, client: &str) -> Request<Body> {
    let mut body = json!({
        "eventTypeId": "et-1",
        "startTime": start,
        "timezone": "UTC",
        "guest": { "name": "Ada Lovelace", "email": "ada@example.com" },
    });
    if let Some(key) = idempotency_key {
        body["idempotencyKey"] = json!(key);
    }
    Request::builder()
        .uri("/bookings")
        .method("POST")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn availability_lists_slots_grouped_by_day() {
    let app = fixtures::build_app().await;

    let response = app.router.oneshot(availability_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["timezone"], "UTC");
    let day = body["slots"]["2024-01-15"].as_array().expect("day present");
    assert!(!day.is_empty());
    // New York working hours start 09:00 EST = 14:00 UTC
    assert_eq!(day[0]["start"], "2024-01-15T14:00:00Z");
}

#[tokio::test]
async fn availability_rejects_bad_dates_and_unknown_event_types() {
    let app = fixtures::build_app().await;

    let bad_date = Request::builder()
        .uri("/availability?eventTypeId=et-1&startDate=01-15-2024&endDate=2024-01-15&timezone=UTC")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(bad_date).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unknown = Request::builder()
        .uri("/availability?eventTypeId=nope&startDate=2024-01-15&endDate=2024-01-15&timezone=UTC")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(unknown).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn booking_flow_commit_view_cancel_rebook() {
    let app = fixtures::build_app().await;

    // Commit: 14:30 UTC is 09:30 in New York, inside working hours
    let response = app
        .router
        .clone()
        .oneshot(booking_request("2024-01-15T14:30:00Z", None, "198.51.100.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let uid = body["booking"]["uid"].as_str().unwrap().to_string();
    assert_eq!(body["booking"]["startTime"], "2024-01-15T14:30:00Z");
    assert_eq!(body["booking"]["endTime"], "2024-01-15T15:00:00Z");

    // Public view is reachable and stripped
    let view = Request::builder()
        .uri(format!("/bookings/{}", uid))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(view).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["guestName"], "Ada Lovelace");
    assert!(body.get("guestEmail").is_none());

    // The booked slot vanishes from availability
    let response = app
        .router
        .clone()
        .oneshot(availability_request())
        .await
        .unwrap();
    let body = body_json(response).await;
    let day = body["slots"]["2024-01-15"].as_array().unwrap();
    assert!(day
        .iter()
        .all(|slot| slot["start"] != "2024-01-15T14:30:00Z"));

    // Cancelling with the wrong email is a 401
    let wrong = Request::builder()
        .uri(format!("/bookings/{}", uid))
        .method("DELETE")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.7")
        .body(Body::from(
            json!({ "email": "mallory@example.com" }).to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The identified guest can cancel
    let cancel = Request::builder()
        .uri(format!("/bookings/{}", uid))
        .method("DELETE")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.7")
        .body(Body::from(
            json!({ "email": "ada@example.com", "reason": "conflict" }).to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(cancel).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    // The slot is bookable again right away
    app.clock.advance(Duration::milliseconds(1));
    let response = app
        .router
        .clone()
        .oneshot(booking_request("2024-01-15T14:30:00Z", None, "198.51.100.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn second_commit_for_a_slot_conflicts() {
    let app = fixtures::build_app().await;

    let response = app
        .router
        .clone()
        .oneshot(booking_request("2024-01-15T15:00:00Z", Some("key-a"), "198.51.100.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .router
        .clone()
        .oneshot(booking_request("2024-01-15T15:00:00Z", Some("key-b"), "198.51.100.8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    assert_eq!(app.bookings.all().len(), 1);
}

#[tokio::test]
async fn idempotent_replay_returns_200_with_same_uid() {
    let app = fixtures::build_app().await;

    let response = app
        .router
        .clone()
        .oneshot(booking_request("2024-01-15T15:00:00Z", Some("retry"), "198.51.100.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let first_uid = body_json(response).await["booking"]["uid"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .router
        .clone()
        .oneshot(booking_request("2024-01-15T15:00:00Z", Some("retry"), "198.51.100.7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second_uid = body_json(response).await["booking"]["uid"]
        .as_str()
        .unwrap()
        .to_string();

    assert_eq!(first_uid, second_uid);
    assert_eq!(app.bookings.all().len(), 1);
}

#[tokio::test]
async fn reschedule_moves_or_conflicts() {
    let app = fixtures::build_app().await;

    let response = app
        .router
        .clone()
        .oneshot(booking_request("2024-01-15T15:00:00Z", None, "198.51.100.7"))
        .await
        .unwrap();
    let uid = body_json(response).await["booking"]["uid"]
        .as_str()
        .unwrap()
        .to_string();

    // Another guest takes 16:00
    app.clock.advance(Duration::milliseconds(1));
    let response = app
        .router
        .clone()
        .oneshot(booking_request("2024-01-15T16:00:00Z", Some("other"), "198.51.100.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Moving onto the taken slot is a 409
    let patch = Request::builder()
        .uri(format!("/bookings/{}", uid))
        .method("PATCH")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.7")
        .body(Body::from(
            json!({ "newStartTime": "2024-01-15T16:00:00Z", "email": "ada@example.com" })
                .to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(patch).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Moving to a free slot succeeds and issues a fresh uid
    let patch = Request::builder()
        .uri(format!("/bookings/{}", uid))
        .method("PATCH")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.7")
        .body(Body::from(
            json!({ "newStartTime": "2024-01-15T17:00:00Z", "email": "ada@example.com" })
                .to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(patch).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["booking"]["startTime"], "2024-01-15T17:00:00Z");
    assert_ne!(body["booking"]["uid"].as_str().unwrap(), uid);
}

#[tokio::test]
async fn booking_rate_limit_returns_429_with_reset_header() {
    let app = fixtures::build_app().await;

    // The booking class allows 10 requests per window per client.
    for i in 0..10 {
        let start = format!("2024-01-1{}T15:00:00Z", 5 + (i % 3));
        let response = app
            .router
            .clone()
            .oneshot(booking_request(&start, Some(&format!("k-{}", i)), "203.0.113.5"))
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    let response = app
        .router
        .clone()
        .oneshot(booking_request(
            "2024-01-15T15:00:00Z",
            Some("k-last"),
            "203.0.113.5",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    // A different client is unaffected
    let response = app
        .router
        .clone()
        .oneshot(booking_request(
            "2024-01-16T15:00:00Z",
            Some("k-other"),
            "203.0.113.99",
        ))
        .await
        .unwrap();
    assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn admin_listing_shows_ledger_with_cancellations() {
    let app = fixtures::build_app().await;

    let response = app
        .router
        .clone()
        .oneshot(booking_request("2024-01-15T15:00:00Z", None, "198.51.100.7"))
        .await
        .unwrap();
    let uid = body_json(response).await["booking"]["uid"]
        .as_str()
        .unwrap()
        .to_string();

    // Host-side cancel needs no email
    let cancel = Request::builder()
        .uri(format!("/admin/bookings/{}", uid))
        .method("DELETE")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(cancel).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Hidden by default, visible with includeCancelled
    let listing = Request::builder()
        .uri("/admin/bookings?hostId=host-1&startDate=2024-01-15&endDate=2024-01-15")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(listing).await.unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);

    let listing = Request::builder()
        .uri("/admin/bookings?hostId=host-1&startDate=2024-01-15&endDate=2024-01-15&includeCancelled=true")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(listing).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["status"], "CANCELLED");
}
