use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use transit_api::{app, webhooks::expected_signature, AppState};
use transit_catalog::{BoardingPoint, Vehicle};
use transit_core::notification::TracingNotifier;
use transit_core::repository::VehicleStore;
use transit_core::Principal;
use transit_store::app_config::{AuthConfig, BusinessRules};
use transit_store::MemoryStore;
use uuid::Uuid;

struct TestApp {
    router: Router,
    state: AppState,
    owner_id: Uuid,
    vehicle_id: Uuid,
    start: Uuid,
    end: Uuid,
}

fn auth_config(webhook_key: Option<&str>) -> AuthConfig {
    AuthConfig {
        jwt_secret: "test-secret".into(),
        jwt_expiration_seconds: 3_600,
        device_token_ttl_seconds: 600,
        proof_secret: "proof-secret".into(),
        payment_webhook_key: webhook_key.map(str::to_owned),
    }
}

async fn setup(webhook_key: Option<&str>) -> TestApp {
    let store = MemoryStore::new();
    let owner_id = Uuid::new_v4();
    let mut vehicle = Vehicle::new(owner_id, "NB-4411", "Southern Express").approved();
    vehicle.lease.machine_enabled = true;
    store.create_vehicle(&vehicle).await.unwrap();

    let start = BoardingPoint::new("Galle", 6.0535, 80.2210);
    let end = BoardingPoint::new("Matara", 5.9549, 80.5550);
    let (start_id, end_id) = (start.id, end.id);
    store.add_boarding_point(start).await;
    store.add_boarding_point(end).await;

    let state = AppState::new(
        store.stores(),
        Arc::new(TracingNotifier),
        &auth_config(webhook_key),
        BusinessRules::default(),
    )
    .unwrap();

    TestApp {
        router: app(state.clone()),
        state,
        owner_id,
        vehicle_id: vehicle.id,
        start: start_id,
        end: end_id,
    }
}

impl TestApp {
    fn token(&self, principal: Principal) -> String {
        self.state.tokens.issue(&principal).unwrap()
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn schedule_trip(&self, seats: i32) -> Uuid {
        let owner = self.token(Principal::Owner(self.owner_id));
        let (status, trip) = self
            .send(
                "POST",
                "/v1/trips",
                Some(&owner),
                Some(json!({
                    "vehicle_id": self.vehicle_id,
                    "route_id": Uuid::new_v4(),
                    "route_name": "Galle - Matara",
                    "departure": "2099-01-15T08:30:00+05:30",
                    "number_of_seats": seats,
                    "booking_price": 1000
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(trip["seats"].as_array().unwrap().len(), seats as usize);
        trip["id"].as_str().unwrap().parse().unwrap()
    }

    fn booking_body(&self, trip_id: Uuid, seat: i32, txn: &str) -> Value {
        json!({
            "trip_id": trip_id,
            "seat_number": seat,
            "start_point_id": self.start,
            "end_point_id": self.end,
            "fee": 1000,
            "transaction_reference": txn
        })
    }

    fn confirmed_event(txn: &str, customer: &str) -> Value {
        json!({
            "eventType": "NOTIFY_TRANSACTION_CHANGE",
            "state": "CONFIRMED",
            "transactionId": txn,
            "customerId": customer
        })
    }
}

#[tokio::test]
async fn test_booking_paid_through_webhook() {
    let t = setup(None).await;
    let trip_id = t.schedule_trip(2).await;
    let passenger = Uuid::new_v4();
    let token = t.token(Principal::Passenger(passenger));

    let (status, booking) = t
        .send("POST", "/v1/bookings", Some(&token), Some(t.booking_body(trip_id, 1, "txn-1")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "Pending");
    assert_eq!(booking["fare"]["total_price"], 1070);
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let (status, ack) = t
        .send("POST", "/v1/webhooks/payments", None, Some(TestApp::confirmed_event("txn-1", "cus-1")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "booked");

    // Provider retry
    let (status, ack) = t
        .send("POST", "/v1/webhooks/payments", None, Some(TestApp::confirmed_event("txn-1", "cus-1")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "already_processed");

    let (status, fetched) = t
        .send("GET", &format!("/v1/bookings/{}", booking_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["status"], "Booked");

    let (_, history) = t.send("GET", "/v1/bookings", Some(&token), None).await;
    assert_eq!(history["upcoming"].as_array().unwrap().len(), 1);

    let (_, trip) = t.send("GET", &format!("/v1/trips/{}", trip_id), None, None).await;
    assert_eq!(trip["booked_seats"], 1);
    assert_eq!(trip["booked_revenue"], 1000);

    let (status, availability) = t
        .send(
            "POST",
            &format!("/v1/trips/{}/availability", trip_id),
            None,
            Some(json!({ "seat_numbers": [1, 2] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability[0]["available"], false);
    assert_eq!(availability[1]["available"], true);
}

#[tokio::test]
async fn test_payment_for_closed_booking_is_not_acknowledged() {
    let t = setup(None).await;
    let trip_id = t.schedule_trip(2).await;
    let token = t.token(Principal::Passenger(Uuid::new_v4()));

    let (_, booking) = t
        .send("POST", "/v1/bookings", Some(&token), Some(t.booking_body(trip_id, 1, "txn-late")))
        .await;
    let booking_id = booking["id"].as_str().unwrap().to_string();
    let (status, _) = t
        .send("POST", &format!("/v1/bookings/{}/cancel", booking_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t
        .send("POST", "/v1/webhooks/payments", None, Some(TestApp::confirmed_event("txn-late", "cus-1")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PAYMENT_NOT_APPLIED");

    let (_, trip) = t.send("GET", &format!("/v1/trips/{}", trip_id), None, None).await;
    assert_eq!(trip["booked_seats"], 0);
}

#[tokio::test]
async fn test_taken_seat_is_a_counted_conflict() {
    let t = setup(None).await;
    let trip_id = t.schedule_trip(2).await;
    let first = t.token(Principal::Passenger(Uuid::new_v4()));
    let second = t.token(Principal::Passenger(Uuid::new_v4()));

    t.send("POST", "/v1/bookings", Some(&first), Some(t.booking_body(trip_id, 2, "txn-a")))
        .await;
    t.send("POST", "/v1/webhooks/payments", None, Some(TestApp::confirmed_event("txn-a", "cus-a")))
        .await;

    let (status, body) = t
        .send("POST", "/v1/bookings", Some(&second), Some(t.booking_body(trip_id, 2, "txn-b")))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SEAT_UNAVAILABLE");
    assert_eq!(t.state.metrics.booking_conflicts(), 1);

    let response = t
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let text = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(text.contains("path=\"/v1/bookings\""));
    assert!(text.contains("status=\"409\""));
}

#[tokio::test]
async fn test_auth_and_validation_errors() {
    let t = setup(None).await;
    let trip_id = t.schedule_trip(1).await;
    let passenger = t.token(Principal::Passenger(Uuid::new_v4()));

    let (status, body) = t
        .send("POST", "/v1/bookings", None, Some(t.booking_body(trip_id, 1, "txn-1")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = t
        .send("POST", "/v1/bookings", Some("not-a-jwt"), Some(t.booking_body(trip_id, 1, "txn-1")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t
        .send(
            "POST",
            "/v1/trips",
            Some(&passenger),
            Some(json!({
                "vehicle_id": t.vehicle_id,
                "route_id": Uuid::new_v4(),
                "route_name": "x",
                "departure": "2099-01-15T08:30:00+05:30",
                "number_of_seats": 4,
                "booking_price": 100
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let mut extra = t.booking_body(trip_id, 1, "txn-1");
    extra["discount"] = json!(100);
    let (status, body) = t.send("POST", "/v1/bookings", Some(&passenger), Some(extra)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    let (status, body) = t
        .send("POST", "/v1/bookings", Some(&passenger), Some(t.booking_body(trip_id, 9, "txn-9")))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = t.send("GET", "/v1/trips/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_device_lifecycle_over_http() {
    let t = setup(None).await;
    let trip_id = t.schedule_trip(2).await;
    let owner = t.token(Principal::Owner(t.owner_id));
    let passenger_id = Uuid::new_v4();
    let passenger = t.token(Principal::Passenger(passenger_id));

    let (_, booking) = t
        .send("POST", "/v1/bookings", Some(&passenger), Some(t.booking_body(trip_id, 1, "txn-1")))
        .await;
    t.send("POST", "/v1/webhooks/payments", None, Some(TestApp::confirmed_event("txn-1", "cus-1")))
        .await;

    let login = json!({ "vehicle_id": t.vehicle_id });
    let (status, session) = t.send("POST", "/v1/devices/login", None, Some(login.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let device = session["access_token"].as_str().unwrap().to_string();

    // One terminal at a time.
    let (status, _) = t.send("POST", "/v1/devices/login", None, Some(login.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, tickets) = t
        .send(
            "POST",
            "/v1/tickets",
            Some(&device),
            Some(json!({
                "trip_id": trip_id,
                "tickets": [{ "start_point_id": t.start, "end_point_id": t.end, "ticket_price": 300 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tickets[0]["start_point"], "Galle");

    let proof = booking["proof_of_purchase"].as_str().unwrap();
    let (status, verified) = t
        .send(
            "POST",
            &format!("/v1/bookings/{}/verify", booking["id"].as_str().unwrap()),
            Some(&device),
            Some(json!({ "proof": proof })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["status"], "Verified");

    let (status, listing) = t
        .send("GET", &format!("/v1/trips/{}/tickets", trip_id), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["tickets_revenue"], 300);

    let (status, report) = t
        .send("POST", &format!("/v1/trips/{}/close", trip_id), Some(&device), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["completed"], 1);

    // After a force revoke the old device token is dead.
    let (status, _) = t
        .send("POST", &format!("/v1/vehicles/{}/machine/revoke", t.vehicle_id), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t
        .send("POST", &format!("/v1/trips/{}/close", trip_id), Some(&device), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .send("POST", &format!("/v1/vehicles/{}/machine/enable", t.vehicle_id), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.send("POST", "/v1/devices/login", None, Some(login)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_signature_is_enforced_when_configured() {
    let t = setup(Some("provider-key")).await;
    let trip_id = t.schedule_trip(1).await;
    let passenger = t.token(Principal::Passenger(Uuid::new_v4()));
    t.send("POST", "/v1/bookings", Some(&passenger), Some(t.booking_body(trip_id, 1, "txn-1")))
        .await;

    let (status, _) = t
        .send("POST", "/v1/webhooks/payments", None, Some(TestApp::confirmed_event("txn-1", "cus-1")))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let signature = expected_signature("nonce-1", "1700000000", "provider-key");
    let request = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-signature-nonce", "nonce-1")
        .header("x-signature-timestamp", "1700000000")
        .header("x-signature", signature)
        .body(Body::from(TestApp::confirmed_event("txn-1", "cus-1").to_string()))
        .unwrap();
    let response = t.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_other_provider_events_are_ignored() {
    let t = setup(None).await;
    let (status, ack) = t
        .send(
            "POST",
            "/v1/webhooks/payments",
            None,
            Some(json!({ "eventType": "NOTIFY_TOKENISATION_STATUS", "tokenisationStatus": "TOKENISATION_SUCCESS" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "ignored");
}
