use std::sync::Arc;

use atoll_api::{app, middleware::auth::Claims, state::{AppState, AuthConfig}};
use atoll_booking::{PaymentPolicy, PaymentProcessor, ReservationLifecycle, ReviewEngine};
use atoll_catalog::TravelPackage;
use atoll_store::MemoryStore;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const TEST_SECRET: &str = "integration-test-secret";

fn test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let reservations = Arc::new(ReservationLifecycle::new(store.clone(), store.clone()));
    let payments = Arc::new(PaymentProcessor::new(
        store.clone(),
        store.clone(),
        PaymentPolicy::default(),
    ));
    let reviews = Arc::new(ReviewEngine::new(store.clone(), store.clone(), store.clone()));

    let state = AppState {
        reservations,
        payments,
        reviews,
        auth: AuthConfig { secret: TEST_SECRET.to_owned(), expiration: 3600 },
    };
    (app(state), store)
}

fn token_for(user_id: Uuid, role: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_owned(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET.as_bytes()))
        .expect("token encoding")
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("request dispatch");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

/// A package whose trip ended yesterday, so reviews are fair game.
fn past_package(price_cents: i64) -> TravelPackage {
    TravelPackage::new(
        "Beach week",
        "Florianópolis",
        price_cents,
        Utc::now() - Duration::days(8),
        Utc::now() - Duration::days(1),
    )
}

fn future_package(price_cents: i64) -> TravelPackage {
    TravelPackage::new(
        "Mountain trek",
        "Chapada Diamantina",
        price_cents,
        Utc::now() + Duration::days(20),
        Utc::now() + Duration::days(27),
    )
}

async fn book(
    app: &Router,
    token: &str,
    package_id: Uuid,
    travelers: Value,
) -> (StatusCode, Value) {
    send(
        app,
        request(
            Method::POST,
            "/v1/reservations",
            Some(token),
            Some(json!({ "package_id": package_id, "travelers": travelers })),
        ),
    )
    .await
}

#[tokio::test]
async fn end_to_end_booking_payment_review_flow() {
    let (app, store) = test_app();
    let package = past_package(100_000); // R$1000.00
    store.seed_package(package.clone());

    let client_id = Uuid::new_v4();
    let client = token_for(client_id, "CLIENT");
    let admin = token_for(Uuid::new_v4(), "ADMIN");

    // Booking with two travelers charges three shares.
    let travelers = json!([
        { "name": "Friend One", "document": "A1" },
        { "name": "Friend Two", "document": "A2" }
    ]);
    let (status, reservation) = book(&app, &client, package.id, travelers).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["total_cents"], json!(300_000));
    assert_eq!(reservation["status"], json!("PENDING"));
    let reservation_id = reservation["id"].as_str().unwrap().to_owned();

    // Admin confirms.
    let (status, _) = send(
        &app,
        request(
            Method::PUT,
            &format!("/v1/reservations/{reservation_id}/status"),
            Some(&admin),
            Some(json!({ "status": "CONFIRMED" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // PIX payment for the full total settles immediately.
    let (status, payment) = send(
        &app,
        request(
            Method::POST,
            "/v1/payments",
            Some(&client),
            Some(json!({
                "reservation_id": reservation_id,
                "method": "PIX",
                "amount_cents": 300_000,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["status"], json!("APPROVED"));

    // The trip ended yesterday, so the client may review.
    let (status, review) = send(
        &app,
        request(
            Method::POST,
            "/v1/reviews",
            Some(&client),
            Some(json!({ "package_id": package.id, "rating": 5, "comment": "great trip" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(review["status"], json!("PENDING"));
    let review_id = review["id"].as_str().unwrap().to_owned();

    // Visible to the admin in the pending queue.
    let (status, pending) = send(
        &app,
        request(Method::GET, "/v1/reviews/pending", Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    // Approval publishes it.
    let (status, _) = send(
        &app,
        request(
            Method::PUT,
            &format!("/v1/reviews/{review_id}"),
            Some(&admin),
            Some(json!({ "action": "approve" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Exactly once in the public per-package listing, no auth required.
    let (status, public) = send(
        &app,
        request(Method::GET, &format!("/v1/packages/{}/reviews", package.id), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let public = public.as_array().unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0]["id"], json!(review_id));
}

#[tokio::test]
async fn creating_a_reservation_requires_authentication() {
    let (app, store) = test_app();
    let package = future_package(50_000);
    store.seed_package(package.clone());

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/v1/reservations",
            None,
            Some(json!({ "package_id": package.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn booking_an_unknown_package_is_not_found() {
    let (app, _store) = test_app();
    let client = token_for(Uuid::new_v4(), "CLIENT");

    let (status, body) = book(&app, &client, Uuid::new_v4(), json!([])).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("travel package not found"));
}

#[tokio::test]
async fn the_token_mint_issues_usable_credentials() {
    let (app, store) = test_app();
    let package = future_package(75_000);
    store.seed_package(package.clone());

    let (status, minted) = send(
        &app,
        request(Method::POST, "/v1/auth/token", None, Some(json!({ "role": "CLIENT" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = minted["token"].as_str().unwrap().to_owned();

    let (status, reservation) = book(&app, &token, package.id, json!([])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["user_id"], minted["user_id"]);
}

#[tokio::test]
async fn listing_every_reservation_is_admin_only() {
    let (app, store) = test_app();
    let package = future_package(60_000);
    store.seed_package(package.clone());

    let client = token_for(Uuid::new_v4(), "CLIENT");
    book(&app, &client, package.id, json!([])).await;

    let (status, _) = send(&app, request(Method::GET, "/v1/reservations", Some(&client), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token_for(Uuid::new_v4(), "ADMIN");
    let (status, listing) = send(&app, request(Method::GET, "/v1/reservations", Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn my_reservations_only_show_the_callers_rows() {
    let (app, store) = test_app();
    let package = future_package(60_000);
    store.seed_package(package.clone());

    let user_a = Uuid::new_v4();
    let token_a = token_for(user_a, "CLIENT");
    let token_b = token_for(Uuid::new_v4(), "CLIENT");
    book(&app, &token_a, package.id, json!([])).await;
    book(&app, &token_b, package.id, json!([])).await;

    let (status, mine) =
        send(&app, request(Method::GET, "/v1/reservations/mine", Some(&token_a), None)).await;
    assert_eq!(status, StatusCode::OK);
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["user_id"], json!(user_a));
}

#[tokio::test]
async fn a_reservation_is_hidden_from_other_clients() {
    let (app, store) = test_app();
    let package = future_package(60_000);
    store.seed_package(package.clone());

    let owner = token_for(Uuid::new_v4(), "CLIENT");
    let (_, reservation) = book(&app, &owner, package.id, json!([])).await;
    let uri = format!("/v1/reservations/{}", reservation["id"].as_str().unwrap());

    let (status, _) = send(&app, request(Method::GET, &uri, Some(&owner), None)).await;
    assert_eq!(status, StatusCode::OK);

    let intruder = token_for(Uuid::new_v4(), "CLIENT");
    let (status, _) = send(&app, request(Method::GET, &uri, Some(&intruder), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token_for(Uuid::new_v4(), "ADMIN");
    let (status, _) = send(&app, request(Method::GET, &uri, Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn status_updates_are_admin_only_and_follow_the_table() {
    let (app, store) = test_app();
    let package = future_package(60_000);
    store.seed_package(package.clone());

    let client = token_for(Uuid::new_v4(), "CLIENT");
    let (_, reservation) = book(&app, &client, package.id, json!([])).await;
    let uri = format!("/v1/reservations/{}/status", reservation["id"].as_str().unwrap());

    let (status, _) = send(
        &app,
        request(Method::PUT, &uri, Some(&client), Some(json!({ "status": "CONFIRMED" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token_for(Uuid::new_v4(), "ADMIN");

    // PENDING cannot jump straight to COMPLETED.
    let (status, body) = send(
        &app,
        request(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "COMPLETED" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("invalid status transition from PENDING to COMPLETED"));

    // Unknown status strings are a validation failure, not a 500.
    let (status, _) = send(
        &app,
        request(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "SHIPPED" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn paying_twice_for_a_reservation_is_rejected() {
    let (app, store) = test_app();
    let package = future_package(80_000);
    store.seed_package(package.clone());

    let client = token_for(Uuid::new_v4(), "CLIENT");
    let (_, reservation) = book(&app, &client, package.id, json!([])).await;
    let payment_body = json!({
        "reservation_id": reservation["id"],
        "method": "PIX",
        "amount_cents": 80_000,
    });

    let (status, _) = send(
        &app,
        request(Method::POST, "/v1/payments", Some(&client), Some(payment_body.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        request(Method::POST, "/v1/payments", Some(&client), Some(payment_body)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("reservation already has an approved payment"));
}

#[tokio::test]
async fn payment_preconditions_are_validated() {
    let (app, store) = test_app();
    let package = future_package(80_000);
    store.seed_package(package.clone());

    let owner = token_for(Uuid::new_v4(), "CLIENT");
    let (_, reservation) = book(&app, &owner, package.id, json!([])).await;

    // Wrong owner.
    let intruder = token_for(Uuid::new_v4(), "CLIENT");
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/v1/payments",
            Some(&intruder),
            Some(json!({
                "reservation_id": reservation["id"],
                "method": "DEBIT",
                "amount_cents": 80_000,
                "card_number": "5555666677778888",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("reservation does not belong to you"));

    // Wrong amount.
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/v1/payments",
            Some(&owner),
            Some(json!({
                "reservation_id": reservation["id"],
                "method": "PIX",
                "amount_cents": 79_999,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("payment amount does not match the reservation total"));

    // Unknown reservation.
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/v1/payments",
            Some(&owner),
            Some(json!({
                "reservation_id": Uuid::new_v4(),
                "method": "PIX",
                "amount_cents": 80_000,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn boleto_settles_through_an_admin() {
    let (app, store) = test_app();
    let package = future_package(90_000);
    store.seed_package(package.clone());

    let client = token_for(Uuid::new_v4(), "CLIENT");
    let (_, reservation) = book(&app, &client, package.id, json!([])).await;

    let (status, payment) = send(
        &app,
        request(
            Method::POST,
            "/v1/payments",
            Some(&client),
            Some(json!({
                "reservation_id": reservation["id"],
                "method": "BOLETO",
                "amount_cents": 90_000,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["status"], json!("PENDING"));
    let status_uri = format!("/v1/payments/{}/status", payment["id"].as_str().unwrap());

    // Even the payer cannot read the raw status.
    let (status, _) = send(&app, request(Method::GET, &status_uri, Some(&client), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token_for(Uuid::new_v4(), "ADMIN");
    let (status, body) = send(&app, request(Method::GET, &status_uri, Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("PENDING"));

    let (status, updated) = send(
        &app,
        request(Method::PUT, &status_uri, Some(&admin), Some(json!({ "status": "APPROVED" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], json!("APPROVED"));
}

#[tokio::test]
async fn review_submission_rules_hold_over_http() {
    let (app, store) = test_app();
    let ended = past_package(40_000);
    let upcoming = future_package(40_000);
    store.seed_package(ended.clone());
    store.seed_package(upcoming.clone());

    let client_id = Uuid::new_v4();
    let client = token_for(client_id, "CLIENT");
    let admin = token_for(Uuid::new_v4(), "ADMIN");

    for package_id in [ended.id, upcoming.id] {
        let (_, reservation) = book(&app, &client, package_id, json!([])).await;
        let uri = format!("/v1/reservations/{}/status", reservation["id"].as_str().unwrap());
        send(&app, request(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "CONFIRMED" }))))
            .await;
    }

    // Out-of-range ratings.
    for rating in [0, 6] {
        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/v1/reviews",
                Some(&client),
                Some(json!({ "package_id": ended.id, "rating": rating })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("rating must be between 1 and 5"));
    }

    // The upcoming trip has not ended.
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/v1/reviews",
            Some(&client),
            Some(json!({ "package_id": upcoming.id, "rating": 4 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        json!("reservation must be confirmed or completed and the travel must have ended")
    );

    // First review lands, the second is a duplicate.
    let review_body = json!({ "package_id": ended.id, "rating": 5 });
    let (status, _) = send(
        &app,
        request(Method::POST, "/v1/reviews", Some(&client), Some(review_body.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        request(Method::POST, "/v1/reviews", Some(&client), Some(review_body)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("you have already reviewed this package"));
}

#[tokio::test]
async fn rejecting_a_review_removes_it_everywhere() {
    let (app, store) = test_app();
    let package = past_package(40_000);
    store.seed_package(package.clone());

    let client = token_for(Uuid::new_v4(), "CLIENT");
    let admin = token_for(Uuid::new_v4(), "ADMIN");

    let (_, reservation) = book(&app, &client, package.id, json!([])).await;
    let uri = format!("/v1/reservations/{}/status", reservation["id"].as_str().unwrap());
    send(&app, request(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "CONFIRMED" }))))
        .await;

    let (_, review) = send(
        &app,
        request(
            Method::POST,
            "/v1/reviews",
            Some(&client),
            Some(json!({ "package_id": package.id, "rating": 1, "comment": "never again" })),
        ),
    )
    .await;
    let review_id = review["id"].as_str().unwrap().to_owned();

    let (status, body) = send(
        &app,
        request(
            Method::PUT,
            &format!("/v1/reviews/{review_id}"),
            Some(&admin),
            Some(json!({ "action": "reject" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("review rejected and removed"));

    let (_, pending) =
        send(&app, request(Method::GET, "/v1/reviews/pending", Some(&admin), None)).await;
    assert!(pending.as_array().unwrap().is_empty());

    let (_, public) = send(
        &app,
        request(Method::GET, &format!("/v1/packages/{}/reviews", package.id), None, None),
    )
    .await;
    assert!(public.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn pending_listing_is_admin_only_and_approved_listing_is_public() {
    let (app, store) = test_app();
    let package = past_package(40_000);
    store.seed_package(package.clone());

    let client = token_for(Uuid::new_v4(), "CLIENT");
    let (status, _) = send(&app, request(Method::GET, "/v1/reviews/pending", Some(&client), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Approved listing works with no token at all, with a destination filter.
    let (status, body) = send(
        &app,
        request(Method::GET, "/v1/reviews/approved?destination=flori", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn my_reviews_include_every_status_with_package_annotations() {
    let (app, store) = test_app();
    let package = past_package(40_000);
    store.seed_package(package.clone());

    let client = token_for(Uuid::new_v4(), "CLIENT");
    let admin = token_for(Uuid::new_v4(), "ADMIN");

    let (_, reservation) = book(&app, &client, package.id, json!([])).await;
    let uri = format!("/v1/reservations/{}/status", reservation["id"].as_str().unwrap());
    send(&app, request(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "CONFIRMED" }))))
        .await;

    send(
        &app,
        request(
            Method::POST,
            "/v1/reviews",
            Some(&client),
            Some(json!({ "package_id": package.id, "rating": 4 })),
        ),
    )
    .await;

    let (status, mine) = send(&app, request(Method::GET, "/v1/reviews/mine", Some(&client), None)).await;
    assert_eq!(status, StatusCode::OK);
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["status"], json!("PENDING"));
    assert_eq!(mine[0]["package"]["destination"], json!("Florianópolis"));
}
