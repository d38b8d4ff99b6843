//! Page-level behaviour through the full router, over in-memory
//! repositories and mock providers.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{NaiveDate, TimeZone, Utc};
use gigbook::aggregates::booking::DepositSettings;
use gigbook::notifications::Links;
use gigbook::providers::mocks::{MemoryStorage, MockPaymentGateway, RecordingMailer};
use gigbook::providers::storage::MAX_AVATAR_BYTES;
use gigbook::providers::webhook::{sign, SIGNATURE_HEADER};
use gigbook::repositories::{BookingRepository, MemoryDatabase, ProfileRepository};
use gigbook::server::{build_router, AppState, Services, Settings};
use gigbook::types::{BookingRequest, BookingStatus, Profile};
use gigbook_auth::mocks::MockAuthProvider;
use gigbook_auth::CookieConfig;
use gigbook_core::environment::Clock;
use gigbook_postgres::Actor;
use gigbook_testing::test_clock;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "whsec_test";

struct TestApp {
    db: MemoryDatabase,
    mailer: RecordingMailer,
    payments: MockPaymentGateway,
    storage: MemoryStorage,
    auth: MockAuthProvider,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        Self::with_auth(MockAuthProvider::new())
    }

    fn with_auth(auth: MockAuthProvider) -> Self {
        let db = MemoryDatabase::new();
        let mailer = RecordingMailer::new();
        let payments = MockPaymentGateway::new();
        let storage = MemoryStorage::new();
        let services = Services {
            profiles: Arc::new(db.clone()),
            bookings: Arc::new(db.clone()),
            waitlist: Arc::new(db.clone()),
            payments: Arc::new(payments.clone()),
            mailer: Arc::new(mailer.clone()),
            storage: Arc::new(storage.clone()),
            auth: Arc::new(auth.clone()),
            clock: Arc::new(test_clock()),
        };
        let settings = Settings {
            links: Links::new("https://gigbook.test"),
            cookies: CookieConfig::new(false),
            deposit: DepositSettings {
                amount_cents: 10_000,
                currency: "usd".to_string(),
            },
            webhook_secret: WEBHOOK_SECRET.to_string(),
            webhook_tolerance: 300,
        };
        Self {
            db,
            mailer,
            payments,
            storage,
            auth,
            state: AppState::new(services, settings, None),
        }
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router().oneshot(request).await.unwrap()
    }

    /// A DJ account with a profile; returns the account's session cookie.
    async fn dj(&self, email: &str, slug: &str, published: bool) -> (Profile, String) {
        let user_id = self.auth.add_user(email, "password123");
        let now = test_clock().now();
        let profile = Profile {
            id: Uuid::new_v4(),
            user_id,
            slug: slug.to_string(),
            display_name: format!("DJ {slug}"),
            city: "Lisbon".to_string(),
            genres: vec!["House".to_string()],
            bio: String::new(),
            rate_from_cents: Some(25_000),
            contact_email: email.to_string(),
            avatar_url: None,
            published,
            created_at: now,
            updated_at: now,
        };
        self.db.save(&Actor::Service, &profile).await.unwrap();
        let session = self.auth.session_for(email);
        (profile, format!("gb-access-token={}", session.access_token))
    }

    async fn booking(&self, profile: &Profile, status: BookingStatus) -> BookingRequest {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let booking = BookingRequest {
            id: Uuid::new_v4(),
            profile_id: profile.id,
            client_name: "Ada".to_string(),
            client_email: "ada@example.com".to_string(),
            event_date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            event_type: "Wedding".to_string(),
            venue: "Harbour Hall".to_string(),
            guest_count: Some(120),
            message: "First dance at nine".to_string(),
            status,
            client_token: "client-secret".to_string(),
            deposit_cents: (status == BookingStatus::Accepted).then_some(10_000),
            deposit_paid: false,
            deposit_paid_at: None,
            checkout_session_id: None,
            payment_intent_id: None,
            decline_reason: None,
            created_at: at,
            updated_at: at,
        };
        self.db.insert(&Actor::Anonymous, &booking).await.unwrap();
        booking
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, fields: &[(&str, &str)], cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
        .unwrap()
}

fn multipart(uri: &str, content_type: &str, bytes: &[u8], cookie: &str) -> Request<Body> {
    const BOUNDARY: &str = "gigbook-upload";
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .unwrap()
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

fn location(response: &Response) -> String {
    response.headers()[header::LOCATION].to_str().unwrap().to_string()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Directory
// ============================================================================

#[tokio::test]
async fn directory_lists_only_published_profiles() {
    let app = TestApp::new();
    app.dj("nova@example.com", "nova", true).await;
    app.dj("shade@example.com", "shade", false).await;

    let response = app.send(get("/", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("DJ nova"));
    assert!(!html.contains("DJ shade"));
}

#[tokio::test]
async fn draft_profile_is_visible_to_its_owner_only() {
    let app = TestApp::new();
    let (_, cookie) = app.dj("shade@example.com", "shade", false).await;

    let anonymous = app.send(get("/dj/shade", None)).await;
    assert_eq!(anonymous.status(), StatusCode::NOT_FOUND);

    let owner = app.send(get("/dj/shade", Some(&cookie))).await;
    assert_eq!(owner.status(), StatusCode::OK);
    assert!(body_text(owner).await.contains("This profile is a draft"));
}

// ============================================================================
// Client flow
// ============================================================================

#[tokio::test]
async fn booking_submission_redirects_to_status_page() {
    let app = TestApp::new();
    app.dj("nova@example.com", "nova", true).await;

    let response = app
        .send(post_form(
            "/dj/nova/book",
            &[
                ("client_name", "Ada Lovelace"),
                ("client_email", "ada@example.com"),
                ("event_date", "2025-06-14"),
                ("event_type", "Wedding"),
            ],
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response);
    let booking = app.db.all_bookings().pop().unwrap();
    assert!(target.starts_with(&booking.status_path()));
    assert!(target.contains("message="));
    assert_eq!(booking.status, BookingStatus::New);
    assert_eq!(app.mailer.sent_to("nova@example.com").len(), 1);
    assert_eq!(app.mailer.sent_to("ada@example.com").len(), 1);

    let page = app.send(get(&target, None)).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert!(body_text(page).await.contains("Your request to"));
}

#[tokio::test]
async fn invalid_booking_returns_to_profile_with_error() {
    let app = TestApp::new();
    app.dj("nova@example.com", "nova", true).await;

    let response = app
        .send(post_form(
            "/dj/nova/book",
            &[
                ("client_name", "Ada"),
                ("client_email", "ada@example.com"),
                ("event_date", "2024-12-31"),
            ],
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/dj/nova?error="));
    assert!(app.db.all_bookings().is_empty());
}

#[tokio::test]
async fn wrong_client_token_is_not_found() {
    let app = TestApp::new();
    let (profile, _) = app.dj("nova@example.com", "nova", true).await;
    let booking = app.booking(&profile, BookingStatus::New).await;

    let wrong = app
        .send(get(&format!("/requests/{}?token=guess", booking.id), None))
        .await;
    assert_eq!(wrong.status(), StatusCode::NOT_FOUND);

    let missing = app.send(get(&format!("/requests/{}", booking.id), None)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let right = app.send(get(&booking.status_path(), None)).await;
    assert_eq!(right.status(), StatusCode::OK);
}

#[tokio::test]
async fn deposit_redirects_to_checkout() {
    let app = TestApp::new();
    let (profile, _) = app.dj("nova@example.com", "nova", true).await;
    let booking = app.booking(&profile, BookingStatus::Accepted).await;

    let response = app
        .send(post_form(
            &format!("/requests/{}/deposit", booking.id),
            &[("token", "client-secret")],
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://"));
    assert_eq!(app.payments.session_count(), 1);
}

// ============================================================================
// Dashboard
// ============================================================================

#[tokio::test]
async fn dashboard_requires_sign_in() {
    let app = TestApp::new();
    let response = app.send(get("/dashboard", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?next=%2Fdashboard");
}

#[tokio::test]
async fn dashboard_is_owner_only() {
    let app = TestApp::new();
    let (nova, nova_cookie) = app.dj("nova@example.com", "nova", true).await;
    let (_, shade_cookie) = app.dj("shade@example.com", "shade", true).await;
    let booking = app.booking(&nova, BookingStatus::New).await;
    let detail = format!("/dashboard/requests/{}", booking.id);

    let other = app.send(get(&detail, Some(&shade_cookie))).await;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);

    let other_accept = app
        .send(post_form(&format!("{detail}/accept"), &[], Some(&shade_cookie)))
        .await;
    assert_eq!(other_accept.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.db.all_bookings()[0].status, BookingStatus::New);

    let owner = app.send(get(&detail, Some(&nova_cookie))).await;
    assert_eq!(owner.status(), StatusCode::OK);
    assert!(body_text(owner).await.contains("Ada"));
}

#[tokio::test]
async fn owner_accepts_request() {
    let app = TestApp::new();
    let (nova, cookie) = app.dj("nova@example.com", "nova", true).await;
    let booking = app.booking(&nova, BookingStatus::New).await;
    let detail = format!("/dashboard/requests/{}", booking.id);

    let response = app
        .send(post_form(&format!("{detail}/accept"), &[], Some(&cookie)))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(&format!("{detail}?message=")));
    let stored = app.db.all_bookings().pop().unwrap();
    assert_eq!(stored.status, BookingStatus::Accepted);
    assert_eq!(stored.deposit_cents, Some(10_000));
    assert_eq!(app.mailer.sent_to("ada@example.com").len(), 1);
}

#[tokio::test]
async fn closing_an_unpaid_booking_is_refused() {
    let app = TestApp::new();
    let (nova, cookie) = app.dj("nova@example.com", "nova", true).await;
    let booking = app.booking(&nova, BookingStatus::Accepted).await;
    let detail = format!("/dashboard/requests/{}", booking.id);

    let response = app
        .send(post_form(&format!("{detail}/close"), &[], Some(&cookie)))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(&format!("{detail}?error=")));
    assert_eq!(app.db.all_bookings()[0].status, BookingStatus::Accepted);
}

#[tokio::test]
async fn declining_after_the_deposit_is_paid_is_refused() {
    let app = TestApp::new();
    let (nova, cookie) = app.dj("nova@example.com", "nova", true).await;
    let booking = app.booking(&nova, BookingStatus::Accepted).await;
    app.db
        .record_deposit(&Actor::Service, booking.id, Some("pi_1"), test_clock().now())
        .await
        .unwrap();
    let detail = format!("/dashboard/requests/{}", booking.id);

    let response = app
        .send(post_form(
            &format!("{detail}/decline"),
            &[("reason", "Double booked")],
            Some(&cookie),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(&format!("{detail}?error=")));
    let stored = app.db.all_bookings().pop().unwrap();
    assert_eq!(stored.status, BookingStatus::Accepted);
    assert_eq!(stored.decline_reason, None);
    assert!(app.mailer.sent_to("ada@example.com").is_empty());
}

// ============================================================================
// Webhook
// ============================================================================

fn webhook(booking_id: Uuid, secret: &str) -> Request<Body> {
    let payload = serde_json::json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "payment_status": "paid",
            "payment_intent": "pi_1",
            "metadata": { "booking_id": booking_id.to_string() }
        }}
    })
    .to_string();
    let signature = sign(payload.as_bytes(), secret, test_clock().now().timestamp());
    Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(payload))
        .unwrap()
}

#[tokio::test]
async fn webhook_marks_deposit_paid_once() {
    let app = TestApp::new();
    let (nova, _) = app.dj("nova@example.com", "nova", true).await;
    let booking = app.booking(&nova, BookingStatus::Accepted).await;

    let response = app.send(webhook(booking.id, WEBHOOK_SECRET)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app.db.all_bookings().pop().unwrap();
    assert!(stored.deposit_paid);
    assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_1"));
    let sent = app.mailer.sent().len();
    assert_eq!(sent, 2);

    let replay = app.send(webhook(booking.id, WEBHOOK_SECRET)).await;
    assert_eq!(replay.status(), StatusCode::OK);
    assert_eq!(app.mailer.sent().len(), sent);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = TestApp::new();
    let (nova, _) = app.dj("nova@example.com", "nova", true).await;
    let booking = app.booking(&nova, BookingStatus::Accepted).await;

    let response = app.send(webhook(booking.id, "whsec_wrong")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!app.db.all_bookings()[0].deposit_paid);
}

#[tokio::test]
async fn webhook_ignores_other_events() {
    let app = TestApp::new();
    let payload = r#"{"id":"evt_2","type":"customer.created","data":{"object":{}}}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .header(
            SIGNATURE_HEADER,
            sign(payload.as_bytes(), WEBHOOK_SECRET, test_clock().now().timestamp()),
        )
        .body(Body::from(payload))
        .unwrap();

    assert_eq!(app.send(request).await.status(), StatusCode::OK);
}

// ============================================================================
// Waitlist, auth, health
// ============================================================================

#[tokio::test]
async fn waitlist_welcomes_new_entries_only() {
    let app = TestApp::new();
    let join = || {
        post_form(
            "/waitlist",
            &[("email", "sam@example.com"), ("role", "client"), ("city", "Porto")],
            None,
        )
    };

    let first = app.send(join()).await;
    assert_eq!(first.status(), StatusCode::SEE_OTHER);
    assert!(location(&first).starts_with("/?message="));
    let second = app.send(join()).await;
    assert!(location(&second).starts_with("/?message="));

    assert_eq!(app.db.waitlist_entries().len(), 1);
    assert_eq!(app.mailer.sent_to("sam@example.com").len(), 1);

    let invalid = app
        .send(post_form("/waitlist", &[("email", "sam"), ("role", "dj")], None))
        .await;
    assert!(location(&invalid).starts_with("/?error="));
}

#[tokio::test]
async fn login_sets_session_cookies_and_honours_next() {
    let app = TestApp::new();
    app.auth.add_user("nova@example.com", "password123");

    let response = app
        .send(post_form(
            "/login",
            &[
                ("email", "nova@example.com"),
                ("password", "password123"),
                ("next", "/dashboard/profile"),
            ],
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard/profile");
    let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
    assert_eq!(cookies.len(), 2);

    let offsite = app
        .send(post_form(
            "/login",
            &[
                ("email", "nova@example.com"),
                ("password", "password123"),
                ("next", "https://evil.example"),
            ],
            None,
        ))
        .await;
    assert_eq!(location(&offsite), "/dashboard");
}

#[tokio::test]
async fn health_endpoints_answer() {
    let app = TestApp::new();
    let live = app.send(get("/health", None)).await;
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app.send(get("/health/ready", None)).await;
    assert_eq!(ready.status(), StatusCode::OK);
    assert!(body_text(ready).await.contains("in-memory"));
}

// ============================================================================
// Sign-up, email links, sign-out
// ============================================================================

#[tokio::test]
async fn signup_signs_the_new_account_in() {
    let app = TestApp::new();

    let response = app
        .send(post_form(
            "/signup",
            &[
                ("email", "new@example.com"),
                ("password", "long-password"),
                ("next", "/dashboard/profile"),
            ],
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/dashboard/profile?message="));
    assert_eq!(set_cookies(&response).len(), 2);
}

#[tokio::test]
async fn signup_awaiting_confirmation_sends_a_link_and_no_cookies() {
    let app = TestApp::with_auth(MockAuthProvider::new().requiring_confirmation());

    let response = app
        .send(post_form(
            "/signup",
            &[("email", "new@example.com"), ("password", "long-password")],
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login?next=%2Fdashboard&message="));
    assert!(set_cookies(&response).is_empty());
    assert_eq!(
        app.auth.sent_links(),
        vec![(
            "new@example.com".to_string(),
            "https://gigbook.test/auth/confirm?next=%2Fdashboard".to_string()
        )]
    );
}

#[tokio::test]
async fn signup_rejects_short_passwords() {
    let app = TestApp::new();

    let response = app
        .send(post_form(
            "/signup",
            &[("email", "new@example.com"), ("password", "short")],
            None,
        ))
        .await;

    assert!(location(&response).starts_with("/signup?next=%2Fdashboard&error="));
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn magic_link_request_sends_a_link_back_to_next() {
    let app = TestApp::new();

    let response = app
        .send(post_form(
            "/auth/magic-link",
            &[("email", "nova@example.com"), ("next", "/dashboard/profile")],
            None,
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/login?next=%2Fdashboard%2Fprofile&message="));
    let links = app.auth.sent_links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].1, "https://gigbook.test/auth/confirm?next=%2Fdashboard%2Fprofile");

    let invalid = app
        .send(post_form("/auth/magic-link", &[("email", "nova")], None))
        .await;
    assert!(location(&invalid).starts_with("/login?next=%2Fdashboard&error="));
    assert_eq!(app.auth.sent_links().len(), 1);
}

#[tokio::test]
async fn confirm_link_signs_in_once_and_stays_on_site() {
    let app = TestApp::new();
    app.send(post_form("/auth/magic-link", &[("email", "nova@example.com")], None))
        .await;
    let token_hash = app.auth.last_link_token("nova@example.com").unwrap();
    let query = serde_urlencoded::to_string([
        ("token_hash", token_hash.as_str()),
        ("type", "magiclink"),
        ("next", "https://evil.example/steal"),
    ])
    .unwrap();

    let response = app.send(get(&format!("/auth/confirm?{query}"), None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
    assert_eq!(set_cookies(&response).len(), 2);

    let replay = app.send(get(&format!("/auth/confirm?{query}"), None)).await;
    assert!(location(&replay).starts_with("/login?next=%2Fdashboard&error="));
    assert!(set_cookies(&replay).is_empty());
}

#[tokio::test]
async fn confirm_link_without_hash_or_with_unknown_type_is_refused() {
    let app = TestApp::new();

    for uri in [
        "/auth/confirm?token_hash=hash-1&type=sms",
        "/auth/confirm?token_hash=&type=magiclink",
        "/auth/confirm?type=signup",
    ] {
        let response = app.send(get(uri, None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert!(location(&response).starts_with("/login?next=%2Fdashboard&error="), "{uri}");
        assert!(set_cookies(&response).is_empty(), "{uri}");
    }
}

#[tokio::test]
async fn logout_clears_cookies_even_when_sign_out_fails() {
    let app = TestApp::with_auth(MockAuthProvider::new().failing_sign_out());
    let (_, cookie) = app.dj("nova@example.com", "nova", true).await;

    let response = app.send(post_form("/logout", &[], Some(&cookie))).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/?message="));
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    assert_eq!(app.auth.signed_out().len(), 1);
}

// ============================================================================
// Profile editor
// ============================================================================

fn profile_fields<'a>(slug: &'a str, display_name: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("slug", slug),
        ("display_name", display_name),
        ("city", "Porto"),
        ("genres", "Techno, House"),
        ("bio", ""),
        ("rate_from", "300"),
        ("contact_email", "shade@example.com"),
    ]
}

#[tokio::test]
async fn profile_save_reports_a_taken_slug() {
    let app = TestApp::new();
    app.dj("nova@example.com", "nova", true).await;
    let (shade, cookie) = app.dj("shade@example.com", "shade", false).await;

    let taken = app
        .send(post_form("/dashboard/profile", &profile_fields("nova", "Shade"), Some(&cookie)))
        .await;
    assert_eq!(taken.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&taken),
        "/dashboard/profile?error=That%20URL%20is%20already%20taken"
    );

    let saved = app
        .send(post_form(
            "/dashboard/profile",
            &profile_fields("shade-live", "Shade"),
            Some(&cookie),
        ))
        .await;
    assert!(location(&saved).starts_with("/dashboard/profile?message="));
    let stored = app
        .db
        .find_by_user(&Actor::Service, shade.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.slug, "shade-live");
    assert_eq!(stored.rate_from_cents, Some(30_000));
}

#[tokio::test]
async fn publishing_an_incomplete_profile_is_refused() {
    let app = TestApp::new();
    let (mut shade, cookie) = app.dj("shade@example.com", "shade", false).await;
    shade.city = String::new();
    app.db.save(&Actor::Service, &shade).await.unwrap();

    let response = app
        .send(post_form("/dashboard/profile/publish", &[], Some(&cookie)))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/dashboard/profile?error=Add%20city"));
    let stored = app
        .db
        .find_by_user(&Actor::Service, shade.user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.published);
}

#[tokio::test]
async fn avatar_upload_stores_the_image() {
    let app = TestApp::new();
    let (shade, cookie) = app.dj("shade@example.com", "shade", false).await;

    let response = app
        .send(multipart("/dashboard/profile/avatar", "image/png", b"\x89PNG-bytes", &cookie))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/dashboard/profile?message="));
    let paths = app.storage.paths();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with(&shade.user_id.to_string()));
    let stored = app
        .db
        .find_by_user(&Actor::Service, shade.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        stored.avatar_url,
        Some(format!("https://storage.test/avatars/{}", paths[0]))
    );
}

#[tokio::test]
async fn avatar_upload_problems_come_back_as_flash_errors() {
    let app = TestApp::new();
    let (_, cookie) = app.dj("shade@example.com", "shade", false).await;
    let oversize = vec![0_u8; MAX_AVATAR_BYTES + 1];

    let wrong_type = app
        .send(multipart("/dashboard/profile/avatar", "text/plain", b"hello", &cookie))
        .await;
    assert_eq!(wrong_type.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&wrong_type),
        "/dashboard/profile?error=Avatars%20must%20be%20PNG%2C%20JPEG%20or%20WebP%20images"
    );

    let too_large = app
        .send(multipart("/dashboard/profile/avatar", "image/png", &oversize, &cookie))
        .await;
    assert_eq!(too_large.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&too_large),
        "/dashboard/profile?error=Avatars%20must%20be%202%20MB%20or%20smaller"
    );

    assert!(app.storage.paths().is_empty());
}
