#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use eventhub_server::auth::Claims;
use eventhub_server::clock::ManualClock;
use eventhub_server::config::Config;
use eventhub_server::models::user::Role;
use eventhub_server::notify::Notifier;
use eventhub_server::repository::memory::MemoryStore;
use eventhub_server::routes::create_routes;
use eventhub_server::utils::error::AppError;
use eventhub_server::{build_state, Backends};

pub const JWT_SECRET: &str = "integration-secret";

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, _subject: &str, _html: &str) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(to.to_string());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 10, 0, 0).unwrap()
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// `jwt_secret` is always replaced with the test secret.
    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let notifier = Arc::new(RecordingNotifier::default());

        let config = Config {
            jwt_secret: JWT_SECRET.to_string(),
            ..config
        };
        let state = build_state(
            config,
            Backends::in_memory(store.clone(), notifier.clone(), clock.clone()),
        )
        .unwrap();

        Self {
            router: create_routes(state),
            store,
            clock,
            notifier,
        }
    }

    /// A verified account known only through its token; the server
    /// provisions it on the first request.
    pub fn user(&self, role: Role) -> (Uuid, String) {
        let id = Uuid::new_v4();
        (id, token_for(id, role, Some(&university_email(id)), Some(true)))
    }

    pub fn unverified_user(&self) -> (Uuid, String) {
        let id = Uuid::new_v4();
        (id, token_for(id, Role::User, Some(&university_email(id)), Some(false)))
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Creates an event starting a week from the test clock.
    pub async fn create_event(&self, token: &str, max_attendees: i32, price: f64) -> Uuid {
        let start = start_time() + Duration::days(7);
        let (status, body) = self
            .request(
                Method::POST,
                "/api/events",
                Some(token),
                Some(serde_json::json!({
                    "title": "Hackathon Weekend",
                    "description": "Forty eight hours of building things together",
                    "startDate": start,
                    "endDate": start + Duration::hours(48),
                    "location": "Innovation Hub",
                    "category": "Teknologjik",
                    "maxAttendees": max_attendees,
                    "ticketPrice": price,
                    "tags": ["coding"]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }
}

pub fn university_email(id: Uuid) -> String {
    format!("{}@umib.net", id.simple())
}

/// Signs a token; `email` doubles as the switch for the profile claims.
pub fn token_for(id: Uuid, role: Role, email: Option<&str>, verified: Option<bool>) -> String {
    let claims = Claims {
        id,
        role,
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        name: email.map(|_| "Test User".to_string()),
        email: email.map(str::to_string),
        is_email_verified: verified,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}
