#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use movie_booking::{
    app,
    config::Config,
    models::Show,
    services::auth,
    store::{MemoryStore, Store},
    AppState,
};

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgres://unused/movies"),
        ("JWT_SECRET", "integration-test-secret"),
        ("BCRYPT_COST", "4"),
        ("LOCK_TIMEOUT_MS", "5000"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("test config")
}

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = test_config();
        let store = MemoryStore::new(Duration::from_millis(config.booking.lock_timeout_ms));
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let state = AppState::with_store(config, shared, None);

        Self {
            router: app(state.clone()),
            store,
            state,
        }
    }

    pub fn seed_show(&self, total_seats: i32) -> Show {
        let movie = self
            .store
            .add_movie("Inception", 148, "A thief who steals corporate secrets")
            .expect("movie");
        self.store
            .add_show(
                movie.id,
                "Screen 1",
                Utc::now() + ChronoDuration::days(1),
                total_seats,
            )
            .expect("show")
    }

    /// Токен для произвольного id: протоколу брони идентичность непрозрачна.
    pub fn token_for(&self, user_id: i64) -> String {
        auth::issue_token(&self.state.config.jwt, user_id, &format!("user{user_id}"))
            .expect("token")
            .access
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn book(&self, show_id: i64, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("/api/shows/{show_id}/book"),
            Some(token),
            Some(body),
        )
        .await
    }

    pub async fn cancel(&self, booking_id: i64, token: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("/api/bookings/{booking_id}/cancel"),
            Some(token),
            None,
        )
        .await
    }
}
