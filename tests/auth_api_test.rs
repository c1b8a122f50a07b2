mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use fake::{faker::internet::en::Username, Fake};
use serde_json::json;

fn random_username() -> String {
    let name: String = Username().fake();
    format!("u_{name}")
}

#[tokio::test]
async fn signup_login_then_book() {
    let app = TestApp::new();
    let show = app.seed_show(5);
    let username = random_username();

    let (status, user) = app
        .send(
            Method::POST,
            "/api/signup",
            None,
            Some(json!({
                "username": username,
                "email": "viewer@example.com",
                "password": "password123",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["username"], username.as_str());
    assert!(user.get("password_hash").is_none());

    let (status, token) = app
        .send(
            Method::POST,
            "/api/login",
            None,
            Some(json!({"username": username, "password": "password123"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(token["token_type"], "Bearer");
    let access = token["access"].as_str().unwrap().to_string();

    let (status, booking) = app.book(show.id, &access, json!({"seat_number": 2})).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, mine) = app
        .send(Method::GET, "/api/my-bookings", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine[0]["id"], booking["id"]);
}

#[tokio::test]
async fn duplicate_username_is_rejected() {
    let app = TestApp::new();
    let username = random_username();
    let body = json!({"username": username, "password": "password123"});

    let (status, _) = app
        .send(Method::POST, "/api/signup", None, Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, err) = app.send(Method::POST, "/api/signup", None, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "A user with that username already exists");
}

#[tokio::test]
async fn signup_input_is_validated() {
    let app = TestApp::new();

    let (status, _) = app
        .send(
            Method::POST,
            "/api/signup",
            None,
            Some(json!({"username": "ab", "password": "password123"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/signup",
            None,
            Some(json!({"username": random_username(), "password": "short"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/signup",
            None,
            Some(json!({
                "username": random_username(),
                "email": "not-an-email",
                "password": "password123",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::POST, "/api/signup", None, Some(json!({"username": 5})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blank_email_is_accepted() {
    let app = TestApp::new();
    let username = random_username();

    let (status, user) = app
        .send(
            Method::POST,
            "/api/signup",
            None,
            Some(json!({"username": username, "email": "", "password": "password123"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["email"], "");
    assert!(user.get("created_at").is_none());
}

#[tokio::test]
async fn validation_errors_name_the_field() {
    let app = TestApp::new();

    let (status, err) = app
        .send(
            Method::POST,
            "/api/signup",
            None,
            Some(json!({
                "username": random_username(),
                "email": "nope",
                "password": "password123",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "email: Enter a valid email address");
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_unauthorized() {
    let app = TestApp::new();
    let username = random_username();
    app.send(
        Method::POST,
        "/api/signup",
        None,
        Some(json!({"username": username, "password": "password123"})),
    )
    .await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/login",
            None,
            Some(json!({"username": username, "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/login",
            None,
            Some(json!({"username": "nobody-here", "password": "password123"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
