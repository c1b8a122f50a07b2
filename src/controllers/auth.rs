use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::{Validate, ValidationErrors};

use super::json_body;
use crate::{
    error::{AppError, BookingError},
    services::auth,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

#[derive(Debug, Deserialize, Validate)]
struct SignupRequest {
    #[validate(length(
        min = 3,
        max = 150,
        message = "Ensure this field has between 3 and 150 characters"
    ))]
    username: String,
    #[validate(email(message = "Enter a valid email address"))]
    email: Option<String>,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Ensure this field has between 8 and 128 characters"
    ))]
    password: String,
}

/// `field: message` по каждому полю, поля в алфавитном порядке.
fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages: Vec<String> = errs
                .iter()
                .map(|err| match &err.message {
                    Some(message) => message.to_string(),
                    None => format!("invalid value ({})", err.code),
                })
                .collect();
            format!("{}: {}", field, messages.join(", "))
        })
        .collect();
    fields.sort();
    fields.join("; ")
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

// POST /api/signup
async fn signup(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let mut req: SignupRequest = json_body(body)?;
    // Пустой email равнозначен отсутствующему
    req.email = req.email.filter(|email| !email.trim().is_empty());
    req.validate()
        .map_err(|errors| BookingError::Validation(describe(&errors)))?;

    let user = auth::register(
        state.store.as_ref(),
        &state.config.jwt,
        &req.username,
        req.email.as_deref().unwrap_or_default(),
        &req.password,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

// POST /api/login
async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = json_body(body)?;
    let token = auth::login(
        state.store.as_ref(),
        &state.config.jwt,
        &req.username,
        &req.password,
    )
    .await?;

    Ok((StatusCode::OK, Json(token)))
}
