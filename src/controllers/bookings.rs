use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;

use super::path_id;
use crate::{
    error::{AppError, BookingError},
    middleware::AuthUser,
    services::reservation,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows/{show_id}/book", post(book_seat))
        .route("/bookings/{booking_id}/cancel", post(cancel_booking))
        .route("/my-bookings", get(my_bookings))
}

// POST /api/shows/{show_id}/book
async fn book_seat(
    State(state): State<Arc<AppState>>,
    show_id: Result<Path<i64>, PathRejection>,
    user: AuthUser,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let show_id = path_id(show_id, "Show not found")?;
    // Без тела или без Content-Type номер места просто отсутствует
    let body = match body {
        Ok(Json(body)) => Some(body),
        Err(JsonRejection::MissingJsonContentType(_)) => None,
        Err(rejection) => return Err(BookingError::Validation(rejection.body_text()).into()),
    };
    let raw_seat = body.as_ref().and_then(|body| body.get("seat_number"));

    let booking = reservation::reserve(state.store.as_ref(), show_id, raw_seat, user.user_id)
        .await
        .inspect_err(|e| {
            tracing::debug!("reserve show={} user={} rejected: {}", show_id, user.user_id, e)
        })?;

    Ok((StatusCode::CREATED, Json(booking)))
}

// POST /api/bookings/{booking_id}/cancel
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    booking_id: Result<Path<i64>, PathRejection>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let booking_id = path_id(booking_id, "Booking not found")?;
    let booking = reservation::cancel(state.store.as_ref(), booking_id, user.user_id).await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Booking cancelled successfully",
            "booking": booking,
        })),
    ))
}

// GET /api/my-bookings
async fn my_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let bookings = state.store.list_user_bookings(user.user_id).await?;
    Ok((StatusCode::OK, Json(bookings)))
}
