pub mod auth;
pub mod bookings;
pub mod catalog;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path,
    },
    Json, Router,
};
use std::sync::Arc;

use crate::error::BookingError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(catalog::routes())
        .merge(bookings::routes())
}

// Отказ JSON-экстрактора превращаем в обычную ошибку валидации с телом {"error": ...}
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, BookingError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| BookingError::Validation(rejection.body_text()))
}

// Нечисловой id в пути - такого ресурса нет, как и при несовпадении маршрута
fn path_id(
    path: Result<Path<i64>, PathRejection>,
    not_found: &'static str,
) -> Result<i64, BookingError> {
    path.map(|Path(id)| id).map_err(|rejection| {
        tracing::debug!("path rejected: {}", rejection.body_text());
        BookingError::NotFound(not_found.to_string())
    })
}
