//! Ошибки протокола бронирования и их отображение в HTTP-ответы.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

// SQLSTATE коды Postgres, после которых операцию можно повторить целиком
const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";
const QUERY_CANCELED: &str = "57014";

/// Результат любой операции над каталогом и реестром бронирований.
#[derive(Debug, Error)]
pub enum BookingError {
    /// Некорректный ввод: вина клиента, исправляется повтором с другими данными.
    #[error("{0}")]
    Validation(String),
    /// Место уже занято или бронь уже отменена.
    #[error("{0}")]
    Conflict(String),
    /// Неизвестный сеанс/бронь или чужая бронь.
    #[error("{0}")]
    NotFound(String),
    /// Таймаут ожидания блокировки или недоступное хранилище. Безопасно повторить.
    #[error("{0}")]
    Unavailable(String),
    #[error("storage failure: {0}")]
    Storage(#[source] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn seat_taken() -> Self {
        Self::Conflict("Seat already booked".to_string())
    }

    pub fn already_cancelled() -> Self {
        Self::Conflict("Booking is already cancelled".to_string())
    }

    pub fn invalid_seat() -> Self {
        Self::Validation("Invalid seat number".to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(
            err,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        ) {
            return Self::Unavailable("Storage is temporarily unavailable, retry later".to_string());
        }

        let code = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code.into_owned());

        match code.as_deref() {
            Some(LOCK_NOT_AVAILABLE) | Some(QUERY_CANCELED) => {
                Self::Unavailable("Show is busy, retry later".to_string())
            }
            Some(DEADLOCK_DETECTED) | Some(SERIALIZATION_FAILURE) => {
                Self::Unavailable("Concurrent update detected, retry later".to_string())
            }
            _ => Self::Storage(err),
        }
    }
}

/// Ошибка HTTP-слоя: доменная ошибка или отказ в аутентификации.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error("{0}")]
    Unauthorized(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Booking(err) => match err {
                BookingError::Validation(_) | BookingError::Conflict(_) => StatusCode::BAD_REQUEST,
                BookingError::NotFound(_) => StatusCode::NOT_FOUND,
                BookingError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                BookingError::Storage(_) | BookingError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Детали сбоев хранилища остаются в логах, клиенту - общий текст
        let message = match &self {
            AppError::Booking(BookingError::Storage(_))
            | AppError::Booking(BookingError::Internal(_)) => {
                tracing::error!("request failed: {:?}", self);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
