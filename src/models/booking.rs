use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::error::BookingError;

/// Статус брони. Единственный допустимый переход: Booked -> Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Booked,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Booked => "BOOKED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    /// Переход в Cancelled. Повторная отмена - ошибка, а не тихий успех.
    pub fn cancel(self) -> Result<BookingStatus, BookingError> {
        match self {
            BookingStatus::Booked => Ok(BookingStatus::Cancelled),
            BookingStatus::Cancelled => Err(BookingError::already_cancelled()),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "BOOKED" => Ok(BookingStatus::Booked),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status {other:?}")),
        }
    }
}

/// Бронь одного места на сеанс. Владелец не сериализуется наружу.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Booking {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    #[serde(rename = "show")]
    pub show_id: i64,
    pub movie_title: String,
    pub show_time: DateTime<Utc>,
    pub seat_number: i32,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Booked
    }
}
