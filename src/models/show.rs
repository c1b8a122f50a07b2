use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Сеанс фильма. Вместимость не меняется после создания.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Show {
    pub id: i64,
    #[serde(rename = "movie")]
    pub movie_id: i64,
    pub movie_title: String,
    pub screen_name: String,
    #[serde(rename = "date_time")]
    pub starts_at: DateTime<Utc>,
    pub total_seats: i32,
}

impl Show {
    pub fn has_seat(&self, seat_number: i32) -> bool {
        (1..=self.total_seats).contains(&seat_number)
    }
}
