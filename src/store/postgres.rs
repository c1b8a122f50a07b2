use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use tracing::debug;

use super::{LedgerTx, Store};
use crate::database::Database;
use crate::error::BookingError;
use crate::models::{Booking, BookingStatus, Movie, NewUser, Show, User};

const ACTIVE_SEAT_INDEX: &str = "bookings_active_seat_uidx";

const SHOW_COLUMNS: &str = r#"
    SELECT s.id, s.movie_id, m.title AS movie_title, s.screen_name, s.starts_at, s.total_seats
    FROM shows s
    JOIN movies m ON m.id = s.movie_id
"#;

const BOOKING_COLUMNS: &str = r#"
    SELECT b.id, b.user_id, b.show_id, m.title AS movie_title, s.starts_at AS show_time,
           b.seat_number, b.status, b.created_at
    FROM bookings b
    JOIN shows s ON s.id = b.show_id
    JOIN movies m ON m.id = s.movie_id
"#;

/// Postgres-реализация: эксклюзивная блокировка сеанса через `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
    lock_timeout_ms: u64,
}

impl PgStore {
    pub fn new(db: Database, lock_timeout_ms: u64) -> Self {
        Self { db, lock_timeout_ms }
    }
}

fn is_unique_violation(err: &sqlx::Error, constraint: Option<&str>) -> bool {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => {
            constraint.is_none() || db_err.constraint() == constraint
        }
        _ => false,
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, BookingError> {
        let mut tx = self.db.pool.begin().await?;

        // SET не принимает bind-параметры; значение - число из конфигурации
        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms);
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(Box::new(PgTx { tx }))
    }

    async fn list_movies(&self) -> Result<Vec<Movie>, BookingError> {
        let movies = sqlx::query_as::<_, Movie>(
            "SELECT id, title, duration_minutes, description FROM movies ORDER BY id",
        )
        .fetch_all(&self.db.pool)
        .await?;
        Ok(movies)
    }

    async fn list_shows(&self, movie_id: i64) -> Result<Vec<Show>, BookingError> {
        let query = format!("{SHOW_COLUMNS} WHERE s.movie_id = $1 ORDER BY s.starts_at, s.id");
        let shows = sqlx::query_as::<_, Show>(&query)
            .bind(movie_id)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(shows)
    }

    async fn list_user_bookings(&self, user_id: i64) -> Result<Vec<Booking>, BookingError> {
        let query =
            format!("{BOOKING_COLUMNS} WHERE b.user_id = $1 ORDER BY b.created_at DESC, b.id DESC");
        let bookings = sqlx::query_as::<_, Booking>(&query)
            .bind(user_id)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(bookings)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, BookingError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_one(&self.db.pool)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e, None) => Err(BookingError::Validation(
                "A user with that username already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, BookingError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(user)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn lock_show(&mut self, show_id: i64) -> Result<Option<Show>, BookingError> {
        // FOR UPDATE OF s: блокируем только строку сеанса, фильм остаётся свободным
        let query = format!("{SHOW_COLUMNS} WHERE s.id = $1 FOR UPDATE OF s");
        let show = sqlx::query_as::<_, Show>(&query)
            .bind(show_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        debug!("show {} locked: {}", show_id, show.is_some());
        Ok(show)
    }

    async fn seat_taken(&mut self, show_id: i64, seat_number: i32) -> Result<bool, BookingError> {
        let taken = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
              SELECT 1 FROM bookings
              WHERE show_id = $1 AND seat_number = $2 AND status = $3
            )
            "#,
        )
        .bind(show_id)
        .bind(seat_number)
        .bind(BookingStatus::Booked.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(taken)
    }

    async fn insert_booking(
        &mut self,
        show: &Show,
        user_id: i64,
        seat_number: i32,
    ) -> Result<Booking, BookingError> {
        let res = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            r#"
            INSERT INTO bookings (user_id, show_id, seat_number, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            "#,
        )
        .bind(user_id)
        .bind(show.id)
        .bind(seat_number)
        .bind(BookingStatus::Booked.as_str())
        .fetch_one(&mut *self.tx)
        .await;

        let (id, created_at) = match res {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e, Some(ACTIVE_SEAT_INDEX)) => {
                return Err(BookingError::seat_taken())
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Booking {
            id,
            user_id,
            show_id: show.id,
            movie_title: show.movie_title.clone(),
            show_time: show.starts_at,
            seat_number,
            status: BookingStatus::Booked,
            created_at,
        })
    }

    async fn find_owned_booking(
        &mut self,
        booking_id: i64,
        user_id: i64,
    ) -> Result<Option<Booking>, BookingError> {
        let query = format!("{BOOKING_COLUMNS} WHERE b.id = $1 AND b.user_id = $2");
        let booking = sqlx::query_as::<_, Booking>(&query)
            .bind(booking_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(booking)
    }

    async fn mark_cancelled(&mut self, booking_id: i64) -> Result<bool, BookingError> {
        let res = sqlx::query("UPDATE bookings SET status = $2 WHERE id = $1 AND status = $3")
            .bind(booking_id)
            .bind(BookingStatus::Cancelled.as_str())
            .bind(BookingStatus::Booked.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), BookingError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BookingError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
