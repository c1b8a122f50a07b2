//! Хранилище каталога, пользователей и реестра бронирований.
//!
//! Протокол бронирования работает только через явный дескриптор транзакции
//! [`LedgerTx`], который выдаёт [`Store::begin`]. Глобальной сессии нет:
//! всё, что прочитано и записано внутри одной попытки брони, проходит через
//! этот дескриптор и либо фиксируется целиком, либо откатывается.
//!
//! Две реализации:
//! - [`postgres::PgStore`] - `SELECT ... FOR UPDATE` по строке сеанса;
//! - [`memory::MemoryStore`] - встроенное хранилище с мьютексом на каждый сеанс.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::BookingError;
use crate::models::{Booking, Movie, NewUser, Show, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Открывает транзакцию. Блокировки, взятые через неё, живут до commit/rollback/drop.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, BookingError>;

    async fn list_movies(&self) -> Result<Vec<Movie>, BookingError>;

    async fn list_shows(&self, movie_id: i64) -> Result<Vec<Show>, BookingError>;

    /// Брони пользователя, самые новые первыми.
    async fn list_user_bookings(&self, user_id: i64) -> Result<Vec<Booking>, BookingError>;

    /// Дубликат username - `Validation`.
    async fn create_user(&self, new_user: NewUser) -> Result<User, BookingError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, BookingError>;
}

#[async_trait]
pub trait LedgerTx: Send {
    /// Эксклюзивная блокировка сеанса до конца транзакции. `None`, если сеанса нет.
    async fn lock_show(&mut self, show_id: i64) -> Result<Option<Show>, BookingError>;

    /// Есть ли активная (Booked) бронь на место.
    async fn seat_taken(&mut self, show_id: i64, seat_number: i32) -> Result<bool, BookingError>;

    /// Создаёт бронь со статусом Booked и текущим временем.
    async fn insert_booking(
        &mut self,
        show: &Show,
        user_id: i64,
        seat_number: i32,
    ) -> Result<Booking, BookingError>;

    /// Бронь по id, только если она принадлежит `user_id`.
    async fn find_owned_booking(
        &mut self,
        booking_id: i64,
        user_id: i64,
    ) -> Result<Option<Booking>, BookingError>;

    /// Условный переход Booked -> Cancelled. `false`, если бронь уже не Booked.
    async fn mark_cancelled(&mut self, booking_id: i64) -> Result<bool, BookingError>;

    async fn commit(self: Box<Self>) -> Result<(), BookingError>;

    async fn rollback(self: Box<Self>) -> Result<(), BookingError>;
}
