//! Протокол резервирования мест.
//!
//! Бронь создаётся в одной транзакции:
//! 1. проверка ввода (номер места - положительное целое);
//! 2. эксклюзивная блокировка строки сеанса - единственная точка сериализации,
//!    все попытки брони на этот сеанс ждут здесь до commit/rollback;
//! 3. проверка диапазона `1..=total_seats`;
//! 4. проверка занятости места активной бронью;
//! 5. вставка брони и commit, который отпускает блокировку.
//!
//! Шаги 3-5 атомарны относительно любых других попыток на тот же сеанс,
//! поэтому гонка "проверил - записал" невозможна. При любой ошибке
//! транзакция откатывается и реестр не меняется.
//!
//! Отмена блокировку сеанса не берёт: она только освобождает место, а
//! конкурентная бронь, увидевшая место занятым до commit отмены, - это
//! корректный порядок, а не гонка. Сам переход Booked -> Cancelled условный,
//! поэтому две одновременные отмены дают один успех и один конфликт.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::BookingError;
use crate::models::Booking;
use crate::store::{LedgerTx, Store};

/// Разбирает номер места из тела запроса: JSON-число или строка с числом.
pub fn parse_seat_number(raw: Option<&Value>) -> Result<i32, BookingError> {
    let parsed = match raw {
        None | Some(Value::Null) => {
            return Err(BookingError::Validation("Seat number is required".to_string()))
        }
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(BookingError::Validation("Seat number is required".to_string()))
        }
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    parsed
        .filter(|n| *n >= 1)
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(BookingError::invalid_seat)
}

/// Резервирует место `raw_seat` на сеансе `show_id` для `user_id`.
pub async fn reserve(
    store: &dyn Store,
    show_id: i64,
    raw_seat: Option<&Value>,
    user_id: i64,
) -> Result<Booking, BookingError> {
    let seat_number = parse_seat_number(raw_seat)?;

    let mut tx = store.begin().await?;
    let result = reserve_locked(tx.as_mut(), show_id, seat_number, user_id).await;
    let booking = finish(tx, result).await?;

    info!(
        "seat {} of show {} booked by user {} (booking {})",
        booking.seat_number, booking.show_id, user_id, booking.id
    );
    Ok(booking)
}

async fn reserve_locked(
    tx: &mut dyn LedgerTx,
    show_id: i64,
    seat_number: i32,
    user_id: i64,
) -> Result<Booking, BookingError> {
    let show = tx
        .lock_show(show_id)
        .await?
        .ok_or_else(|| BookingError::NotFound("Show not found".to_string()))?;

    if !show.has_seat(seat_number) {
        return Err(BookingError::invalid_seat());
    }

    if tx.seat_taken(show.id, seat_number).await? {
        return Err(BookingError::seat_taken());
    }

    tx.insert_booking(&show, user_id, seat_number).await
}

/// Отменяет бронь `booking_id`, если она принадлежит `user_id`.
pub async fn cancel(
    store: &dyn Store,
    booking_id: i64,
    user_id: i64,
) -> Result<Booking, BookingError> {
    let mut tx = store.begin().await?;
    let result = cancel_owned(tx.as_mut(), booking_id, user_id).await;
    let booking = finish(tx, result).await?;

    info!("booking {} cancelled by user {}", booking.id, user_id);
    Ok(booking)
}

async fn cancel_owned(
    tx: &mut dyn LedgerTx,
    booking_id: i64,
    user_id: i64,
) -> Result<Booking, BookingError> {
    // Чужая бронь неотличима от несуществующей
    let mut booking = tx
        .find_owned_booking(booking_id, user_id)
        .await?
        .ok_or_else(|| BookingError::NotFound("Booking not found".to_string()))?;

    let next = booking.status.cancel()?;

    // Конкурентная отмена успела раньше
    if !tx.mark_cancelled(booking.id).await? {
        return Err(BookingError::already_cancelled());
    }

    booking.status = next;
    Ok(booking)
}

/// Commit при успехе, rollback при ошибке. Ошибка отката не маскирует исходную.
async fn finish<T>(
    tx: Box<dyn LedgerTx>,
    result: Result<T, BookingError>,
) -> Result<T, BookingError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("rollback failed after {:?}: {:?}", err, rollback_err);
            }
            Err(err)
        }
    }
}
