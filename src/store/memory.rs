//! Встроенное хранилище в памяти процесса.
//!
//! Зафиксированное состояние лежит под одним `std::sync::Mutex`, который
//! никогда не держится через `.await`. Роль блокировки строки сеанса играет
//! `tokio::sync::Mutex` на каждый сеанс: транзакция владеет `OwnedMutexGuard`
//! до commit/rollback/drop. Записи копятся в транзакции и применяются при
//! commit одним шагом, после повторной проверки занятости мест.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use super::{LedgerTx, Store};
use crate::error::BookingError;
use crate::models::{Booking, BookingStatus, Movie, NewUser, Show, User};

type SeatKey = (i64, i32);

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    movies: BTreeMap<i64, Movie>,
    shows: BTreeMap<i64, Show>,
    bookings: BTreeMap<i64, Booking>,
    // (show, seat) -> id активной брони
    active_seats: HashMap<SeatKey, i64>,
    users: BTreeMap<i64, User>,
    usernames: HashMap<String, i64>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

struct Inner {
    state: Mutex<MemoryState>,
    show_locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
    lock_timeout: Duration,
}

impl Inner {
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, BookingError> {
        self.state
            .lock()
            .map_err(|_| BookingError::Internal("memory store state is poisoned".to_string()))
    }

    fn show_lock(&self, show_id: i64) -> Result<Arc<AsyncMutex<()>>, BookingError> {
        let mut locks = self
            .show_locks
            .lock()
            .map_err(|_| {
                BookingError::Internal("memory store lock table is poisoned".to_string())
            })?;
        Ok(locks.entry(show_id).or_default().clone())
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(MemoryState::default()),
                show_locks: Mutex::new(HashMap::new()),
                lock_timeout,
            }),
        }
    }

    pub fn add_movie(
        &self,
        title: &str,
        duration_minutes: i32,
        description: &str,
    ) -> Result<Movie, BookingError> {
        let mut state = self.inner.state()?;
        let movie = Movie {
            id: state.allocate_id(),
            title: title.to_string(),
            duration_minutes,
            description: description.to_string(),
        };
        state.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    pub fn add_show(
        &self,
        movie_id: i64,
        screen_name: &str,
        starts_at: DateTime<Utc>,
        total_seats: i32,
    ) -> Result<Show, BookingError> {
        if total_seats < 1 {
            return Err(BookingError::Validation(
                "total_seats must be at least 1".to_string(),
            ));
        }

        let mut state = self.inner.state()?;
        let movie_title = state
            .movies
            .get(&movie_id)
            .map(|movie| movie.title.clone())
            .ok_or_else(|| BookingError::NotFound("Movie not found".to_string()))?;

        let show = Show {
            id: state.allocate_id(),
            movie_id,
            movie_title,
            screen_name: screen_name.to_string(),
            starts_at,
            total_seats,
        };
        state.shows.insert(show.id, show.clone());
        Ok(show)
    }

    /// Все брони сеанса, включая отменённые, в порядке создания.
    pub fn bookings_for_show(&self, show_id: i64) -> Result<Vec<Booking>, BookingError> {
        let state = self.inner.state()?;
        Ok(state
            .bookings
            .values()
            .filter(|booking| booking.show_id == show_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, BookingError> {
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            held: HashMap::new(),
            pending: Vec::new(),
        }))
    }

    async fn list_movies(&self) -> Result<Vec<Movie>, BookingError> {
        let state = self.inner.state()?;
        Ok(state.movies.values().cloned().collect())
    }

    async fn list_shows(&self, movie_id: i64) -> Result<Vec<Show>, BookingError> {
        let state = self.inner.state()?;
        let mut shows: Vec<Show> = state
            .shows
            .values()
            .filter(|show| show.movie_id == movie_id)
            .cloned()
            .collect();
        shows.sort_by_key(|show| (show.starts_at, show.id));
        Ok(shows)
    }

    async fn list_user_bookings(&self, user_id: i64) -> Result<Vec<Booking>, BookingError> {
        let state = self.inner.state()?;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(bookings)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, BookingError> {
        let mut state = self.inner.state()?;
        if state.usernames.contains_key(&new_user.username) {
            return Err(BookingError::Validation(
                "A user with that username already exists".to_string(),
            ));
        }

        let user = User {
            id: state.allocate_id(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            created_at: Utc::now(),
        };
        state.usernames.insert(user.username.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, BookingError> {
        let state = self.inner.state()?;
        Ok(state
            .usernames
            .get(username)
            .and_then(|id| state.users.get(id))
            .cloned())
    }
}

enum PendingWrite {
    Insert(Booking),
    Cancel(i64),
}

pub struct MemoryTx {
    inner: Arc<Inner>,
    held: HashMap<i64, OwnedMutexGuard<()>>,
    pending: Vec<PendingWrite>,
}

impl MemoryTx {
    fn cancelled_here(&self, booking_id: i64) -> bool {
        self.pending
            .iter()
            .any(|write| matches!(write, PendingWrite::Cancel(id) if *id == booking_id))
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_show(&mut self, show_id: i64) -> Result<Option<Show>, BookingError> {
        // Сеансы неизменяемы, читать их до взятия блокировки безопасно
        let show = self.inner.state()?.shows.get(&show_id).cloned();
        let Some(show) = show else {
            return Ok(None);
        };

        if !self.held.contains_key(&show_id) {
            let lock = self.inner.show_lock(show_id)?;
            let guard = tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    warn!("lock wait on show {} timed out", show_id);
                    BookingError::Unavailable("Show is busy, retry later".to_string())
                })?;
            self.held.insert(show_id, guard);
        }

        Ok(Some(show))
    }

    async fn seat_taken(&mut self, show_id: i64, seat_number: i32) -> Result<bool, BookingError> {
        let committed = self
            .inner
            .state()?
            .active_seats
            .get(&(show_id, seat_number))
            .copied();

        let committed_active = committed.is_some_and(|id| !self.cancelled_here(id));
        let inserted_here = self.pending.iter().any(|write| match write {
            PendingWrite::Insert(b) => b.show_id == show_id && b.seat_number == seat_number,
            PendingWrite::Cancel(_) => false,
        });

        Ok(committed_active || inserted_here)
    }

    async fn insert_booking(
        &mut self,
        show: &Show,
        user_id: i64,
        seat_number: i32,
    ) -> Result<Booking, BookingError> {
        // id расходуется сразу, как последовательность в Postgres
        let id = self.inner.state()?.allocate_id();
        let booking = Booking {
            id,
            user_id,
            show_id: show.id,
            movie_title: show.movie_title.clone(),
            show_time: show.starts_at,
            seat_number,
            status: BookingStatus::Booked,
            created_at: Utc::now(),
        };
        self.pending.push(PendingWrite::Insert(booking.clone()));
        Ok(booking)
    }

    async fn find_owned_booking(
        &mut self,
        booking_id: i64,
        user_id: i64,
    ) -> Result<Option<Booking>, BookingError> {
        let booking = self
            .inner
            .state()?
            .bookings
            .get(&booking_id)
            .filter(|booking| booking.user_id == user_id)
            .cloned();

        Ok(booking.map(|mut booking| {
            if self.cancelled_here(booking.id) {
                booking.status = BookingStatus::Cancelled;
            }
            booking
        }))
    }

    async fn mark_cancelled(&mut self, booking_id: i64) -> Result<bool, BookingError> {
        let active = self
            .inner
            .state()?
            .bookings
            .get(&booking_id)
            .is_some_and(Booking::is_active);

        if !active || self.cancelled_here(booking_id) {
            return Ok(false);
        }
        self.pending.push(PendingWrite::Cancel(booking_id));
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), BookingError> {
        let MemoryTx { inner, held, pending } = *self;

        {
            let mut guard = inner.state()?;
            let state = &mut *guard;

            // Сначала проверяем всё, потом применяем: либо все записи, либо ни одной
            let mut claimed: HashMap<SeatKey, Option<i64>> = HashMap::new();
            let mut cancelled: HashSet<i64> = HashSet::new();
            for write in &pending {
                match write {
                    PendingWrite::Insert(booking) => {
                        let key = (booking.show_id, booking.seat_number);
                        let occupant = claimed
                            .get(&key)
                            .copied()
                            .unwrap_or_else(|| state.active_seats.get(&key).copied());
                        if occupant.is_some() {
                            return Err(BookingError::seat_taken());
                        }
                        claimed.insert(key, Some(booking.id));
                    }
                    PendingWrite::Cancel(id) => {
                        let booking = state
                            .bookings
                            .get(id)
                            .filter(|booking| booking.is_active() && !cancelled.contains(id))
                            .ok_or_else(BookingError::already_cancelled)?;
                        claimed.insert((booking.show_id, booking.seat_number), None);
                        cancelled.insert(*id);
                    }
                }
            }

            for write in pending {
                match write {
                    PendingWrite::Insert(booking) => {
                        state
                            .active_seats
                            .insert((booking.show_id, booking.seat_number), booking.id);
                        state.bookings.insert(booking.id, booking);
                    }
                    PendingWrite::Cancel(id) => {
                        if let Some(booking) = state.bookings.get_mut(&id) {
                            booking.status = BookingStatus::Cancelled;
                            let key = (booking.show_id, booking.seat_number);
                            if state.active_seats.get(&key) == Some(&id) {
                                state.active_seats.remove(&key);
                            }
                        }
                    }
                }
            }
        }

        // Блокировки сеансов отпускаем только после того, как запись видна
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BookingError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_show(total_seats: i32) -> (MemoryStore, Show) {
        let store = MemoryStore::new(Duration::from_millis(50));
        let movie = store.add_movie("Inception", 148, "").unwrap();
        let show = store
            .add_show(movie.id, "Screen 1", Utc::now(), total_seats)
            .unwrap();
        (store, show)
    }

    #[test]
    fn show_requires_positive_capacity() {
        let store = MemoryStore::new(Duration::from_millis(50));
        let movie = store.add_movie("Inception", 148, "").unwrap();
        assert!(matches!(
            store.add_show(movie.id, "Screen 1", Utc::now(), 0),
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            store.add_show(movie.id + 100, "Screen 1", Utc::now(), 10),
            Err(BookingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn second_lock_on_same_show_times_out() {
        let (store, show) = store_with_show(10);

        let mut first = store.begin().await.unwrap();
        assert!(first.lock_show(show.id).await.unwrap().is_some());

        let mut second = store.begin().await.unwrap();
        let err = second.lock_show(show.id).await.unwrap_err();
        assert!(err.is_retryable());

        first.rollback().await.unwrap();
        assert!(second.lock_show(show.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn relocking_inside_one_transaction_does_not_deadlock() {
        let (store, show) = store_with_show(10);
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_show(show.id).await.unwrap().is_some());
        assert!(tx.lock_show(show.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rolled_back_insert_leaves_no_trace() {
        let (store, show) = store_with_show(10);

        let mut tx = store.begin().await.unwrap();
        tx.insert_booking(&show, 1, 3).await.unwrap();
        assert!(tx.seat_taken(show.id, 3).await.unwrap());
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.seat_taken(show.id, 3).await.unwrap());
        assert!(store.bookings_for_show(show.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_rejects_seat_claimed_by_another_transaction() {
        let (store, show) = store_with_show(10);

        // Обе транзакции в обход блокировки сеанса: срабатывает проверка при commit
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_booking(&show, 1, 7).await.unwrap();
        second.insert_booking(&show, 2, 7).await.unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(BookingError::Conflict(_))
        ));

        let active: Vec<_> = store
            .bookings_for_show(show.id)
            .unwrap()
            .into_iter()
            .filter(Booking::is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, 1);
    }

    #[tokio::test]
    async fn racing_cancellations_commit_once() {
        let (store, show) = store_with_show(10);
        let mut tx = store.begin().await.unwrap();
        let booking = tx.insert_booking(&show, 1, 2).await.unwrap();
        tx.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(first.mark_cancelled(booking.id).await.unwrap());
        assert!(second.mark_cancelled(booking.id).await.unwrap());

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(BookingError::Conflict(_))
        ));

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.seat_taken(show.id, 2).await.unwrap());
        assert!(!tx.mark_cancelled(booking.id).await.unwrap());
    }
}
