use crate::cache::{CacheService, CacheStatus};
use crate::error::BookingError;
use crate::models::{Movie, Show};

const MOVIES_KEY: &str = "catalog:movies";

fn shows_key(movie_id: i64) -> String {
    format!("catalog:movies:{}:shows", movie_id)
}

impl CacheService {
    /// Список фильмов: сначала Redis, при промахе - хранилище.
    pub async fn get_movies(&self) -> Result<(Vec<Movie>, CacheStatus), BookingError> {
        if self.redis.is_none() {
            return Ok((self.store.list_movies().await?, CacheStatus::Bypass));
        }

        if let Some(movies) = self.read::<Vec<Movie>>(MOVIES_KEY).await {
            return Ok((movies, CacheStatus::Hit));
        }

        let movies = self.store.list_movies().await?;
        self.write(MOVIES_KEY, &movies).await;
        Ok((movies, CacheStatus::Miss))
    }

    /// Сеансы фильма, отсортированные по времени начала.
    pub async fn get_shows(&self, movie_id: i64) -> Result<(Vec<Show>, CacheStatus), BookingError> {
        if self.redis.is_none() {
            return Ok((self.store.list_shows(movie_id).await?, CacheStatus::Bypass));
        }

        let key = shows_key(movie_id);
        if let Some(shows) = self.read::<Vec<Show>>(&key).await {
            return Ok((shows, CacheStatus::Hit));
        }

        let shows = self.store.list_shows(movie_id).await?;
        self.write(&key, &shows).await;
        Ok((shows, CacheStatus::Miss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn without_redis_reads_go_to_store() {
        let store = MemoryStore::new(Duration::from_millis(100));
        let movie = store.add_movie("Arrival", 116, "").unwrap();
        store.add_show(movie.id, "Screen 2", Utc::now(), 40).unwrap();

        let cache = CacheService::new(None, Arc::new(store), 60);

        let (movies, status) = cache.get_movies().await.unwrap();
        assert_eq!(status, CacheStatus::Bypass);
        assert_eq!(movies, vec![movie.clone()]);

        let (shows, status) = cache.get_shows(movie.id).await.unwrap();
        assert_eq!(status, CacheStatus::Bypass);
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].movie_title, "Arrival");

        let (shows, _) = cache.get_shows(movie.id + 1000).await.unwrap();
        assert!(shows.is_empty());
    }

    #[test]
    fn show_keys_are_per_movie() {
        assert_eq!(shows_key(7), "catalog:movies:7:shows");
        assert_ne!(shows_key(7), shows_key(8));
    }
}
