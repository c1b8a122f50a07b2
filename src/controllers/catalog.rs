use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::{header::HeaderName, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use super::path_id;
use crate::{error::AppError, AppState};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies", get(list_movies))
        .route("/movies/{movie_id}/shows", get(list_shows))
}

// GET /api/movies - без аутентификации
async fn list_movies(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let (movies, cache_status) = state.cache.get_movies().await?;
    Ok((
        StatusCode::OK,
        [(X_CACHE, cache_status.as_header())],
        Json(movies),
    ))
}

// GET /api/movies/{movie_id}/shows
async fn list_shows(
    State(state): State<Arc<AppState>>,
    movie_id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let movie_id = path_id(movie_id, "Movie not found")?;
    let (shows, cache_status) = state.cache.get_shows(movie_id).await?;
    Ok((
        StatusCode::OK,
        [(X_CACHE, cache_status.as_header())],
        Json(shows),
    ))
}
