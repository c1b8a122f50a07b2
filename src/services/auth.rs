use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::JwtConfig;
use crate::error::{AppError, BookingError};
use crate::models::{NewUser, User};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub access: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";

/// Выпускает HS256 токен для пользователя.
pub fn issue_token(
    config: &JwtConfig,
    user_id: i64,
    username: &str,
) -> Result<IssuedToken, BookingError> {
    let now = Utc::now();
    let ttl = Duration::hours(config.expires_in_hours);
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    let access = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| BookingError::Internal(format!("failed to sign token: {e}")))?;

    Ok(IssuedToken {
        access,
        token_type: "Bearer",
        expires_in: ttl.num_seconds(),
    })
}

/// Проверяет подпись и срок действия токена.
pub fn verify_token(config: &JwtConfig, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::unauthorized("Invalid or expired token"))
}

// bcrypt намеренно медленный - уводим его с потоков рантайма
async fn hash_password(password: String, cost: u32) -> Result<String, BookingError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| BookingError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| BookingError::Internal(format!("failed to hash password: {e}")))
}

async fn verify_password(password: String, hash: String) -> Result<bool, BookingError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| BookingError::Internal(format!("verify task failed: {e}")))?
        .or_else(|e| {
            // Битый хеш в базе - это не "неверный пароль", но и пускать нельзя
            error!("stored password hash is unreadable: {:?}", e);
            Ok(false)
        })
}

pub async fn register(
    store: &dyn Store,
    config: &JwtConfig,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User, BookingError> {
    let password_hash = hash_password(password.to_string(), config.bcrypt_cost).await?;
    let user = store
        .create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
        })
        .await?;

    info!("registered user {} ({})", user.username, user.id);
    Ok(user)
}

/// Проверяет логин и пароль и выдаёт токен. Любая неудача - 401 без подробностей.
pub async fn login(
    store: &dyn Store,
    config: &JwtConfig,
    username: &str,
    password: &str,
) -> Result<IssuedToken, AppError> {
    let user = store
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| AppError::unauthorized(BAD_CREDENTIALS))?;

    if !verify_password(password.to_string(), user.password_hash.clone()).await? {
        return Err(AppError::unauthorized(BAD_CREDENTIALS));
    }

    Ok(issue_token(config, user.id, &user.username)?)
}
