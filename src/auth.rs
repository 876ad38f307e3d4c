use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::UserIdentity,
    repository::Repository,
};

/// Lifetime of an issued token. There is no refresh or revocation; a token is valid
/// until it expires.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Claims
///
/// Payload signed into every bearer token. `id` and `username` identify the
/// administrative account; `exp` is enforced on every verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub username: String,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
}

/// AuthUser Extractor Result
///
/// The identity attached to a request after its bearer token verified.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

impl From<AuthUser> for UserIdentity {
    fn from(user: AuthUser) -> Self {
        UserIdentity {
            id: user.id,
            username: user.username,
        }
    }
}

/// issue_token
///
/// Signs a fresh HS256 token for `user`, valid for `TOKEN_TTL_HOURS`.
pub fn issue_token(secret: &str, user: &UserIdentity) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        id: user.id,
        username: user.username.clone(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
}

/// verify_token
///
/// Checks signature and expiry. Expiry maps to 401 with "session expired" so clients
/// can tell an old session from a forged one (403).
pub fn verify_token(secret: &str, token: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::Unauthenticated("session expired".into()),
            _ => AppError::Forbidden("invalid token".into()),
        })
}

/// AuthUser Extractor Implementation
///
/// Pulls the bearer token out of the `Authorization` header and verifies it against
/// the secret in `AppConfig`. Verification is stateless: no database lookup, no
/// session store.
///
/// Rejection: `AppError::Unauthenticated` (missing/expired) or `AppError::Forbidden`
/// (bad signature or malformed token).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
            .filter(|token| !token.is_empty() && *token != "Bearer")
            .ok_or_else(|| AppError::Unauthenticated("token not provided".into()))?;

        let claims = verify_token(&config.jwt_secret, token)?;

        Ok(AuthUser {
            id: claims.id,
            username: claims.username,
        })
    }
}

/// Hashes `password` into an argon2id PHC string.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Compares `password` against a stored PHC string. A malformed stored hash counts
/// as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is not a valid PHC string");
            false
        }
    }
}

/// seed_admin
///
/// Creates the administrative account on first boot. Returns `true` when a user was
/// created, `false` when it already existed.
pub async fn seed_admin(repo: &dyn Repository, username: &str, password: &str) -> AppResult<bool> {
    if repo.find_user_by_username(username).await?.is_some() {
        return Ok(false);
    }

    let owned = password.to_string();
    let hash = tokio::task::spawn_blocking(move || hash_password(&owned)).await??;
    let id = repo.create_user(username, &hash).await?;
    tracing::info!(user_id = id, username, "seeded administrative account");
    Ok(true)
}
