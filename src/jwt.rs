use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::authz::Session;
use crate::errors::AppError;

pub const SESSION_COOKIE: &str = "intermax_session";

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
    /// Maximum age, in seconds, of the permissions embedded in a token before
    /// the session resolver re-reads them from the database.
    pub refresh_secs: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = env_i64("JWT_EXP_HOURS", 24)?;
        let refresh_secs = env_i64("SESSION_REFRESH_SECS", 0)?;

        if refresh_secs < 0 {
            return Err(AppError::configuration("SESSION_REFRESH_SECS must not be negative"));
        }

        Ok(Self {
            secret: Arc::new(secret.into_bytes()),
            exp_hours,
            refresh_secs,
        })
    }

    pub fn encode(&self, session: &Session) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.exp_hours);
        let rat = now + Duration::seconds(self.refresh_secs);

        let claims = Claims {
            sub: session.user_id,
            email: session.email.clone(),
            name: session.name.clone(),
            role: session.role.clone(),
            permissions: session.permissions.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
            rat: rat.timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }

    /// `Set-Cookie` value carrying a freshly issued token.
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.exp_hours * 3600
        )
    }

    pub fn clear_cookie() -> String {
        format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
    }
}

fn env_i64(key: &str, default: i64) -> Result<i64, AppError> {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::configuration(format!("{key} must be a valid integer"))),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub role: Option<String>,
    pub permissions: Vec<String>,
    pub iat: usize,
    pub exp: usize,
    /// Refresh-at marker: once passed, embedded permissions are considered stale.
    pub rat: usize,
}

impl Claims {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.rat as i64
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat as i64, 0).single().unwrap_or_else(Utc::now)
    }
}

/// Pulls the session token from `Authorization: Bearer` or, failing that,
/// from the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
