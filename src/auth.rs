use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, HeaderValue, header, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::{AppConfig, SessionConfig},
    error::AppError,
    models::{Role, User},
};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "auth_token";

/// Claims
///
/// The payload signed into every session token. Decoding fails (and the session is
/// treated as invalid) if any claim is missing or has the wrong type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Id of the session owner.
    pub user: i64,
    pub email: String,
    /// Integer role code; only `1` grants admin access.
    pub role: Role,
    /// Expiration Time (exp), seconds since the Unix epoch.
    pub exp: usize,
    /// Issued At (iat), seconds since the Unix epoch.
    pub iat: usize,
}

/// AuthError
///
/// Why a request was refused. All variants surface as the same 403 response; the
/// distinction exists for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no session cookie")]
    MissingSession,
    #[error("invalid session: {0}")]
    InvalidSession(String),
    #[error("admin role required")]
    InsufficientRole,
    #[error("record belongs to another user")]
    NotOwner,
}

/// IssuedSession
///
/// A freshly signed token and the instant it stops being accepted.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// issue_session
///
/// Signs `{user, email, role, exp}` with HS256. The lifetime comes from the
/// configuration, never from the caller.
pub fn issue_session(user: &User, config: &SessionConfig) -> Result<IssuedSession, AppError> {
    let now = Utc::now();
    let expires_at = now + config.ttl;

    let claims = Claims {
        user: user.id,
        email: user.email.clone(),
        role: user.role,
        exp: expires_at.timestamp().max(0) as usize,
        iat: now.timestamp().max(0) as usize,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign session token: {e}")))?;

    Ok(IssuedSession { token, expires_at })
}

/// verify_session
///
/// Validates signature, algorithm family and expiry, and returns the typed claims.
/// Only HMAC algorithms are accepted, so a token whose header names anything else
/// is rejected before its signature is even considered.
pub fn verify_session(token: &str, config: &SessionConfig) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.validate_exp = true;
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| AuthError::InvalidSession(e.to_string()))
}

// --- Cookie transport ---

/// Returns the value of the session cookie, if the request carries one.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Builds the `Set-Cookie` value delivering a session to the client.
pub fn session_cookie(session: &IssuedSession) -> Result<HeaderValue, AppError> {
    let cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; Expires={}; HttpOnly; SameSite=Lax",
        session.token,
        session.expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
    );
    HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(format!("invalid session cookie: {e}")))
}

/// Builds the `Set-Cookie` value that removes the session from the client.
pub fn cleared_session_cookie() -> HeaderValue {
    HeaderValue::from_static("auth_token=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

// --- Guards ---

/// AuthUser
///
/// The resolved identity of a request holding a valid session.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.user,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Outcomes:
/// 1. No `auth_token` cookie → Forbidden (`MissingSession`).
/// 2. Cookie present but signature, algorithm, shape or expiry invalid → Forbidden (`InvalidSession`).
/// 3. Valid → the decoded identity.
///
/// When a guard middleware has already resolved the identity it is read back from the
/// request extensions instead of verifying the token a second time.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let config = AppConfig::from_ref(state);
        let token = session_token(&parts.headers).ok_or(AuthError::MissingSession)?;
        let claims = verify_session(token, &config.session)?;

        Ok(AuthUser::from(claims))
    }
}

/// AdminUser
///
/// An [`AuthUser`] whose role claim is exactly [`Role::Admin`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::InsufficientRole.into());
        }
        Ok(AdminUser(user))
    }
}

/// authorize_owner
///
/// Ownership rule for mutating user-owned records: the owner may always proceed,
/// anyone else only with the admin role.
pub fn authorize_owner(user: &AuthUser, owner_id: i64) -> Result<(), AuthError> {
    if owner_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(AuthError::NotOwner)
    }
}
