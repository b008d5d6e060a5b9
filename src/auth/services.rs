pub(crate) use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::repo::UserStore;
use crate::auth::repo_types::User;
use crate::config::JwtConfig;
use crate::state::AppState;
use anyhow::Context;
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Username already registered")]
    UsernameTaken,
    #[error("Invalid username")]
    InvalidUsername,
    #[error("Password too short")]
    PasswordTooShort,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for (StatusCode, String) {
    fn from(e: AuthError) -> Self {
        let status = match e {
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::InvalidUsername | AuthError::PasswordTooShort => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.to_string())
    }
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.@-]{3,80}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Validates and stores a new account.
pub async fn register_user(
    users: &dyn UserStore,
    username: &str,
    password: &str,
) -> Result<User, AuthError> {
    if !is_valid_username(username) {
        return Err(AuthError::InvalidUsername);
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::PasswordTooShort);
    }
    if users.find_by_username(username).await?.is_some() {
        return Err(AuthError::UsernameTaken);
    }
    let hash = hash_password(password)?;
    users
        .insert(username, &hash)
        .await?
        .ok_or(AuthError::UsernameTaken)
}

pub async fn authenticate(
    users: &dyn UserStore,
    username: &str,
    password: &str,
) -> Result<User, AuthError> {
    let Some(user) = users.find_by_username(username).await? else {
        warn!(%username, "login unknown username");
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(password, &user.password_hash)? {
        warn!(%username, user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }
    Ok(user)
}

#[derive(Debug)]
pub enum AdminBootstrap {
    Created(User),
    AlreadyExists,
}

/// Creates the administrative account unless one with that username exists.
pub async fn ensure_admin(
    users: &dyn UserStore,
    username: &str,
    password: &str,
) -> anyhow::Result<AdminBootstrap> {
    anyhow::ensure!(!password.is_empty(), "admin password must not be empty");
    if users.find_by_username(username).await?.is_some() {
        info!(%username, "admin user already exists");
        return Ok(AdminBootstrap::AlreadyExists);
    }
    let hash = hash_password(password)?;
    match users.insert(username, &hash).await.context("create admin user")? {
        Some(user) => {
            info!(%username, user_id = %user.id, "admin user created");
            Ok(AdminBootstrap::Created(user))
        }
        None => Ok(AdminBootstrap::AlreadyExists),
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            refresh_ttl_minutes,
        } = cfg.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes as u64) * 60),
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }
    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }
}

/// Authenticated caller; the only gate on the analytics routes.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        if claims.kind != TokenKind::Access {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Access token required".to_string(),
            ));
        }

        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod password_tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn username_rules() {
        assert!(is_valid_username("admin"));
        assert!(is_valid_username("ana.perez@store"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(&"x".repeat(81)));
    }

    #[test]
    fn auth_errors_map_to_status_codes() {
        let (status, msg): (StatusCode, String) = AuthError::InvalidCredentials.into();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(msg, "Invalid credentials");
        let (status, _): (StatusCode, String) = AuthError::UsernameTaken.into();
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _): (StatusCode, String) = AuthError::PasswordTooShort.into();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}


#[cfg(test)]
mod token_tests {
    use super::*;
    use crate::config::JwtConfig;

    fn dashboard_jwt() -> JwtConfig {
        JwtConfig {
            secret: "dashboard-secret".into(),
            issuer: "superstore".into(),
            audience: "superstore-dashboard".into(),
            ttl_minutes: 15,
            refresh_ttl_minutes: 60 * 24,
        }
    }

    #[test]
    fn access_token_carries_dashboard_claims() {
        let keys = JwtKeys::from_config(&dashboard_jwt());
        let user_id = Uuid::new_v4();
        let claims = keys.verify(&keys.sign_access(user_id).unwrap()).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "superstore");
        assert_eq!(claims.aud, "superstore-dashboard");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn only_refresh_tokens_pass_refresh_check() {
        let keys = JwtKeys::from_config(&dashboard_jwt());
        let user_id = Uuid::new_v4();
        let claims = keys.verify_refresh(&keys.sign_refresh(user_id).unwrap()).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);

        let access = keys.sign_access(user_id).unwrap();
        assert!(keys.verify_refresh(&access).is_err());
    }

    #[test]
    fn tokens_from_another_deployment_are_rejected() {
        let ours = JwtKeys::from_config(&dashboard_jwt());
        let other_audience = JwtKeys::from_config(&JwtConfig {
            audience: "other-dashboard".into(),
            ..dashboard_jwt()
        });
        let other_secret = JwtKeys::from_config(&JwtConfig {
            secret: "different-secret".into(),
            ..dashboard_jwt()
        });
        let token = ours.sign_access(Uuid::new_v4()).unwrap();
        assert!(other_audience.verify(&token).is_err());
        assert!(other_secret.verify(&token).is_err());
        assert!(ours.verify(&token).is_ok());
    }

    #[tokio::test]
    async fn fake_state_keys_use_test_issuer() {
        let keys = JwtKeys::from_ref(&AppState::fake());
        let claims = keys.verify(&keys.sign_access(Uuid::new_v4()).unwrap()).unwrap();
        assert_eq!(claims.iss, "test-issuer");
    }
}
