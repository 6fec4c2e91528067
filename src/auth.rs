use axum::http::{HeaderMap, header};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    context::CurrentUser,
    error::{AppError, AuthFailure},
    models::{Session, User},
};

const ACCESS_TOKEN_TYPE: &str = "access";

/// Claims
///
/// Payload of an access token. `sub` carries the user id as a string, as the JWT
/// registered claim requires.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iss: String,
    pub typ: String,
    pub iat: usize,
    pub exp: usize,
}

/// TokenService
///
/// Mints and verifies HS256 access tokens. Built once from [`AppConfig`] and shared
/// through the application state.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: i64,
}

impl TokenService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_iss.clone(),
            ttl: config.access_token_ttl,
        }
    }

    pub fn make_access_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.clone(),
            iss: self.issuer.clone(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
            iat: now as usize,
            exp: (now + self.ttl) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::server(format!("Failed to sign access token: {e}")))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<CurrentUser, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.typ != ACCESS_TOKEN_TYPE {
            return Err(AppError::authentication(
                AuthFailure::InvalidToken,
                "Invalid access token type",
            ));
        }
        let id = claims.sub.parse().map_err(|_| {
            AppError::authentication(AuthFailure::InvalidToken, "Invalid access token subject")
        })?;

        Ok(CurrentUser {
            id,
            email: claims.email,
            role: claims.role,
        })
    }

    /// Resolves the principal from an `Authorization: Bearer` header.
    /// No header means an anonymous caller; a malformed or invalid token is an error.
    pub fn resolve_principal(&self, headers: &HeaderMap) -> Result<Option<CurrentUser>, AppError> {
        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::authentication(AuthFailure::InvalidToken, "Malformed Authorization header")
            })?;
        self.verify_access_token(token).map(Some)
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Compares a plaintext password with a stored hash. Any mismatch is reported as
/// invalid credentials, never as "user not found".
pub fn check_password(password: &str, hash: &str) -> Result<(), AppError> {
    match bcrypt::verify(password, hash) {
        Ok(true) => Ok(()),
        _ => Err(AppError::authentication(
            AuthFailure::InvalidCredentials,
            "Invalid credentials",
        )),
    }
}

/// verify_session
///
/// Checks a looked-up session against the fingerprint presented by the client.
/// Expiry is checked first, then the fingerprint binding.
pub fn verify_session(session: &Session, fingerprint: &str) -> Result<(), AppError> {
    if session.is_expired() {
        return Err(AppError::authentication(
            AuthFailure::SessionExpired,
            "Session expired",
        ));
    }
    if session.fingerprint != fingerprint {
        return Err(AppError::authentication(
            AuthFailure::InvalidSession,
            "Invalid session. Fingerprint mismatch",
        ));
    }
    Ok(())
}
