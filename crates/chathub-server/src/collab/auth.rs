//! Request authentication boundary.
//!
//! A token arrives either as `Authorization: Bearer <token>` or as the
//! `token` query parameter (browsers cannot set headers on a WebSocket
//! upgrade). The header wins when both are present.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use chathub_core::{AuthError, Identity};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Resolves the caller's identity from request credentials.
pub trait Authenticator: Send + Sync {
    /// Authenticate from headers and an optional `token` query parameter.
    fn authenticate(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<Identity, AuthError>;
}

/// Claims carried in a hub token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Stable user ID.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Subject, same as `user_id`.
    pub sub: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// HS256 token validation with a shared secret.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    /// Create an authenticator for `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Sign a token for `identity` valid for `ttl`.
    pub fn issue(&self, identity: &Identity, ttl: TimeDelta) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            user_id: identity.user_id.clone(),
            username: identity.username.clone(),
            sub: identity.user_id.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Validate a raw token and return its identity.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })?;
        let claims = data.claims;
        if claims.user_id.is_empty() || claims.username.is_empty() {
            return Err(AuthError::InvalidToken("missing identity claims".into()));
        }
        Ok(Identity::new(claims.user_id, claims.username))
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<Identity, AuthError> {
        let token = bearer_token(headers)
            .or(query_token.filter(|t| !t.is_empty()))
            .ok_or(AuthError::MissingToken)?;
        self.verify(token)
    }
}

/// Token from an `Authorization: Bearer` header, if well-formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
