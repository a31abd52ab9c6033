//! Request extractors.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use chathub_core::Identity;
use serde::Deserialize;
use tracing::debug;

use super::error::ApiError;
use crate::server::AppState;

/// The authenticated caller. Rejects with 401 when credentials are missing
/// or invalid.
#[derive(Clone, Debug)]
pub struct AuthUser(pub Identity);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let query_token = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token);
        let identity = state
            .authenticator
            .authenticate(&parts.headers, query_token.as_deref())
            .map_err(|e| {
                debug!(path = %parts.uri.path(), error = %e, "authentication failed");
                ApiError::from(e)
            })?;
        Ok(Self(identity))
    }
}
