//! Custom Axum extractors for request authentication.
//!
//! Provides `Authenticated`, which verifies the `Huddle-Session` header and
//! yields the user id it was issued for. All cryptographic operations are
//! delegated to [`huddle_sdk::signature`].

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use huddle_core::entities::UserId;
use huddle_sdk::objects::{ApiErrorBody, ApiErrorKind};
use huddle_sdk::signature::{SESSION_HEADER, SignatureError};

use crate::state::AppState;

/// The user a request acts for.
///
/// # Header format
///
/// ```text
/// Huddle-Session: {user_id}.{unix_timestamp}.{base64_signature}
/// ```
pub struct Authenticated(pub UserId);

/// Errors returned by the [`Authenticated`] extractor.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Huddle-Session header")]
    MissingHeader,
    #[error("invalid Huddle-Session header")]
    InvalidHeader,
    #[error("session token expired")]
    Expired,
    #[error("session token rejected")]
    Rejected,
}

impl From<SignatureError> for AuthError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat | SignatureError::InvalidBase64 => Self::InvalidHeader,
            SignatureError::Expired => Self::Expired,
            SignatureError::SignatureMismatch | SignatureError::NotYetValid => Self::Rejected,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::InvalidHeader => StatusCode::BAD_REQUEST,
            AuthError::MissingHeader | AuthError::Expired | AuthError::Rejected => {
                StatusCode::UNAUTHORIZED
            }
        };
        (
            status,
            Json(ApiErrorBody::new(ApiErrorKind::Unauthorized, self.to_string())),
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(SESSION_HEADER)
            .ok_or(AuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader)?;

        let user_id = state.authenticate(token).await.inspect_err(|e| {
            tracing::debug!(error = %e, "Session token rejected");
        })?;
        Ok(Authenticated(user_id))
    }
}
