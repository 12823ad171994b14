//! Mapping of engine errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use huddle_core::coordinator::CoordinatorError;
use huddle_sdk::objects::{ApiErrorBody, ApiErrorKind};

/// A failed API call: a status code plus the JSON body clients parse.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    /// Malformed request data that never reached the engine.
    pub fn bad_input(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ApiErrorBody::new(kind, message),
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let message = err.to_string();
        let (status, body) = match err {
            CoordinatorError::InvalidSpec(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorBody::new(ApiErrorKind::InvalidSpec, message),
            ),
            CoordinatorError::InvalidMessage(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorBody::new(ApiErrorKind::InvalidMessage, message),
            ),
            CoordinatorError::QuotaExceeded { tier, limit, .. } => (
                StatusCode::FORBIDDEN,
                ApiErrorBody::new(ApiErrorKind::QuotaExceeded, message)
                    .with_limit(tier.into(), f64::from(limit)),
            ),
            CoordinatorError::RadiusNotAllowed {
                tier,
                max_radius_km,
                ..
            } => (
                StatusCode::FORBIDDEN,
                ApiErrorBody::new(ApiErrorKind::RadiusNotAllowed, message)
                    .with_limit(tier.into(), f64::from(max_radius_km)),
            ),
            CoordinatorError::Conflict(_) => (
                StatusCode::CONFLICT,
                ApiErrorBody::new(ApiErrorKind::Conflict, message),
            ),
            CoordinatorError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                ApiErrorBody::new(ApiErrorKind::NotFound, message),
            ),
            CoordinatorError::InvalidState(_) => (
                StatusCode::CONFLICT,
                ApiErrorBody::new(ApiErrorKind::InvalidState, message),
            ),
            CoordinatorError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                ApiErrorBody::new(ApiErrorKind::Forbidden, message),
            ),
            CoordinatorError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorBody::new(ApiErrorKind::Unavailable, "storage unavailable, retry later"),
            ),
        };
        Self { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::entities::TierName;
    use huddle_sdk::objects::Tier;

    #[test]
    fn test_policy_rejection_carries_tier_and_limit() {
        let err = ApiError::from(CoordinatorError::RadiusNotAllowed {
            tier: TierName::Silver,
            max_radius_km: 25,
            requested_km: 40.0,
        });
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.body.kind, ApiErrorKind::RadiusNotAllowed);
        assert_eq!(err.body.tier, Some(Tier::Silver));
        assert_eq!(err.body.limit, Some(25.0));
    }

    #[test]
    fn test_unavailable_hides_detail() {
        let err = ApiError::from(CoordinatorError::Unavailable("disk on fire".into()));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.body.message.contains("disk"));
        assert!(err.body.kind.is_retryable());
    }
}
