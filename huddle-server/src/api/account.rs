use axum::{
    Json,
    extract::State,
    response::IntoResponse,
};
use huddle_core::coordinator::{GetEngagementHints, GetUsage, UpgradeTier};
use huddle_core::tier_gate::catalog;
use huddle_sdk::objects::{EngagementHints, UpgradeTierRequest};
use kanau::processor::Processor;

use super::ApiError;
use super::convert;
use super::extractors::Authenticated;
use crate::state::AppState;

/// `GET /me/usage`
pub async fn usage(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.coordinator.process(GetUsage { user_id }).await?;
    Ok(Json(convert::usage(&report)))
}

/// `POST /me/tier`
///
/// Billing happens elsewhere; this only records the tier the user is on.
pub async fn change_tier(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Json(body): Json<UpgradeTierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .coordinator
        .process(UpgradeTier {
            user_id,
            tier: body.tier.into(),
        })
        .await?;
    Ok(Json(convert::usage(&report)))
}

/// `GET /me/hints`
pub async fn hints(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let hints = state
        .coordinator
        .process(GetEngagementHints { user_id })
        .await?;
    Ok(Json(EngagementHints {
        prompt_upgrade: hints.prompt_upgrade,
        show_daily_suggestions: hints.show_daily_suggestions,
    }))
}

/// `GET /tiers`
pub async fn tiers(_user: Authenticated) -> impl IntoResponse {
    Json(catalog().iter().map(convert::tier).collect::<Vec<_>>())
}
