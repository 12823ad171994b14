//! Activity lifecycle: creation, discovery and join requests.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use compact_str::CompactString;
use huddle_core::coordinator::{
    CreateActivity, GetActivity, ListActivities, ListPendingRequests, RequestToJoin,
    ResolveJoinRequest,
};
use huddle_sdk::objects::{
    CreateActivityRequest, DiscoverQuery, RequestToJoinBody, ResolveRequestBody,
};
use kanau::processor::Processor;
use uuid::Uuid;

use super::ApiError;
use super::convert;
use super::extractors::Authenticated;
use crate::state::AppState;

/// `POST /activities`
pub async fn create_activity(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Json(body): Json<CreateActivityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_name = CompactString::from(body.creator_name.as_str());
    let spec = convert::to_spec(body)?;
    let event = state
        .coordinator
        .process(CreateActivity {
            spec,
            user_id,
            user_name,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(convert::activity(&event))))
}

/// `GET /activities?lat&lng&radius_km`
pub async fn discover(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Query(query): Query<DiscoverQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let found = state
        .coordinator
        .process(ListActivities {
            origin_lat: query.lat,
            origin_lng: query.lng,
            radius_km: query.radius_km,
            user_id,
        })
        .await?;
    Ok(Json(found.iter().map(convert::discovered).collect::<Vec<_>>()))
}

/// `GET /activities/{event_id}`
pub async fn get_activity(
    state: State<AppState>,
    _user: Authenticated,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state.coordinator.process(GetActivity { event_id }).await?;
    Ok(Json(convert::activity(&event)))
}

/// `POST /activities/{event_id}/requests`
pub async fn request_to_join(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Path(event_id): Path<Uuid>,
    Json(body): Json<RequestToJoinBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .coordinator
        .process(RequestToJoin {
            event_id,
            user_id,
            user_name: CompactString::from(body.user_name.as_str()),
            message: body.message,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(convert::join_request(&request))))
}

/// `GET /activities/{event_id}/requests`
pub async fn pending_requests(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let pending = state
        .coordinator
        .process(ListPendingRequests {
            event_id,
            viewer: Some(user_id),
        })
        .await?;
    Ok(Json(
        pending.iter().map(convert::join_request).collect::<Vec<_>>(),
    ))
}

/// `POST /requests/{request_id}/resolve`
pub async fn resolve_request(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Path(request_id): Path<Uuid>,
    Json(body): Json<ResolveRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .coordinator
        .process(ResolveJoinRequest {
            request_id,
            decision: body.decision.into(),
            resolver: Some(user_id),
        })
        .await?;
    Ok(Json(convert::join_request(&request)))
}
