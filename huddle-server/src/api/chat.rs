//! Chat over REST. Live delivery goes through the WebSocket in `ws.rs`.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use huddle_core::coordinator::{FetchHistory, MarkRead, SendMessage, Typing};
use huddle_sdk::objects::{
    ApiErrorKind, HistoryCursor, HistoryQuery, HistoryResponse, SendMessageRequest,
    TypingRequest,
};
use kanau::processor::Processor;
use uuid::Uuid;

use super::ApiError;
use super::convert;
use super::extractors::Authenticated;
use crate::state::AppState;

/// Page size used when the client does not ask for one.
const DEFAULT_PAGE_SIZE: u32 = 50;

/// `POST /activities/{event_id}/messages`
pub async fn send_message(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Path(event_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .coordinator
        .process(SendMessage {
            event_id,
            user_id,
            text: body.text,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(convert::message(&message))))
}

/// `GET /activities/{event_id}/messages?cursor&page_size`
///
/// `cursor` is one of `start`, `latest`, `after:{seq}` or `before:{seq}` and
/// defaults to `latest`.
pub async fn history(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Path(event_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let cursor = match query.cursor.as_deref() {
        None => HistoryCursor::default(),
        Some(raw) => HistoryCursor::from_query_value(raw).ok_or_else(|| {
            ApiError::bad_input(ApiErrorKind::InvalidSpec, format!("invalid cursor {raw:?}"))
        })?,
    };
    let page = state
        .coordinator
        .process(FetchHistory {
            event_id,
            viewer: Some(user_id),
            cursor,
            page_size: query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        })
        .await?;
    Ok(Json(HistoryResponse {
        messages: page.messages.iter().map(convert::receipted).collect(),
        newer: page.newer,
        older: page.older,
    }))
}

/// `POST /activities/{event_id}/typing`
pub async fn typing(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Path(event_id): Path<Uuid>,
    Json(body): Json<TypingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .coordinator
        .process(Typing {
            event_id,
            user_id,
            is_typing: body.is_typing,
            connection: None,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /activities/{event_id}/read`
pub async fn mark_read(
    state: State<AppState>,
    Authenticated(user_id): Authenticated,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .coordinator
        .process(MarkRead { event_id, user_id })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
