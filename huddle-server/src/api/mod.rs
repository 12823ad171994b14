//! REST and WebSocket API.
//!
//! Every route except the WebSocket requires the `Huddle-Session` header. The
//! WebSocket authenticates with its first frame instead.
//!
//! # Endpoints
//!
//! - `POST /activities`                  – create an activity
//! - `GET  /activities?lat&lng&radius_km` – discover activities, nearest first
//! - `GET  /activities/{id}`             – one activity
//! - `POST /activities/{id}/requests`    – ask to join
//! - `GET  /activities/{id}/requests`    – pending requests (creator only)
//! - `POST /requests/{id}/resolve`       – accept or reject (creator only)
//! - `POST /activities/{id}/messages`    – post a chat message
//! - `GET  /activities/{id}/messages`    – chat history page
//! - `POST /activities/{id}/typing`      – typing indicator
//! - `POST /activities/{id}/read`        – mark everything read
//! - `GET  /me/usage`, `POST /me/tier`, `GET /me/hints`, `GET /tiers`
//! - `GET  /ws`                          – real-time stream

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

mod account;
mod activities;
mod chat;
mod convert;
mod error;
mod extractors;
mod ws;

pub use error::ApiError;

/// Build the `/api/v1` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/activities",
            post(activities::create_activity).get(activities::discover),
        )
        .route("/activities/{event_id}", get(activities::get_activity))
        .route(
            "/activities/{event_id}/requests",
            post(activities::request_to_join).get(activities::pending_requests),
        )
        .route(
            "/requests/{request_id}/resolve",
            post(activities::resolve_request),
        )
        .route(
            "/activities/{event_id}/messages",
            post(chat::send_message).get(chat::history),
        )
        .route("/activities/{event_id}/typing", post(chat::typing))
        .route("/activities/{event_id}/read", post(chat::mark_read))
        .route("/me/usage", get(account::usage))
        .route("/me/tier", post(account::change_tier))
        .route("/me/hints", get(account::hints))
        .route("/tiers", get(account::tiers))
        .route("/ws", get(ws::chat_ws))
}

#[cfg(test)]
mod tests;
