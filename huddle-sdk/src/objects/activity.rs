use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named place with coordinates in decimal degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDto {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

/// Request payload for creating a new activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateActivityRequest {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub location: LocationDto,
    /// Unix timestamp of the start time.
    pub starts_at: i64,
    pub max_participants: u32,
    pub radius_km: f64,
    /// Display name of the creator as shown in chat.
    pub creator_name: String,
}

/// An accepted participant in the order they joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantDto {
    pub user_id: String,
    pub name: String,
    pub joined_at: i64,
}

/// Full activity state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub description: String,
    pub location: LocationDto,
    pub starts_at: i64,
    pub max_participants: u32,
    pub radius_km: f64,
    pub creator_id: String,
    pub creator_name: String,
    pub created_at: i64,
    pub participants: Vec<ParticipantDto>,
    /// Creator included.
    pub participant_count: u32,
}

/// Query string of `GET /activities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
}

/// An activity found by discovery, with its distance from the search origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredActivity {
    pub activity: ActivityResponse,
    pub distance_km: f64,
}
