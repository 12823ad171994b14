use compact_str::CompactString;
use time::OffsetDateTime;
use uuid::Uuid;

use super::UserId;

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn has_valid_coordinates(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Caller-supplied fields of a new event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSpec {
    pub title: String,
    pub category: String,
    pub description: String,
    pub location: Location,
    pub starts_at: OffsetDateTime,
    /// Creator included.
    pub max_participants: u32,
    pub radius_km: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub name: CompactString,
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub description: String,
    pub location: Location,
    pub starts_at: OffsetDateTime,
    pub max_participants: u32,
    pub radius_km: f64,
    pub creator_id: UserId,
    pub creator_name: CompactString,
    pub created_at: OffsetDateTime,
    /// Accepted participants in join order. The creator is implicit and never listed.
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("the roster is full")]
    Full,
    #[error("the user is already a participant")]
    AlreadyPresent,
}

impl Event {
    /// Number of accepted participants, the creator included.
    pub fn participant_count(&self) -> u32 {
        u32::try_from(self.participants.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1)
    }

    pub fn is_full(&self) -> bool {
        self.participant_count() >= self.max_participants
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.creator_id == user_id || self.participants.iter().any(|p| p.user_id == user_id)
    }

    /// Display name of a member as it appears in chat.
    pub fn member_name(&self, user_id: &str) -> Option<&str> {
        if self.creator_id == user_id {
            return Some(&self.creator_name);
        }
        self.participants
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.name.as_str())
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &UserId> {
        std::iter::once(&self.creator_id).chain(self.participants.iter().map(|p| &p.user_id))
    }

    pub fn add_participant(&mut self, participant: Participant) -> Result<(), RosterError> {
        if self.is_member(&participant.user_id) {
            return Err(RosterError::AlreadyPresent);
        }
        if self.is_full() {
            return Err(RosterError::Full);
        }
        self.participants.push(participant);
        Ok(())
    }
}
