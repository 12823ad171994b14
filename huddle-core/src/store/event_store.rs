//! Event Store: the single source of truth for events and their rosters.

use std::sync::Arc;

use compact_str::CompactString;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Expect, Repository, RepositoryError, Transaction, Versioned};
use crate::entities::UserId;
use crate::entities::event::{Event, EventSpec, Participant, RosterError};
use crate::utils::geo::haversine_km;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventStoreError {
    #[error("invalid event spec: {0}")]
    InvalidSpec(&'static str),
    #[error("event {0} not found")]
    NotFound(Uuid),
    #[error("roster conflict: {0}")]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Discovery filter: events within `radius_km` of the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusFilter {
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub radius_km: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyEvent {
    pub event: Event,
    pub distance_km: f64,
}

#[derive(Clone)]
pub struct EventStore {
    repo: Arc<dyn Repository>,
}

impl EventStore {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Validates a spec and builds the event record without persisting it.
    pub fn prepare_event(
        spec: EventSpec,
        creator_id: UserId,
        creator_name: CompactString,
        now: OffsetDateTime,
    ) -> Result<Event, EventStoreError> {
        let title = spec.title.trim();
        let category = spec.category.trim();
        if title.is_empty() {
            return Err(EventStoreError::InvalidSpec("title is required"));
        }
        if category.is_empty() {
            return Err(EventStoreError::InvalidSpec("category is required"));
        }
        if spec.location.name.trim().is_empty() {
            return Err(EventStoreError::InvalidSpec("location is required"));
        }
        if !spec.location.has_valid_coordinates() {
            return Err(EventStoreError::InvalidSpec(
                "location coordinates are out of range",
            ));
        }
        if spec.max_participants == 0 {
            return Err(EventStoreError::InvalidSpec(
                "max participants must be at least 1",
            ));
        }
        if !spec.radius_km.is_finite() || spec.radius_km <= 0.0 {
            return Err(EventStoreError::InvalidSpec("radius must be positive"));
        }
        Ok(Event {
            id: Uuid::now_v7(),
            title: title.to_owned(),
            category: category.to_owned(),
            description: spec.description,
            location: spec.location,
            starts_at: spec.starts_at,
            max_participants: spec.max_participants,
            radius_km: spec.radius_km,
            creator_id,
            creator_name,
            created_at: now,
            participants: Vec::new(),
        })
    }

    /// Creates and persists a new event with an empty roster.
    pub async fn create_event(
        &self,
        spec: EventSpec,
        creator_id: UserId,
        creator_name: CompactString,
        now: OffsetDateTime,
    ) -> Result<Event, EventStoreError> {
        let event = Self::prepare_event(spec, creator_id, creator_name, now)?;
        self.repo
            .commit(Transaction::new().put_event(event.clone(), Expect::Absent))
            .await?;
        Ok(event)
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Versioned<Event>, EventStoreError> {
        self.repo
            .event(id)
            .await?
            .ok_or(EventStoreError::NotFound(id))
    }

    /// Events whose great-circle distance from the origin is within the radius.
    /// Order is unspecified.
    pub async fn list_events(
        &self,
        filter: RadiusFilter,
    ) -> Result<Vec<NearbyEvent>, EventStoreError> {
        let events = self.repo.events().await?;
        Ok(events
            .into_iter()
            .filter_map(|event| {
                let distance_km = haversine_km(
                    filter.origin_lat,
                    filter.origin_lng,
                    event.location.lat,
                    event.location.lng,
                );
                (distance_km <= filter.radius_km).then_some(NearbyEvent { event, distance_km })
            })
            .collect())
    }

    /// Applies a roster append to a versioned event, returning the updated record
    /// and the expectation its write must carry.
    pub fn stage_append(
        current: &Versioned<Event>,
        participant: Participant,
    ) -> Result<(Event, Expect), EventStoreError> {
        let mut event = current.record.clone();
        event.add_participant(participant)?;
        Ok((event, current.expect()))
    }

    /// Appends a participant on its own. Fails if the roster is full or the user
    /// is already on it, or if the event changed since it was read.
    pub async fn append_participant(
        &self,
        event_id: Uuid,
        participant: Participant,
    ) -> Result<Event, EventStoreError> {
        let current = self.get_event(event_id).await?;
        let (event, expect) = Self::stage_append(&current, participant)?;
        self.repo
            .commit(Transaction::new().put_event(event.clone(), expect))
            .await?;
        Ok(event)
    }
}
