//! Conversions between engine entities and wire objects.

use huddle_core::coordinator::UsageReport;
use huddle_core::entities::event::{Event, EventSpec, Location};
use huddle_core::entities::join_request::JoinRequest;
use huddle_core::entities::message::{Message, ReceiptedMessage};
use huddle_core::events::{RealtimeEvent, TypingUser};
use huddle_core::store::NearbyEvent;
use huddle_core::tier_gate::SubscriptionTier;
use huddle_sdk::objects::ws::{TypingUser as WireTypingUser, WsServerMessage};
use huddle_sdk::objects::{
    ActivityResponse, ApiErrorKind, CreateActivityRequest, DiscoveredActivity,
    JoinRequestResponse, LocationDto, MessageResponse, ParticipantDto, TierResponse,
    UsageResponse,
};
use time::OffsetDateTime;

use super::ApiError;

pub fn to_spec(request: CreateActivityRequest) -> Result<EventSpec, ApiError> {
    let starts_at = OffsetDateTime::from_unix_timestamp(request.starts_at)
        .map_err(|_| ApiError::bad_input(ApiErrorKind::InvalidSpec, "starts_at is out of range"))?;
    Ok(EventSpec {
        title: request.title,
        category: request.category,
        description: request.description,
        location: Location {
            name: request.location.name,
            lat: request.location.lat,
            lng: request.location.lng,
        },
        starts_at,
        max_participants: request.max_participants,
        radius_km: request.radius_km,
    })
}

pub fn activity(event: &Event) -> ActivityResponse {
    ActivityResponse {
        id: event.id,
        title: event.title.clone(),
        category: event.category.clone(),
        description: event.description.clone(),
        location: LocationDto {
            name: event.location.name.clone(),
            lat: event.location.lat,
            lng: event.location.lng,
        },
        starts_at: event.starts_at.unix_timestamp(),
        max_participants: event.max_participants,
        radius_km: event.radius_km,
        creator_id: event.creator_id.to_string(),
        creator_name: event.creator_name.to_string(),
        created_at: event.created_at.unix_timestamp(),
        participants: event
            .participants
            .iter()
            .map(|p| ParticipantDto {
                user_id: p.user_id.to_string(),
                name: p.name.to_string(),
                joined_at: p.joined_at.unix_timestamp(),
            })
            .collect(),
        participant_count: event.participant_count(),
    }
}

pub fn discovered(nearby: &NearbyEvent) -> DiscoveredActivity {
    DiscoveredActivity {
        activity: activity(&nearby.event),
        distance_km: nearby.distance_km,
    }
}

pub fn join_request(request: &JoinRequest) -> JoinRequestResponse {
    JoinRequestResponse {
        id: request.id,
        event_id: request.event_id,
        requester_id: request.requester_id.to_string(),
        requester_name: request.requester_name.to_string(),
        message: request.message.clone(),
        status: request.status.into(),
        created_at: request.created_at.unix_timestamp(),
    }
}

pub fn message(message: &Message) -> MessageResponse {
    MessageResponse {
        id: message.id,
        event_id: message.event_id,
        seq: message.seq,
        sender_id: message.sender_id.to_string(),
        sender_name: message.sender_name.to_string(),
        text: message.text.clone(),
        created_at: message.created_at.unix_timestamp(),
        read_by: Vec::new(),
    }
}

pub fn receipted(entry: &ReceiptedMessage) -> MessageResponse {
    MessageResponse {
        read_by: entry.read_by.iter().map(ToString::to_string).collect(),
        ..message(&entry.message)
    }
}

pub fn usage(report: &UsageReport) -> UsageResponse {
    UsageResponse {
        user_id: report.usage.user_id.to_string(),
        tier: report.usage.tier.into(),
        activities_created: report.usage.activities_created,
        activities_joined: report.usage.activities_joined,
        days_used: report.days_used,
        max_activities: report.limits.max_activities,
        max_radius_km: report.limits.max_radius_km,
    }
}

pub fn tier(tier: &SubscriptionTier) -> TierResponse {
    TierResponse {
        tier: tier.name.into(),
        max_activities: tier.max_activities,
        max_radius_km: tier.max_radius_km,
        monthly_price: tier.monthly_price,
    }
}

fn typing_user(user: &TypingUser) -> WireTypingUser {
    WireTypingUser {
        user_id: user.user_id.to_string(),
        name: user.name.to_string(),
    }
}

/// The frame pushed to a client for a realtime event. Internal events yield `None`.
pub fn server_frame(event: &RealtimeEvent) -> Option<WsServerMessage> {
    match event {
        RealtimeEvent::MessageCreated(created) => Some(WsServerMessage::NewMessage {
            message: message(created),
        }),
        RealtimeEvent::TypingChanged { event_id, typing } => {
            Some(WsServerMessage::TypingSetChanged {
                event_id: *event_id,
                typing: typing.iter().map(typing_user).collect(),
            })
        }
        RealtimeEvent::ReadReceipt {
            event_id,
            user_id,
            up_to_seq,
        } => Some(WsServerMessage::ReadReceipt {
            event_id: *event_id,
            user_id: user_id.to_string(),
            up_to_seq: *up_to_seq,
        }),
        RealtimeEvent::JoinRequestResolved(request) => Some(WsServerMessage::JoinRequestResolved {
            request: join_request(request),
        }),
        RealtimeEvent::MembershipGranted { .. } => None,
    }
}
