use compact_str::CompactString;
use uuid::Uuid;

use crate::entities::UserId;
use crate::entities::join_request::JoinRequest;
use crate::entities::message::Message;

/// Who an envelope is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every connected member of an event, optionally minus one user.
    Event {
        event_id: Uuid,
        except: Option<UserId>,
    },
    /// Every connection of one user.
    User(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUser {
    pub user_id: UserId,
    pub name: CompactString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    MessageCreated(Message),
    /// The full set of users currently typing in an event.
    TypingChanged {
        event_id: Uuid,
        typing: Vec<TypingUser>,
    },
    ReadReceipt {
        event_id: Uuid,
        user_id: UserId,
        up_to_seq: u64,
    },
    JoinRequestResolved(JoinRequest),
    /// The user became a member of an event (created it or was accepted).
    MembershipGranted { event_id: Uuid, user_id: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub audience: Audience,
    pub event: RealtimeEvent,
}

impl Envelope {
    pub fn to_event(event_id: Uuid, event: RealtimeEvent) -> Self {
        Self {
            audience: Audience::Event {
                event_id,
                except: None,
            },
            event,
        }
    }

    pub fn to_event_except(event_id: Uuid, except: UserId, event: RealtimeEvent) -> Self {
        Self {
            audience: Audience::Event {
                event_id,
                except: Some(except),
            },
            event,
        }
    }

    pub fn to_user(user_id: UserId, event: RealtimeEvent) -> Self {
        Self {
            audience: Audience::User(user_id),
            event,
        }
    }
}
