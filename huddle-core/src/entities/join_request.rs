use compact_str::CompactString;
use time::OffsetDateTime;
use uuid::Uuid;

use super::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub id: Uuid,
    pub event_id: Uuid,
    pub requester_id: UserId,
    pub requester_name: CompactString,
    pub message: String,
    pub status: JoinStatus,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn target(self) -> JoinStatus {
        match self {
            Decision::Accept => JoinStatus::Accepted,
            Decision::Reject => JoinStatus::Rejected,
        }
    }
}

/// Outcome of applying a decision to a request's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Pending request moves to the given terminal status.
    Apply(JoinStatus),
    /// The request already holds the status the decision asks for.
    AlreadyApplied,
}

impl JoinStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JoinStatus::Pending)
    }

    /// Terminal states never revert. Repeating the decision that produced the
    /// current state is accepted as a no-op; any other decision is refused with
    /// the current status.
    pub fn transition(self, decision: Decision) -> Result<Transition, JoinStatus> {
        let target = decision.target();
        match self {
            JoinStatus::Pending => Ok(Transition::Apply(target)),
            current if current == target => Ok(Transition::AlreadyApplied),
            current => Err(current),
        }
    }
}
