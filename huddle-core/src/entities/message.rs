use compact_str::CompactString;
use time::OffsetDateTime;
use uuid::Uuid;

use super::UserId;

/// An immutable chat message. `seq` is the per-event total order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub event_id: Uuid,
    pub seq: u64,
    pub sender_id: UserId,
    pub sender_name: CompactString,
    pub text: String,
    pub created_at: OffsetDateTime,
}

/// A message together with the users who have read it.
///
/// Read state is kept as per-user watermarks, so the message itself never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptedMessage {
    pub message: Message,
    pub read_by: Vec<UserId>,
}
