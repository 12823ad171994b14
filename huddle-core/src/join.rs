//! Join-Request Engine.
//!
//! Requests move `pending -> accepted | rejected` and never back. An accept
//! appends the requester to the roster, marks the request and bumps the
//! requester's join counter in one commit, all under the owning event's lock.

use std::sync::Arc;

use compact_str::CompactString;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::UserId;
use crate::entities::event::{Event, Participant, RosterError};
use crate::entities::join_request::{Decision, JoinRequest, JoinStatus, Transition};
use crate::store::{
    EntityLocks, EventStore, EventStoreError, Expect, LockKey, LockTimeout, Repository,
    RepositoryError, Transaction, load_usage,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JoinError {
    #[error("event {0} not found")]
    EventNotFound(Uuid),
    #[error("join request {0} not found")]
    RequestNotFound(Uuid),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("join request is already {current:?}")]
    InvalidState { current: JoinStatus },
    #[error("only the event creator may resolve its join requests")]
    Forbidden,
    #[error(transparent)]
    Busy(#[from] LockTimeout),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for JoinError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::VersionMismatch { .. } => {
                JoinError::Conflict("modified concurrently, retry")
            }
            other => JoinError::Repository(other),
        }
    }
}

impl From<EventStoreError> for JoinError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::NotFound(id) => JoinError::EventNotFound(id),
            EventStoreError::Roster(RosterError::Full) => {
                JoinError::Conflict("event is at capacity")
            }
            EventStoreError::Roster(RosterError::AlreadyPresent) => {
                JoinError::Conflict("already a participant")
            }
            EventStoreError::Repository(err) => err.into(),
            EventStoreError::InvalidSpec(reason) => JoinError::Conflict(reason),
        }
    }
}

/// Result of a resolve call.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub request: JoinRequest,
    /// `false` when the request already carried the requested decision.
    pub changed: bool,
    /// The event after the roster append, for accepts that changed something.
    pub event: Option<Event>,
}

#[derive(Clone)]
pub struct JoinRequestEngine {
    repo: Arc<dyn Repository>,
    events: EventStore,
    locks: Arc<EntityLocks>,
}

impl JoinRequestEngine {
    pub fn new(repo: Arc<dyn Repository>, locks: Arc<EntityLocks>) -> Self {
        Self {
            events: EventStore::new(repo.clone()),
            repo,
            locks,
        }
    }

    /// Files a pending request to join an event.
    pub async fn request(
        &self,
        event_id: Uuid,
        requester_id: UserId,
        requester_name: CompactString,
        message: String,
        now: OffsetDateTime,
    ) -> Result<JoinRequest, JoinError> {
        let _event_guard = self.locks.acquire(LockKey::Event(event_id)).await?;
        let event = self.events.get_event(event_id).await?.record;
        if event.is_member(&requester_id) {
            return Err(JoinError::Conflict("already a participant"));
        }
        if event.is_full() {
            return Err(JoinError::Conflict("event is at capacity"));
        }
        let existing = self.repo.join_requests_for_event(event_id).await?;
        if existing
            .iter()
            .any(|r| r.requester_id == requester_id && r.status == JoinStatus::Pending)
        {
            return Err(JoinError::Conflict("a pending request already exists"));
        }

        let requester_name = match requester_name.trim() {
            "" => requester_id.clone(),
            name => CompactString::from(name),
        };
        let request = JoinRequest {
            id: Uuid::now_v7(),
            event_id,
            requester_id,
            requester_name,
            message,
            status: JoinStatus::Pending,
            created_at: now,
        };
        self.repo
            .commit(Transaction::new().put_join_request(request.clone(), Expect::Absent))
            .await?;
        tracing::debug!(
            request_id = %request.id,
            event_id = %event_id,
            requester = %request.requester_id,
            "Join request filed"
        );
        Ok(request)
    }

    /// Accepts or rejects a request. `resolver`, when given, must be the event creator.
    pub async fn resolve(
        &self,
        request_id: Uuid,
        decision: Decision,
        resolver: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Resolution, JoinError> {
        let event_id = self
            .repo
            .join_request(request_id)
            .await?
            .ok_or(JoinError::RequestNotFound(request_id))?
            .record
            .event_id;
        let _event_guard = self.locks.acquire(LockKey::Event(event_id)).await?;

        // Re-read under the lock; the status may have moved while we waited.
        let stored = self
            .repo
            .join_request(request_id)
            .await?
            .ok_or(JoinError::RequestNotFound(request_id))?;
        let event = self.events.get_event(event_id).await?;
        if resolver.is_some_and(|resolver| event.record.creator_id != resolver) {
            return Err(JoinError::Forbidden);
        }

        let target = match stored.record.status.transition(decision) {
            Ok(Transition::Apply(target)) => target,
            Ok(Transition::AlreadyApplied) => {
                return Ok(Resolution {
                    request: stored.record,
                    changed: false,
                    event: None,
                });
            }
            Err(current) => return Err(JoinError::InvalidState { current }),
        };

        let mut request = stored.record.clone();
        request.status = target;
        let tx = Transaction::new().put_join_request(request.clone(), stored.expect());

        match target {
            JoinStatus::Accepted => {
                let _user_guard = self
                    .locks
                    .acquire(LockKey::User(request.requester_id.clone()))
                    .await?;
                let participant = Participant {
                    user_id: request.requester_id.clone(),
                    name: request.requester_name.clone(),
                    joined_at: now,
                };
                let (updated, expect) = EventStore::stage_append(&event, participant)?;
                let (mut usage, usage_expect) =
                    load_usage(self.repo.as_ref(), &request.requester_id, now).await?;
                usage.activities_joined = usage.activities_joined.saturating_add(1);
                self.repo
                    .commit(
                        tx.put_event(updated.clone(), expect)
                            .put_usage(usage, usage_expect),
                    )
                    .await?;
                tracing::info!(
                    request_id = %request.id,
                    event_id = %event_id,
                    participants = updated.participant_count(),
                    "Join request accepted"
                );
                Ok(Resolution {
                    request,
                    changed: true,
                    event: Some(updated),
                })
            }
            _ => {
                self.repo.commit(tx).await?;
                tracing::info!(request_id = %request.id, event_id = %event_id, "Join request rejected");
                Ok(Resolution {
                    request,
                    changed: true,
                    event: None,
                })
            }
        }
    }

    /// Pending requests of an event, oldest first.
    pub async fn list_pending(&self, event_id: Uuid) -> Result<Vec<JoinRequest>, JoinError> {
        self.events.get_event(event_id).await?;
        let requests = self.repo.join_requests_for_event(event_id).await?;
        Ok(requests
            .into_iter()
            .filter(|r| r.status == JoinStatus::Pending)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryRepository;
    use crate::store::event_store::tests::spec_at;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        engine: JoinRequestEngine,
        event: Event,
    }

    async fn fixture(max_participants: u32) -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let locks = Arc::new(EntityLocks::new(Duration::from_secs(2)));
        let engine = JoinRequestEngine::new(repo.clone(), locks);
        let event = EventStore::new(repo.clone())
            .create_event(
                spec_at(0.0, 0.0, max_participants),
                "alice".into(),
                "Alice".into(),
                OffsetDateTime::UNIX_EPOCH,
            )
            .await
            .unwrap();
        Fixture {
            repo,
            engine,
            event,
        }
    }

    async fn file(f: &Fixture, user: &str) -> Result<JoinRequest, JoinError> {
        f.engine
            .request(
                f.event.id,
                user.into(),
                user.into(),
                "hi".to_owned(),
                OffsetDateTime::now_utc(),
            )
            .await
    }

    async fn resolve(f: &Fixture, id: Uuid, decision: Decision) -> Result<Resolution, JoinError> {
        f.engine
            .resolve(id, decision, Some("alice"), OffsetDateTime::now_utc())
            .await
    }

    #[tokio::test]
    async fn test_duplicate_pending_request_conflicts() {
        let f = fixture(5).await;
        file(&f, "bob").await.unwrap();
        assert_eq!(
            file(&f, "bob").await,
            Err(JoinError::Conflict("a pending request already exists"))
        );
        let pending = f.engine.list_pending(f.event.id).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_creator_and_members_cannot_request() {
        let f = fixture(5).await;
        assert_eq!(
            file(&f, "alice").await,
            Err(JoinError::Conflict("already a participant"))
        );
        let request = file(&f, "bob").await.unwrap();
        resolve(&f, request.id, Decision::Accept).await.unwrap();
        assert_eq!(
            file(&f, "bob").await,
            Err(JoinError::Conflict("already a participant"))
        );
    }

    #[tokio::test]
    async fn test_request_to_full_event_conflicts() {
        let f = fixture(1).await;
        assert_eq!(
            file(&f, "bob").await,
            Err(JoinError::Conflict("event is at capacity"))
        );
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let f = fixture(3).await;
        let missing = Uuid::now_v7();
        let err = f
            .engine
            .request(missing, "bob".into(), "Bob".into(), String::new(), OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert_eq!(err, JoinError::EventNotFound(missing));
        assert_eq!(
            resolve(&f, missing, Decision::Accept).await,
            Err(JoinError::RequestNotFound(missing))
        );
    }

    #[tokio::test]
    async fn test_accept_appends_and_counts_join() {
        let f = fixture(3).await;
        let request = file(&f, "bob").await.unwrap();
        let resolution = resolve(&f, request.id, Decision::Accept).await.unwrap();
        assert!(resolution.changed);
        assert_eq!(resolution.request.status, JoinStatus::Accepted);
        let event = resolution.event.unwrap();
        assert_eq!(event.participant_count(), 2);
        assert!(event.is_member("bob"));

        let usage = f.repo.usage("bob").await.unwrap().unwrap();
        assert_eq!(usage.record.activities_joined, 1);
        assert!(f.engine.list_pending(f.event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent_for_same_decision() {
        let f = fixture(3).await;
        let request = file(&f, "bob").await.unwrap();
        resolve(&f, request.id, Decision::Accept).await.unwrap();
        let again = resolve(&f, request.id, Decision::Accept).await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.request.status, JoinStatus::Accepted);

        let event = f.repo.event(f.event.id).await.unwrap().unwrap().record;
        assert_eq!(event.participants.len(), 1);
        let usage = f.repo.usage("bob").await.unwrap().unwrap();
        assert_eq!(usage.record.activities_joined, 1);

        assert_eq!(
            resolve(&f, request.id, Decision::Reject).await,
            Err(JoinError::InvalidState {
                current: JoinStatus::Accepted
            })
        );
    }

    #[tokio::test]
    async fn test_reject_only_changes_status() {
        let f = fixture(3).await;
        let request = file(&f, "bob").await.unwrap();
        let resolution = resolve(&f, request.id, Decision::Reject).await.unwrap();
        assert_eq!(resolution.request.status, JoinStatus::Rejected);
        assert!(resolution.event.is_none());
        let event = f.repo.event(f.event.id).await.unwrap().unwrap().record;
        assert!(event.participants.is_empty());
        assert!(f.repo.usage("bob").await.unwrap().is_none());
        assert_eq!(
            resolve(&f, request.id, Decision::Accept).await,
            Err(JoinError::InvalidState {
                current: JoinStatus::Rejected
            })
        );
        // A rejected requester may ask again.
        file(&f, "bob").await.unwrap();
    }

    #[tokio::test]
    async fn test_only_creator_resolves() {
        let f = fixture(3).await;
        let request = file(&f, "bob").await.unwrap();
        let err = f
            .engine
            .resolve(request.id, Decision::Accept, Some("mallory"), OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert_eq!(err, JoinError::Forbidden);
        let stored = f.repo.join_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.record.status, JoinStatus::Pending);
    }

    #[tokio::test]
    async fn test_full_roster_leaves_request_pending() {
        let f = fixture(2).await;
        let bob = file(&f, "bob").await.unwrap();
        let carol = file(&f, "carol").await.unwrap();
        resolve(&f, bob.id, Decision::Accept).await.unwrap();
        assert_eq!(
            resolve(&f, carol.id, Decision::Accept).await,
            Err(JoinError::Conflict("event is at capacity"))
        );
        let stored = f.repo.join_request(carol.id).await.unwrap().unwrap();
        assert_eq!(stored.record.status, JoinStatus::Pending);
        assert!(f.repo.usage("carol").await.unwrap().is_none());
        // The creator can still reject it.
        resolve(&f, carol.id, Decision::Reject).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_never_overbook() {
        let f = fixture(2).await;
        let bob = file(&f, "bob").await.unwrap();
        let carol = file(&f, "carol").await.unwrap();

        let (a, b) = tokio::join!(
            {
                let engine = f.engine.clone();
                tokio::spawn(async move {
                    engine
                        .resolve(bob.id, Decision::Accept, None, OffsetDateTime::now_utc())
                        .await
                })
            },
            {
                let engine = f.engine.clone();
                tokio::spawn(async move {
                    engine
                        .resolve(carol.id, Decision::Accept, None, OffsetDateTime::now_utc())
                        .await
                })
            }
        );
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(JoinError::Conflict(_))))
        );
        let event = f.repo.event(f.event.id).await.unwrap().unwrap().record;
        assert_eq!(event.participant_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_leave_one_pending() {
        let f = Arc::new(fixture(5).await);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let f = f.clone();
            handles.push(tokio::spawn(async move { file(&f, "bob").await.is_ok() }));
        }
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(f.engine.list_pending(f.event.id).await.unwrap().len(), 1);
    }
}
