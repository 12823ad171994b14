//! Live connections.
//!
//! A connection authenticates with a credential, then follows every event its
//! user created or joined. Events joined while connected are picked up from
//! `MembershipGranted` envelopes. The credential is kept so the transport can
//! re-check it when it expires or the verifier's keys change.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::typing::TypingTracker;
use crate::entities::UserId;
use crate::events::{Audience, Broker, BrokerReceiver, Envelope, RealtimeEvent, TypingUser};
use crate::store::{Repository, RepositoryError};

/// Identity of one live connection. A user may hold several at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Outcome of a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub user_id: UserId,
    /// `None` if the credential does not lapse on its own.
    pub expires_at: Option<OffsetDateTime>,
}

impl VerifiedCredential {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, at: OffsetDateTime) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// Resolves a transport credential to a user.
#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `None` means the credential is not acceptable.
    async fn verify(&self, credential: &str) -> Option<VerifiedCredential>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// Not retried by clients; no further detail is exposed.
    #[error("authentication rejected")]
    AuthRejected,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone)]
pub struct ConnectionHub {
    repo: Arc<dyn Repository>,
    broker: Broker,
    typing: TypingTracker,
    verifier: Arc<dyn CredentialVerifier>,
}

impl ConnectionHub {
    pub fn new(
        repo: Arc<dyn Repository>,
        broker: Broker,
        typing: TypingTracker,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            repo,
            broker,
            typing,
            verifier,
        }
    }

    pub async fn open(&self, credential: &str) -> Result<ChatConnection, ConnectError> {
        let Some(verified) = self.verifier.verify(credential).await else {
            tracing::debug!("Realtime authentication rejected");
            return Err(ConnectError::AuthRejected);
        };
        // Subscribe before reading memberships so nothing published in between is lost.
        let rx = self.broker.subscribe();
        let subscriptions: HashSet<Uuid> = self
            .repo
            .events_joined_by(&verified.user_id)
            .await?
            .into_iter()
            .collect();
        let id = ConnectionId::new();
        tracing::debug!(
            user_id = %verified.user_id,
            connection = %id,
            events = subscriptions.len(),
            "Realtime connection opened"
        );
        Ok(ChatConnection {
            id,
            user_id: verified.user_id,
            credential: credential.to_owned(),
            expires_at: verified.expires_at,
            subscriptions,
            last_typing: HashMap::new(),
            rx,
            typing: self.typing.clone(),
            verifier: self.verifier.clone(),
        })
    }
}

pub struct ChatConnection {
    id: ConnectionId,
    user_id: UserId,
    credential: String,
    expires_at: Option<OffsetDateTime>,
    subscriptions: HashSet<Uuid>,
    /// Last typing set delivered per event, without this user.
    last_typing: HashMap<Uuid, Vec<TypingUser>>,
    rx: BrokerReceiver,
    typing: TypingTracker,
    verifier: Arc<dyn CredentialVerifier>,
}

impl ChatConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn subscriptions(&self) -> &HashSet<Uuid> {
        &self.subscriptions
    }

    pub fn is_subscribed(&self, event_id: Uuid) -> bool {
        self.subscriptions.contains(&event_id)
    }

    /// When the credential this connection opened with stops being valid.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.expires_at
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Checks the credential again, e.g. after the verifier's keys changed.
    ///
    /// Returns `false` if it no longer verifies or now names another user; the
    /// caller must then close the connection.
    pub async fn revalidate(&mut self) -> bool {
        match self.verifier.verify(&self.credential).await {
            Some(verified) if verified.user_id == self.user_id => {
                self.expires_at = verified.expires_at;
                true
            }
            _ => {
                tracing::debug!(
                    user_id = %self.user_id,
                    connection = %self.id,
                    "Realtime credential no longer valid"
                );
                false
            }
        }
    }

    /// Next event addressed to this connection. `None` once the broker is gone.
    pub async fn next(&mut self) -> Option<RealtimeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => {
                    if let Some(event) = self.accept(&envelope) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        skipped,
                        "Realtime connection lagged behind the broker"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn accept(&mut self, envelope: &Envelope) -> Option<RealtimeEvent> {
        match &envelope.audience {
            Audience::User(user_id) if *user_id == self.user_id => match &envelope.event {
                RealtimeEvent::MembershipGranted { event_id, .. } => {
                    self.subscriptions.insert(*event_id);
                    None
                }
                other => Some(other.clone()),
            },
            Audience::Event { event_id, except } if self.subscriptions.contains(event_id) => {
                if except.as_ref() == Some(&self.user_id) {
                    return None;
                }
                match &envelope.event {
                    RealtimeEvent::TypingChanged { event_id, typing } => {
                        let others: Vec<TypingUser> = typing
                            .iter()
                            .filter(|t| t.user_id != self.user_id)
                            .cloned()
                            .collect();
                        let previous = self.last_typing.get(event_id).map(Vec::as_slice);
                        if previous.unwrap_or_default() == others.as_slice() {
                            return None;
                        }
                        self.last_typing.insert(*event_id, others.clone());
                        Some(RealtimeEvent::TypingChanged {
                            event_id: *event_id,
                            typing: others,
                        })
                    }
                    other => Some(other.clone()),
                }
            }
            _ => None,
        }
    }

    /// Closes the connection and cancels the typing timers it owns.
    pub async fn close(self) {
        self.typing
            .clear_connection(self.id, self.subscriptions.iter().copied())
            .await;
        tracing::debug!(user_id = %self.user_id, connection = %self.id, "Realtime connection closed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::entities::event::Event;
    use crate::entities::message::Message;
    use crate::store::event_store::tests::spec_at;
    use crate::store::{EventStore, MemoryRepository};

    /// Accepts credentials of the form `ok:<user>` while `accepting` is set.
    struct PrefixVerifier {
        accepting: AtomicBool,
    }

    impl PrefixVerifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                accepting: AtomicBool::new(true),
            })
        }
    }

    #[async_trait::async_trait]
    impl CredentialVerifier for PrefixVerifier {
        async fn verify(&self, credential: &str) -> Option<VerifiedCredential> {
            if !self.accepting.load(Ordering::SeqCst) {
                return None;
            }
            let user = credential.strip_prefix("ok:")?;
            let verified = VerifiedCredential::new(UserId::from(user));
            Some(match user {
                "expiring" => verified.expiring_at(OffsetDateTime::UNIX_EPOCH),
                _ => verified,
            })
        }
    }

    struct Fixture {
        hub: ConnectionHub,
        verifier: Arc<PrefixVerifier>,
        broker: Broker,
        typing: TypingTracker,
        event: Event,
        other: Event,
    }

    async fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let store = EventStore::new(repo.clone());
        let now = OffsetDateTime::UNIX_EPOCH;
        let event = store
            .create_event(spec_at(0.0, 0.0, 5), "alice".into(), "Alice".into(), now)
            .await
            .unwrap();
        let other = store
            .create_event(spec_at(0.0, 0.0, 5), "dave".into(), "Dave".into(), now)
            .await
            .unwrap();
        let broker = Broker::new(64);
        let typing = TypingTracker::new(broker.clone(), Duration::from_secs(3));
        let verifier = PrefixVerifier::new();
        let hub = ConnectionHub::new(repo, broker.clone(), typing.clone(), verifier.clone());
        Fixture {
            hub,
            verifier,
            broker,
            typing,
            event,
            other,
        }
    }

    fn message(event_id: Uuid, seq: u64) -> Message {
        Message {
            id: Uuid::now_v7(),
            event_id,
            seq,
            sender_id: "alice".into(),
            sender_name: "Alice".into(),
            text: "hi".to_owned(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    async fn next_now(conn: &mut ChatConnection) -> Option<RealtimeEvent> {
        tokio::time::timeout(Duration::from_millis(50), conn.next())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_bad_credential_rejected() {
        let f = fixture().await;
        assert!(matches!(
            f.hub.open("nope").await,
            Err(ConnectError::AuthRejected)
        ));
        assert_eq!(f.broker.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribed_to_own_events_only() {
        let f = fixture().await;
        let mut conn = f.hub.open("ok:alice").await.unwrap();
        assert_eq!(conn.user_id().as_str(), "alice");
        assert!(conn.is_subscribed(f.event.id));
        assert!(!conn.is_subscribed(f.other.id));

        f.broker.publish(Envelope::to_event(
            f.other.id,
            RealtimeEvent::MessageCreated(message(f.other.id, 1)),
        ));
        let wanted = message(f.event.id, 1);
        f.broker.publish(Envelope::to_event(
            f.event.id,
            RealtimeEvent::MessageCreated(wanted.clone()),
        ));
        assert_eq!(
            next_now(&mut conn).await,
            Some(RealtimeEvent::MessageCreated(wanted))
        );
    }

    #[tokio::test]
    async fn test_membership_granted_extends_subscriptions() {
        let f = fixture().await;
        let mut conn = f.hub.open("ok:alice").await.unwrap();
        f.broker.publish(Envelope::to_user(
            "alice".into(),
            RealtimeEvent::MembershipGranted {
                event_id: f.other.id,
                user_id: "alice".into(),
            },
        ));
        let later = message(f.other.id, 1);
        f.broker.publish(Envelope::to_event(
            f.other.id,
            RealtimeEvent::MessageCreated(later.clone()),
        ));
        assert_eq!(
            next_now(&mut conn).await,
            Some(RealtimeEvent::MessageCreated(later))
        );
        assert!(conn.is_subscribed(f.other.id));
    }

    #[tokio::test]
    async fn test_excluded_recipient_skips_envelope() {
        let f = fixture().await;
        let mut conn = f.hub.open("ok:alice").await.unwrap();
        f.broker.publish(Envelope::to_event_except(
            f.event.id,
            "alice".into(),
            RealtimeEvent::ReadReceipt {
                event_id: f.event.id,
                user_id: "alice".into(),
                up_to_seq: 3,
            },
        ));
        assert_eq!(next_now(&mut conn).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_set_excludes_recipient() {
        let f = fixture().await;
        let mut conn = f.hub.open("ok:alice").await.unwrap();
        // Alice's own typing produces nothing for her.
        f.typing
            .start(f.event.id, "alice".into(), "Alice".into())
            .await;
        f.typing.start(f.event.id, "bob".into(), "Bob".into()).await;
        match next_now(&mut conn).await {
            Some(RealtimeEvent::TypingChanged { typing, .. }) => {
                assert_eq!(typing.len(), 1);
                assert_eq!(typing[0].user_id, "bob");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_typing_timers() {
        let f = fixture().await;
        let conn = f.hub.open("ok:alice").await.unwrap();
        f.typing
            .start_for(conn.id(), f.event.id, "alice".into(), "Alice".into())
            .await;
        conn.close().await;
        assert!(f.typing.typing_users(f.event.id).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_keeps_other_device_typing() {
        let f = fixture().await;
        let laptop = f.hub.open("ok:alice").await.unwrap();
        let phone = f.hub.open("ok:alice").await.unwrap();
        assert_ne!(laptop.id(), phone.id());
        f.typing
            .start_for(phone.id(), f.event.id, "alice".into(), "Alice".into())
            .await;
        let mut watcher = f.broker.subscribe();

        laptop.close().await;
        let typing = f.typing.typing_users(f.event.id).await;
        assert_eq!(typing.len(), 1);
        assert_eq!(typing[0].user_id, "alice");
        assert!(watcher.try_recv().is_err());

        phone.close().await;
        assert!(f.typing.typing_users(f.event.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_revalidate_follows_verifier() {
        let f = fixture().await;
        let mut conn = f.hub.open("ok:alice").await.unwrap();
        assert_eq!(conn.expires_at(), None);
        assert!(conn.revalidate().await);

        f.verifier.accepting.store(false, Ordering::SeqCst);
        assert!(!conn.revalidate().await);
    }

    #[tokio::test]
    async fn test_expiry_carried_from_credential() {
        let f = fixture().await;
        let conn = f.hub.open("ok:expiring").await.unwrap();
        assert_eq!(conn.expires_at(), Some(OffsetDateTime::UNIX_EPOCH));
        assert!(conn.is_expired(OffsetDateTime::now_utc()));

        let other = f.hub.open("ok:alice").await.unwrap();
        assert!(!other.is_expired(OffsetDateTime::now_utc()));
    }
}
