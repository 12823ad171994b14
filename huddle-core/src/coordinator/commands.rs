use compact_str::CompactString;
use huddle_sdk::objects::HistoryCursor;
use itertools::Itertools;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Coordinator, CoordinatorError, log_failure};
use crate::chat::{ConnectionId, HistoryPage};
use crate::entities::event::{Event, EventSpec};
use crate::entities::join_request::{Decision, JoinRequest, JoinStatus};
use crate::entities::message::Message;
use crate::entities::usage::UserUsage;
use crate::entities::{TierName, UserId};
use crate::events::{Envelope, RealtimeEvent};
use crate::store::{
    EventStore, Expect, LockKey, NearbyEvent, RadiusFilter, RepositoryError, Transaction,
    load_usage,
};
use crate::tier_gate::{
    SubscriptionTier, can_create_activity, is_radius_allowed, should_prompt_upgrade,
    should_show_daily_suggestions,
};

fn display_name(name: &str, user_id: &UserId) -> CompactString {
    match name.trim() {
        "" => user_id.clone(),
        name => CompactString::from(name),
    }
}

/// Create an activity on behalf of `user_id`, who becomes its creator.
#[derive(Debug, Clone)]
pub struct CreateActivity {
    pub spec: EventSpec,
    pub user_id: UserId,
    pub user_name: CompactString,
}

/// Discover activities around an origin, nearest first.
#[derive(Debug, Clone)]
pub struct ListActivities {
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub radius_km: f64,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy)]
pub struct GetActivity {
    pub event_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct RequestToJoin {
    pub event_id: Uuid,
    pub user_id: UserId,
    pub user_name: CompactString,
    pub message: String,
}

/// Accept or reject a join request. When `resolver` is set it must be the
/// event's creator.
#[derive(Debug, Clone)]
pub struct ResolveJoinRequest {
    pub request_id: Uuid,
    pub decision: Decision,
    pub resolver: Option<UserId>,
}

/// Pending requests of an event, oldest first. When `viewer` is set it must be
/// the event's creator.
#[derive(Debug, Clone)]
pub struct ListPendingRequests {
    pub event_id: Uuid,
    pub viewer: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct SendMessage {
    pub event_id: Uuid,
    pub user_id: UserId,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct FetchHistory {
    pub event_id: Uuid,
    pub viewer: Option<UserId>,
    pub cursor: HistoryCursor,
    pub page_size: u32,
}

#[derive(Debug, Clone)]
pub struct Typing {
    pub event_id: Uuid,
    pub user_id: UserId,
    pub is_typing: bool,
    /// Set when the signal arrives over a live connection.
    pub connection: Option<ConnectionId>,
}

#[derive(Debug, Clone)]
pub struct MarkRead {
    pub event_id: Uuid,
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct GetUsage {
    pub user_id: UserId,
}

/// Move a user to another tier. Counters are kept.
#[derive(Debug, Clone)]
pub struct UpgradeTier {
    pub user_id: UserId,
    pub tier: TierName,
}

#[derive(Debug, Clone)]
pub struct GetEngagementHints {
    pub user_id: UserId,
}

/// A usage record with the figures derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    pub usage: UserUsage,
    pub days_used: u32,
    pub limits: &'static SubscriptionTier,
}

impl UsageReport {
    fn new(usage: UserUsage, now: OffsetDateTime) -> Self {
        Self {
            days_used: usage.days_used(now),
            limits: usage.tier.limits(),
            usage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementHints {
    pub prompt_upgrade: bool,
    pub show_daily_suggestions: bool,
}

impl Coordinator {
    async fn create_activity(&self, cmd: CreateActivity) -> Result<Event, CoordinatorError> {
        let now = OffsetDateTime::now_utc();
        let creator_name = display_name(&cmd.user_name, &cmd.user_id);
        let event = EventStore::prepare_event(cmd.spec, cmd.user_id.clone(), creator_name, now)?;

        // Quota check and counter bump happen under the user's lock.
        let _guard = self.locks.acquire(LockKey::User(cmd.user_id.clone())).await?;
        let (mut usage, expect) = load_usage(self.repo.as_ref(), &cmd.user_id, now).await?;
        let limits = usage.tier.limits();
        if !can_create_activity(limits, usage.activities_created) {
            return Err(CoordinatorError::QuotaExceeded {
                tier: usage.tier,
                limit: limits.max_activities,
                current: usage.activities_created,
            });
        }
        if !is_radius_allowed(limits, event.radius_km) {
            return Err(CoordinatorError::RadiusNotAllowed {
                tier: usage.tier,
                max_radius_km: limits.max_radius_km,
                requested_km: event.radius_km,
            });
        }
        usage.activities_created = usage.activities_created.saturating_add(1);
        self.repo
            .commit(
                Transaction::new()
                    .put_event(event.clone(), Expect::Absent)
                    .put_usage(usage, expect),
            )
            .await?;

        self.broker.publish(Envelope::to_user(
            cmd.user_id.clone(),
            RealtimeEvent::MembershipGranted {
                event_id: event.id,
                user_id: cmd.user_id,
            },
        ));
        tracing::info!(event_id = %event.id, creator = %event.creator_id, "Activity created");
        Ok(event)
    }

    async fn list_activities(
        &self,
        cmd: ListActivities,
    ) -> Result<Vec<NearbyEvent>, CoordinatorError> {
        if !cmd.radius_km.is_finite() || cmd.radius_km < 0.0 {
            return Err(CoordinatorError::InvalidSpec(
                "radius must be a non-negative number".to_owned(),
            ));
        }
        if !(-90.0..=90.0).contains(&cmd.origin_lat) || !(-180.0..=180.0).contains(&cmd.origin_lng)
        {
            return Err(CoordinatorError::InvalidSpec(
                "origin coordinates are out of range".to_owned(),
            ));
        }
        let tier = self
            .repo
            .usage(&cmd.user_id)
            .await?
            .map_or(TierName::Free, |stored| stored.record.tier);
        let limits = tier.limits();
        if !is_radius_allowed(limits, cmd.radius_km) {
            return Err(CoordinatorError::RadiusNotAllowed {
                tier,
                max_radius_km: limits.max_radius_km,
                requested_km: cmd.radius_km,
            });
        }
        let found = self
            .events
            .list_events(RadiusFilter {
                origin_lat: cmd.origin_lat,
                origin_lng: cmd.origin_lng,
                radius_km: cmd.radius_km,
            })
            .await?;
        Ok(found
            .into_iter()
            .sorted_by(|a, b| {
                a.distance_km
                    .total_cmp(&b.distance_km)
                    .then_with(|| a.event.id.cmp(&b.event.id))
            })
            .collect())
    }

    async fn resolve_join_request(
        &self,
        cmd: ResolveJoinRequest,
    ) -> Result<JoinRequest, CoordinatorError> {
        let resolution = self
            .joins
            .resolve(
                cmd.request_id,
                cmd.decision,
                cmd.resolver.as_deref(),
                OffsetDateTime::now_utc(),
            )
            .await?;
        let request = resolution.request;
        if resolution.changed {
            if request.status == JoinStatus::Accepted {
                self.broker.publish(Envelope::to_user(
                    request.requester_id.clone(),
                    RealtimeEvent::MembershipGranted {
                        event_id: request.event_id,
                        user_id: request.requester_id.clone(),
                    },
                ));
            }
            self.broker.publish(Envelope::to_user(
                request.requester_id.clone(),
                RealtimeEvent::JoinRequestResolved(request.clone()),
            ));
        }
        Ok(request)
    }

    async fn list_pending_requests(
        &self,
        cmd: ListPendingRequests,
    ) -> Result<Vec<JoinRequest>, CoordinatorError> {
        if let Some(viewer) = &cmd.viewer {
            let event = self.events.get_event(cmd.event_id).await?.record;
            if event.creator_id != *viewer {
                return Err(CoordinatorError::Forbidden(
                    "only the creator sees pending requests".to_owned(),
                ));
            }
        }
        Ok(self.joins.list_pending(cmd.event_id).await?)
    }

    async fn get_usage(&self, user_id: &UserId) -> Result<UsageReport, CoordinatorError> {
        let now = OffsetDateTime::now_utc();
        let (usage, expect) = load_usage(self.repo.as_ref(), user_id, now).await?;
        if expect == Expect::Absent {
            // Persist on first sight so the account age starts counting now.
            let _guard = self.locks.acquire(LockKey::User(user_id.clone())).await?;
            match self
                .repo
                .commit(Transaction::new().put_usage(usage.clone(), Expect::Absent))
                .await
            {
                Ok(()) => {}
                // Someone else registered the user first; use their record.
                Err(RepositoryError::VersionMismatch { .. }) => {
                    let (usage, _) = load_usage(self.repo.as_ref(), user_id, now).await?;
                    return Ok(UsageReport::new(usage, now));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(UsageReport::new(usage, now))
    }

    async fn upgrade_tier(&self, cmd: UpgradeTier) -> Result<UsageReport, CoordinatorError> {
        let now = OffsetDateTime::now_utc();
        let _guard = self.locks.acquire(LockKey::User(cmd.user_id.clone())).await?;
        let (mut usage, expect) = load_usage(self.repo.as_ref(), &cmd.user_id, now).await?;
        let previous = usage.tier;
        usage.tier = cmd.tier;
        self.repo
            .commit(Transaction::new().put_usage(usage.clone(), expect))
            .await?;
        tracing::info!(user_id = %cmd.user_id, from = %previous, to = %cmd.tier, "Tier changed");
        Ok(UsageReport::new(usage, now))
    }
}

impl Processor<CreateActivity> for Coordinator {
    type Output = Event;
    type Error = CoordinatorError;
    #[tracing::instrument(skip_all, name = "Coordinator:CreateActivity", fields(user_id = %cmd.user_id))]
    async fn process(&self, cmd: CreateActivity) -> Result<Event, CoordinatorError> {
        self.create_activity(cmd)
            .await
            .inspect_err(|err| log_failure("CreateActivity", err))
    }
}

impl Processor<ListActivities> for Coordinator {
    type Output = Vec<NearbyEvent>;
    type Error = CoordinatorError;
    #[tracing::instrument(skip_all, name = "Coordinator:ListActivities", fields(user_id = %cmd.user_id))]
    async fn process(&self, cmd: ListActivities) -> Result<Vec<NearbyEvent>, CoordinatorError> {
        self.list_activities(cmd)
            .await
            .inspect_err(|err| log_failure("ListActivities", err))
    }
}

impl Processor<GetActivity> for Coordinator {
    type Output = Event;
    type Error = CoordinatorError;
    #[tracing::instrument(skip_all, name = "Coordinator:GetActivity", fields(event_id = %cmd.event_id))]
    async fn process(&self, cmd: GetActivity) -> Result<Event, CoordinatorError> {
        self.events
            .get_event(cmd.event_id)
            .await
            .map(|stored| stored.record)
            .map_err(CoordinatorError::from)
            .inspect_err(|err| log_failure("GetActivity", err))
    }
}

impl Processor<RequestToJoin> for Coordinator {
    type Output = JoinRequest;
    type Error = CoordinatorError;
    #[tracing::instrument(
        skip_all,
        name = "Coordinator:RequestToJoin",
        fields(event_id = %cmd.event_id, user_id = %cmd.user_id)
    )]
    async fn process(&self, cmd: RequestToJoin) -> Result<JoinRequest, CoordinatorError> {
        let name = display_name(&cmd.user_name, &cmd.user_id);
        self.joins
            .request(
                cmd.event_id,
                cmd.user_id,
                name,
                cmd.message,
                OffsetDateTime::now_utc(),
            )
            .await
            .map_err(CoordinatorError::from)
            .inspect_err(|err| log_failure("RequestToJoin", err))
    }
}

impl Processor<ResolveJoinRequest> for Coordinator {
    type Output = JoinRequest;
    type Error = CoordinatorError;
    #[tracing::instrument(
        skip_all,
        name = "Coordinator:ResolveJoinRequest",
        fields(request_id = %cmd.request_id, decision = ?cmd.decision)
    )]
    async fn process(&self, cmd: ResolveJoinRequest) -> Result<JoinRequest, CoordinatorError> {
        self.resolve_join_request(cmd)
            .await
            .inspect_err(|err| log_failure("ResolveJoinRequest", err))
    }
}

impl Processor<ListPendingRequests> for Coordinator {
    type Output = Vec<JoinRequest>;
    type Error = CoordinatorError;
    #[tracing::instrument(skip_all, name = "Coordinator:ListPendingRequests", fields(event_id = %cmd.event_id))]
    async fn process(
        &self,
        cmd: ListPendingRequests,
    ) -> Result<Vec<JoinRequest>, CoordinatorError> {
        self.list_pending_requests(cmd)
            .await
            .inspect_err(|err| log_failure("ListPendingRequests", err))
    }
}

impl Processor<SendMessage> for Coordinator {
    type Output = Message;
    type Error = CoordinatorError;
    #[tracing::instrument(
        skip_all,
        name = "Coordinator:SendMessage",
        fields(event_id = %cmd.event_id, user_id = %cmd.user_id)
    )]
    async fn process(&self, cmd: SendMessage) -> Result<Message, CoordinatorError> {
        self.chat
            .post_message(
                cmd.event_id,
                &cmd.user_id,
                &cmd.text,
                OffsetDateTime::now_utc(),
            )
            .await
            .map_err(CoordinatorError::from)
            .inspect_err(|err| log_failure("SendMessage", err))
    }
}

impl Processor<FetchHistory> for Coordinator {
    type Output = HistoryPage;
    type Error = CoordinatorError;
    #[tracing::instrument(skip_all, name = "Coordinator:FetchHistory", fields(event_id = %cmd.event_id))]
    async fn process(&self, cmd: FetchHistory) -> Result<HistoryPage, CoordinatorError> {
        self.chat
            .history(
                cmd.event_id,
                cmd.viewer.as_deref(),
                cmd.cursor,
                cmd.page_size,
            )
            .await
            .map_err(CoordinatorError::from)
            .inspect_err(|err| log_failure("FetchHistory", err))
    }
}

impl Processor<Typing> for Coordinator {
    type Output = ();
    type Error = CoordinatorError;
    #[tracing::instrument(
        skip_all,
        name = "Coordinator:Typing",
        fields(event_id = %cmd.event_id, user_id = %cmd.user_id)
    )]
    async fn process(&self, cmd: Typing) -> Result<(), CoordinatorError> {
        self.chat
            .typing(cmd.event_id, &cmd.user_id, cmd.is_typing, cmd.connection)
            .await
            .map_err(CoordinatorError::from)
            .inspect_err(|err| log_failure("Typing", err))
    }
}

impl Processor<MarkRead> for Coordinator {
    type Output = ();
    type Error = CoordinatorError;
    #[tracing::instrument(
        skip_all,
        name = "Coordinator:MarkRead",
        fields(event_id = %cmd.event_id, user_id = %cmd.user_id)
    )]
    async fn process(&self, cmd: MarkRead) -> Result<(), CoordinatorError> {
        self.chat
            .mark_read(cmd.event_id, &cmd.user_id)
            .await
            .map(|_| ())
            .map_err(CoordinatorError::from)
            .inspect_err(|err| log_failure("MarkRead", err))
    }
}

impl Processor<GetUsage> for Coordinator {
    type Output = UsageReport;
    type Error = CoordinatorError;
    #[tracing::instrument(skip_all, name = "Coordinator:GetUsage", fields(user_id = %cmd.user_id))]
    async fn process(&self, cmd: GetUsage) -> Result<UsageReport, CoordinatorError> {
        self.get_usage(&cmd.user_id)
            .await
            .inspect_err(|err| log_failure("GetUsage", err))
    }
}

impl Processor<UpgradeTier> for Coordinator {
    type Output = UsageReport;
    type Error = CoordinatorError;
    #[tracing::instrument(skip_all, name = "Coordinator:UpgradeTier", fields(user_id = %cmd.user_id))]
    async fn process(&self, cmd: UpgradeTier) -> Result<UsageReport, CoordinatorError> {
        self.upgrade_tier(cmd)
            .await
            .inspect_err(|err| log_failure("UpgradeTier", err))
    }
}

impl Processor<GetEngagementHints> for Coordinator {
    type Output = EngagementHints;
    type Error = CoordinatorError;
    #[tracing::instrument(skip_all, name = "Coordinator:GetEngagementHints", fields(user_id = %cmd.user_id))]
    async fn process(&self, cmd: GetEngagementHints) -> Result<EngagementHints, CoordinatorError> {
        let report = self
            .get_usage(&cmd.user_id)
            .await
            .inspect_err(|err| log_failure("GetEngagementHints", err))?;
        Ok(EngagementHints {
            prompt_upgrade: should_prompt_upgrade(report.days_used, report.usage.tier),
            show_daily_suggestions: should_show_daily_suggestions(report.days_used),
        })
    }
}
