use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Expect, MessageQuery, Repository, RepositoryError, Transaction, Versioned, Write};
use crate::entities::UserId;
use crate::entities::event::Event;
use crate::entities::join_request::JoinRequest;
use crate::entities::message::Message;
use crate::entities::usage::UserUsage;

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<Uuid, Versioned<Event>>,
    join_requests: HashMap<Uuid, Versioned<JoinRequest>>,
    messages: HashMap<Uuid, BTreeMap<u64, Message>>,
    read_cursors: HashMap<Uuid, HashMap<UserId, u64>>,
    usage: HashMap<UserId, Versioned<UserUsage>>,
}

/// In-process [`Repository`]. Each instance is independent.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn satisfies<T>(current: Option<&Versioned<T>>, expect: Expect) -> bool {
    match (current, expect) {
        (None, Expect::Absent) => true,
        (Some(stored), Expect::Version(version)) => stored.version == version,
        _ => false,
    }
}

fn next_version<T>(current: Option<&Versioned<T>>) -> u64 {
    current.map_or(1, |stored| stored.version + 1)
}

fn mismatch(entity: &'static str, id: impl ToString) -> RepositoryError {
    RepositoryError::VersionMismatch {
        entity,
        id: id.to_string(),
    }
}

impl Tables {
    fn head(&self, event_id: Uuid) -> u64 {
        self.messages
            .get(&event_id)
            .and_then(|log| log.keys().next_back().copied())
            .unwrap_or(0)
    }

    /// Checks every expectation of the batch before anything is written.
    fn validate(&self, writes: &[Write]) -> Result<(), RepositoryError> {
        let mut heads: HashMap<Uuid, u64> = HashMap::new();
        let mut touched: Vec<(&'static str, String)> = Vec::new();
        let mut claim = |entity: &'static str, id: String| {
            if touched.iter().any(|(e, i)| *e == entity && *i == id) {
                return Err(mismatch(entity, id));
            }
            touched.push((entity, id));
            Ok(())
        };
        for write in writes {
            match write {
                Write::Event { record, expect } => {
                    claim("event", record.id.to_string())?;
                    if !satisfies(self.events.get(&record.id), *expect) {
                        return Err(mismatch("event", record.id));
                    }
                }
                Write::JoinRequest { record, expect } => {
                    claim("join request", record.id.to_string())?;
                    if !satisfies(self.join_requests.get(&record.id), *expect) {
                        return Err(mismatch("join request", record.id));
                    }
                }
                Write::Usage { record, expect } => {
                    claim("usage", record.user_id.to_string())?;
                    if !satisfies(self.usage.get(&record.user_id), *expect) {
                        return Err(mismatch("usage", &record.user_id));
                    }
                }
                Write::Message { record } => {
                    let head = heads
                        .entry(record.event_id)
                        .or_insert_with(|| self.head(record.event_id));
                    if record.seq != *head + 1 {
                        return Err(mismatch("message", record.id));
                    }
                    *head = record.seq;
                }
                Write::ReadCursor { .. } => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, write: Write) {
        match write {
            Write::Event { record, .. } => {
                let version = next_version(self.events.get(&record.id));
                self.events
                    .insert(record.id, Versioned { record, version });
            }
            Write::JoinRequest { record, .. } => {
                let version = next_version(self.join_requests.get(&record.id));
                self.join_requests
                    .insert(record.id, Versioned { record, version });
            }
            Write::Usage { record, .. } => {
                let version = next_version(self.usage.get(&record.user_id));
                self.usage
                    .insert(record.user_id.clone(), Versioned { record, version });
            }
            Write::Message { record } => {
                self.messages
                    .entry(record.event_id)
                    .or_default()
                    .insert(record.seq, record);
            }
            Write::ReadCursor {
                event_id,
                user_id,
                seq,
            } => {
                let cursor = self
                    .read_cursors
                    .entry(event_id)
                    .or_default()
                    .entry(user_id)
                    .or_insert(0);
                *cursor = (*cursor).max(seq);
            }
        }
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    async fn event(&self, id: Uuid) -> Result<Option<Versioned<Event>>, RepositoryError> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn events(&self) -> Result<Vec<Event>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.events.values().map(|v| v.record.clone()).collect())
    }

    async fn events_joined_by(&self, user_id: &str) -> Result<Vec<Uuid>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .values()
            .filter(|v| v.record.is_member(user_id))
            .map(|v| v.record.id)
            .collect())
    }

    async fn join_request(
        &self,
        id: Uuid,
    ) -> Result<Option<Versioned<JoinRequest>>, RepositoryError> {
        Ok(self.tables.read().await.join_requests.get(&id).cloned())
    }

    async fn join_requests_for_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<JoinRequest>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut requests: Vec<JoinRequest> = tables
            .join_requests
            .values()
            .filter(|v| v.record.event_id == event_id)
            .map(|v| v.record.clone())
            .collect();
        requests.sort_by_key(|r| (r.created_at, r.id));
        Ok(requests)
    }

    async fn messages(&self, query: MessageQuery) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        let Some(log) = tables.messages.get(&query.event_id) else {
            return Ok(Vec::new());
        };
        let lower = query.after.map_or(0, |seq| seq.saturating_add(1));
        let upper = query.before.unwrap_or(u64::MAX);
        if lower >= upper {
            return Ok(Vec::new());
        }
        let range = log.range(lower..upper).map(|(_, m)| m.clone());
        let mut page: Vec<Message> = if query.from_newest {
            range.rev().take(query.limit).collect()
        } else {
            range.take(query.limit).collect()
        };
        if query.from_newest {
            page.reverse();
        }
        Ok(page)
    }

    async fn message_head(&self, event_id: Uuid) -> Result<u64, RepositoryError> {
        Ok(self.tables.read().await.head(event_id))
    }

    async fn read_cursors(&self, event_id: Uuid) -> Result<HashMap<UserId, u64>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .read_cursors
            .get(&event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn usage(&self, user_id: &str) -> Result<Option<Versioned<UserUsage>>, RepositoryError> {
        Ok(self.tables.read().await.usage.get(user_id).cloned())
    }

    async fn commit(&self, tx: Transaction) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.validate(tx.writes())?;
        for write in tx.into_writes() {
            tables.apply(write);
        }
        Ok(())
    }
}
