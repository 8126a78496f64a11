//! Atomic, persistent front for the poll registry.
//!
//! Every mutation holds the registry lock across validation, persistence and apply, so no
//! caller can observe or interleave with a half-applied operation.

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, CreatePolicy};
use crate::db::{LedgerStore, MemoryStore, SqliteStore};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBus, LedgerEvent};
use crate::models::{AccountId, NewPoll, PollId, PollSnapshot, VotingHistory};
use crate::registry::PollRegistry;
use crate::voting::{PollResults, plurality};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

pub struct Ledger {
    registry: Mutex<PollRegistry>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn LedgerStore>,
    events: EventBus,
    create_policy: CreatePolicy,
}

impl Ledger {
    /// Ledger with no durable storage and open poll creation.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Mutex::new(PollRegistry::new()),
            clock,
            store: Arc::new(MemoryStore),
            events: EventBus::default(),
            create_policy: CreatePolicy::Open,
        }
    }

    /// Rebuilds the ledger from whatever the store holds.
    pub async fn open(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        create_policy: CreatePolicy,
    ) -> LedgerResult<Self> {
        let stored = store.load().await?;
        let registry = PollRegistry::restore(stored.polls, stored.votes)?;
        info!("Ledger opened with {} poll(s)", registry.poll_count());

        Ok(Self {
            registry: Mutex::new(registry),
            clock,
            store,
            events,
            create_policy,
        })
    }

    pub async fn from_config(config: &Config) -> LedgerResult<Self> {
        let store: Arc<dyn LedgerStore> = match &config.database_url {
            Some(url) => Arc::new(SqliteStore::connect(url, config.max_connections).await?),
            None => {
                warn!("DATABASE_URL not set, ledger state will not survive a restart");
                Arc::new(MemoryStore)
            }
        };

        Self::open(
            store,
            Arc::new(SystemClock),
            EventBus::new(config.event_capacity),
            config.create_policy.clone(),
        )
        .await
    }

    pub fn with_create_policy(mut self, create_policy: CreatePolicy) -> Self {
        self.create_policy = create_policy;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    pub async fn create_poll(&self, caller: &AccountId, new_poll: NewPoll) -> LedgerResult<PollId> {
        if !self.create_policy.allows(caller) {
            warn!("{} tried to create a poll without permission", caller);
            return Err(LedgerError::Unauthorized(caller.clone()));
        }

        let mut registry = self.registry.lock().await;
        let poll = registry
            .prepare_poll(caller, new_poll, self.clock.now())
            .inspect_err(|e| debug!("Rejected poll from {}: {}", caller, e))?;

        self.store.insert_poll(&poll).await?;

        let event = LedgerEvent::PollCreated {
            poll_id: poll.id,
            title: poll.title.clone(),
            duration: poll.duration,
        };
        let poll_id = registry.insert_poll(poll);
        self.events.emit(event);

        Ok(poll_id)
    }

    pub async fn vote(
        &self,
        caller: &AccountId,
        poll_id: PollId,
        option_index: usize,
    ) -> LedgerResult<()> {
        let mut registry = self.registry.lock().await;
        let record = registry
            .check_vote(caller, poll_id, option_index, self.clock.now())
            .inspect_err(|e| debug!("Rejected vote from {}: {}", caller, e))?;

        self.store.insert_vote(&record).await?;
        registry.record_vote(record);

        self.events.emit(LedgerEvent::Voted {
            poll_id,
            voter: caller.clone(),
            option_index,
        });
        Ok(())
    }

    pub async fn close_poll(&self, caller: &AccountId, poll_id: PollId) -> LedgerResult<()> {
        let mut registry = self.registry.lock().await;
        registry
            .check_close(caller, poll_id, self.clock.now())
            .inspect_err(|e| debug!("Rejected close from {}: {}", caller, e))?;

        self.store.close_poll(poll_id).await?;
        registry.mark_closed(poll_id);

        self.events.emit(LedgerEvent::PollClosed { poll_id });
        Ok(())
    }

    pub async fn get_poll(&self, poll_id: PollId) -> LedgerResult<PollSnapshot> {
        self.registry.lock().await.get_poll(poll_id, self.clock.now())
    }

    pub async fn list_polls(&self) -> Vec<PollSnapshot> {
        self.registry.lock().await.list_polls(self.clock.now())
    }

    pub async fn poll_count(&self) -> PollId {
        self.registry.lock().await.poll_count()
    }

    pub async fn get_user_voting_history(&self, account: &AccountId) -> VotingHistory {
        self.registry.lock().await.voting_history(account)
    }

    pub async fn results(&self, poll_id: PollId) -> LedgerResult<PollResults> {
        let poll = self.get_poll(poll_id).await?;
        Ok(plurality::calculate_results(&poll))
    }
}
