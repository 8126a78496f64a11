//! The poll state machine.
//!
//! `PollRegistry` owns every poll and vote record. Mutations come in two halves: a
//! `check_*`/`prepare_*` step that validates against current state without touching it, and an
//! apply step. The plain `create_poll`/`vote`/`close_poll` methods run both halves back to back;
//! the `Ledger` service runs them separately so it can persist in between.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    AccountId, NewPoll, Poll, PollId, PollSnapshot, Timestamp, VoteRecord, VotingHistory,
};
use log::debug;
use std::collections::{HashMap, HashSet};

pub const MIN_OPTIONS: usize = 2;

/// One account's votes: ordered log plus a membership index.
#[derive(Debug, Default, Clone)]
struct AccountVotes {
    records: Vec<VoteRecord>,
    polls: HashSet<PollId>,
}

#[derive(Debug, Default, Clone)]
pub struct PollRegistry {
    polls: Vec<Poll>,
    votes_by_account: HashMap<AccountId, AccountVotes>,
    next_poll_id: PollId,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted polls (in id order) and votes (in cast order).
    ///
    /// Tallies are recomputed from the vote records rather than trusted from storage.
    pub fn restore(polls: Vec<Poll>, votes: Vec<VoteRecord>) -> LedgerResult<Self> {
        let mut registry = Self::new();

        for mut poll in polls {
            if poll.id != registry.next_poll_id {
                return Err(LedgerError::CorruptState(format!(
                    "expected poll {} but found poll {}",
                    registry.next_poll_id, poll.id
                )));
            }
            poll.vote_counts = vec![0; poll.options.len()];
            registry.polls.push(poll);
            registry.next_poll_id += 1;
        }

        for record in votes {
            let Some(poll) = registry.poll(record.poll_id) else {
                return Err(LedgerError::CorruptState(format!(
                    "vote by {} references missing poll {}",
                    record.voter, record.poll_id
                )));
            };
            if record.option_index >= poll.options.len() {
                return Err(LedgerError::CorruptState(format!(
                    "vote by {} references missing option {} on poll {}",
                    record.voter, record.option_index, record.poll_id
                )));
            }
            if registry.has_voted(&record.voter, record.poll_id) {
                return Err(LedgerError::CorruptState(format!(
                    "{} has more than one vote on poll {}",
                    record.voter, record.poll_id
                )));
            }
            registry.record_vote(record);
        }

        debug!(
            "Restored {} poll(s) and {} voter(s)",
            registry.polls.len(),
            registry.votes_by_account.len()
        );
        Ok(registry)
    }

    pub fn poll_count(&self) -> PollId {
        self.next_poll_id
    }

    fn poll(&self, poll_id: PollId) -> Option<&Poll> {
        usize::try_from(poll_id)
            .ok()
            .and_then(|index| self.polls.get(index))
    }

    fn poll_mut(&mut self, poll_id: PollId) -> Option<&mut Poll> {
        usize::try_from(poll_id)
            .ok()
            .and_then(|index| self.polls.get_mut(index))
    }

    /// Validates a creation request and builds the poll it would append. No state changes.
    pub fn prepare_poll(
        &self,
        creator: &AccountId,
        new_poll: NewPoll,
        now: Timestamp,
    ) -> LedgerResult<Poll> {
        let NewPoll {
            title,
            description,
            options,
            duration,
        } = new_poll;

        if options.len() < MIN_OPTIONS {
            return Err(LedgerError::InvalidOptions);
        }
        if duration <= 0 {
            return Err(LedgerError::InvalidDuration);
        }
        let end_time = now
            .checked_add(duration)
            .ok_or(LedgerError::InvalidDuration)?;
        if title.trim().is_empty() {
            return Err(LedgerError::MissingText("title"));
        }
        if description.trim().is_empty() {
            return Err(LedgerError::MissingText("description"));
        }

        Ok(Poll::new(
            self.next_poll_id,
            creator.clone(),
            title,
            description,
            options,
            duration,
            end_time,
            now,
        ))
    }

    /// Appends a poll produced by `prepare_poll` against the current state.
    pub(crate) fn insert_poll(&mut self, poll: Poll) -> PollId {
        debug_assert_eq!(poll.id, self.next_poll_id);
        let poll_id = self.next_poll_id;
        self.polls.push(Poll { id: poll_id, ..poll });
        self.next_poll_id += 1;
        poll_id
    }

    pub fn create_poll(
        &mut self,
        creator: &AccountId,
        new_poll: NewPoll,
        now: Timestamp,
    ) -> LedgerResult<PollId> {
        let poll = self.prepare_poll(creator, new_poll, now)?;
        Ok(self.insert_poll(poll))
    }

    /// Runs the vote admission checks in order; the first failure wins.
    pub fn check_vote(
        &self,
        voter: &AccountId,
        poll_id: PollId,
        option_index: usize,
        now: Timestamp,
    ) -> LedgerResult<VoteRecord> {
        let poll = self
            .poll(poll_id)
            .ok_or(LedgerError::PollNotFound(poll_id))?;

        if poll.is_closed_at(now) {
            return Err(LedgerError::PollClosed(poll_id));
        }
        if option_index >= poll.options.len() {
            return Err(LedgerError::InvalidOption {
                poll_id,
                option_index,
            });
        }
        if self.has_voted(voter, poll_id) {
            return Err(LedgerError::AlreadyVoted {
                poll_id,
                voter: voter.clone(),
            });
        }

        Ok(VoteRecord {
            voter: voter.clone(),
            poll_id,
            option_index,
            cast_at: now,
        })
    }

    /// Applies a record that passed `check_vote` against the current state.
    pub(crate) fn record_vote(&mut self, record: VoteRecord) {
        let Some(count) = self
            .poll_mut(record.poll_id)
            .and_then(|poll| poll.vote_counts.get_mut(record.option_index))
        else {
            return;
        };
        *count += 1;

        let votes = self
            .votes_by_account
            .entry(record.voter.clone())
            .or_default();
        votes.polls.insert(record.poll_id);
        votes.records.push(record);
    }

    pub fn vote(
        &mut self,
        voter: &AccountId,
        poll_id: PollId,
        option_index: usize,
        now: Timestamp,
    ) -> LedgerResult<()> {
        let record = self.check_vote(voter, poll_id, option_index, now)?;
        self.record_vote(record);
        Ok(())
    }

    pub fn check_close(
        &self,
        caller: &AccountId,
        poll_id: PollId,
        now: Timestamp,
    ) -> LedgerResult<()> {
        let poll = self
            .poll(poll_id)
            .ok_or(LedgerError::PollNotFound(poll_id))?;

        if &poll.creator != caller {
            return Err(LedgerError::NotPollCreator(poll_id));
        }
        if poll.is_closed_at(now) {
            return Err(LedgerError::PollClosed(poll_id));
        }
        Ok(())
    }

    pub(crate) fn mark_closed(&mut self, poll_id: PollId) {
        if let Some(poll) = self.poll_mut(poll_id) {
            poll.is_closed = true;
        }
    }

    pub fn close_poll(
        &mut self,
        caller: &AccountId,
        poll_id: PollId,
        now: Timestamp,
    ) -> LedgerResult<()> {
        self.check_close(caller, poll_id, now)?;
        self.mark_closed(poll_id);
        Ok(())
    }

    pub fn get_poll(&self, poll_id: PollId, now: Timestamp) -> LedgerResult<PollSnapshot> {
        self.poll(poll_id)
            .map(|poll| poll.snapshot(now))
            .ok_or(LedgerError::PollNotFound(poll_id))
    }

    pub fn list_polls(&self, now: Timestamp) -> Vec<PollSnapshot> {
        self.polls.iter().map(|poll| poll.snapshot(now)).collect()
    }

    pub fn has_voted(&self, account: &AccountId, poll_id: PollId) -> bool {
        self.votes_by_account
            .get(account)
            .is_some_and(|votes| votes.polls.contains(&poll_id))
    }

    pub fn voting_history(&self, account: &AccountId) -> VotingHistory {
        let Some(votes) = self.votes_by_account.get(account) else {
            return VotingHistory::default();
        };

        let mut history = VotingHistory::default();
        for record in &votes.records {
            let label = self
                .poll(record.poll_id)
                .and_then(|poll| poll.option_label(record.option_index))
                .unwrap_or_default();
            history.poll_ids.push(record.poll_id);
            history.options.push(label.to_string());
        }
        history
    }
}
