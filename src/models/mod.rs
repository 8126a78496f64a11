use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential poll identifier, starting at 0.
pub type PollId = u64;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Opaque account identity handed to the ledger by its environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub id: PollId,
    pub creator: AccountId,
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub vote_counts: Vec<u64>,
    /// Voting window in seconds.
    pub duration: i64,
    pub created_at: Timestamp,
    pub end_time: Timestamp,
    /// Set only by an explicit close; time-based closing is derived.
    pub is_closed: bool,
}

impl Poll {
    /// Callers validate the arguments first; `end_time` must fit in a `Timestamp`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PollId,
        creator: AccountId,
        title: String,
        description: String,
        options: Vec<String>,
        duration: i64,
        end_time: Timestamp,
        now: Timestamp,
    ) -> Self {
        let vote_counts = vec![0; options.len()];

        Self {
            id,
            creator,
            title,
            description,
            options,
            vote_counts,
            duration,
            created_at: now,
            end_time,
            is_closed: false,
        }
    }

    pub fn is_closed_at(&self, now: Timestamp) -> bool {
        self.is_closed || now >= self.end_time
    }

    pub fn option_label(&self, option_index: usize) -> Option<&str> {
        self.options.get(option_index).map(String::as_str)
    }

    pub fn snapshot(&self, now: Timestamp) -> PollSnapshot {
        PollSnapshot {
            id: self.id,
            creator: self.creator.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            options: self.options.clone(),
            vote_counts: self.vote_counts.clone(),
            duration: self.duration,
            end_time: self.end_time,
            ends_at: DateTime::from_timestamp(self.end_time, 0),
            is_closed: self.is_closed_at(now),
        }
    }
}

/// Read-only view of a poll, with closed status evaluated at the time of the read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub id: PollId,
    pub creator: AccountId,
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub vote_counts: Vec<u64>,
    pub duration: i64,
    pub end_time: Timestamp,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: AccountId,
    pub poll_id: PollId,
    pub option_index: usize,
    pub cast_at: Timestamp,
}

/// An account's votes in the order they were cast, with option labels resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingHistory {
    pub poll_ids: Vec<PollId>,
    pub options: Vec<String>,
}

impl VotingHistory {
    pub fn is_empty(&self) -> bool {
        self.poll_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.poll_ids.len()
    }
}

/// Poll fields as supplied by a caller of `create_poll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPoll {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub duration: i64,
}

impl NewPoll {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        options: Vec<String>,
        duration: i64,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            options,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll() -> Poll {
        Poll::new(
            0,
            AccountId::from("admin"),
            "Lunch".to_string(),
            "Where to eat".to_string(),
            vec!["Pizza".to_string(), "Sushi".to_string()],
            60,
            1_060,
            1_000,
        )
    }

    #[test]
    fn new_poll_starts_open_with_zeroed_counts() {
        let poll = poll();
        assert_eq!(poll.vote_counts, vec![0, 0]);
        assert!(!poll.is_closed);
        assert!(!poll.is_closed_at(1_059));
    }

    #[test]
    fn closed_status_is_derived_from_end_time() {
        let poll = poll();
        assert!(poll.is_closed_at(1_060));
        assert!(poll.snapshot(2_000).is_closed);
        assert!(!poll.is_closed);
    }

    #[test]
    fn explicit_close_wins_before_end_time() {
        let mut poll = poll();
        poll.is_closed = true;
        assert!(poll.is_closed_at(1_000));
    }

    #[test]
    fn snapshot_carries_end_time_as_datetime() {
        let snapshot = poll().snapshot(1_000);
        assert_eq!(snapshot.ends_at.map(|dt| dt.timestamp()), Some(1_060));
        assert_eq!(snapshot.options, vec!["Pizza", "Sushi"]);
    }

    #[test]
    fn option_label_out_of_range_is_none() {
        let poll = poll();
        assert_eq!(poll.option_label(1), Some("Sushi"));
        assert_eq!(poll.option_label(2), None);
    }
}
