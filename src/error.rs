use crate::models::{AccountId, PollId};
use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("a poll needs at least two options")]
    InvalidOptions,
    #[error("poll duration must be positive")]
    InvalidDuration,
    #[error("poll {0} must not be empty")]
    MissingText(&'static str),
    #[error("poll {0} not found")]
    PollNotFound(PollId),
    #[error("poll {0} is closed")]
    PollClosed(PollId),
    #[error("option {option_index} does not exist on poll {poll_id}")]
    InvalidOption { poll_id: PollId, option_index: usize },
    #[error("{voter} has already voted on poll {poll_id}")]
    AlreadyVoted { poll_id: PollId, voter: AccountId },
    #[error("{0} is not allowed to create polls")]
    Unauthorized(AccountId),
    #[error("only the creator of poll {0} can close it")]
    NotPollCreator(PollId),
    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("stored ledger state is inconsistent: {0}")]
    CorruptState(String),
}

impl LedgerError {
    /// True for errors caused by the caller's input rather than by the ledger's backing store.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, LedgerError::Storage(_) | LedgerError::CorruptState(_))
    }
}
