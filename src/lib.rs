//! A small poll ledger: sequentially numbered polls with fixed options and a voting window,
//! one vote per account per poll, public tallies and per-account voting history.

pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod registry;
pub mod voting;

pub use error::{LedgerError, LedgerResult};
pub use ledger::Ledger;
pub use models::{AccountId, NewPoll, PollId, PollSnapshot, VotingHistory};
pub use registry::PollRegistry;
