//! Text command grammar for the ledger driver.
//!
//! ```text
//! <account> create <duration> <title> | <description> | <opt1>, <opt2>, ...
//! <account> vote <poll_id> <option_index>
//! <account> close <poll_id>
//! poll <poll_id>
//! results <poll_id>
//! history <account>
//! list
//! ```

use crate::models::{AccountId, NewPoll, PollId};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CREATE_RE: Regex =
        Regex::new(r"^(?P<account>\S+)\s+create\s+(?P<duration>-?\d+)\s+(?P<rest>.+)$").unwrap();
    static ref VOTE_RE: Regex =
        Regex::new(r"^(?P<account>\S+)\s+vote\s+(?P<poll>\d+)\s+(?P<option>\d+)$").unwrap();
    static ref CLOSE_RE: Regex =
        Regex::new(r"^(?P<account>\S+)\s+close\s+(?P<poll>\d+)$").unwrap();
    static ref POLL_RE: Regex = Regex::new(r"^poll\s+(?P<poll>\d+)$").unwrap();
    static ref RESULTS_RE: Regex = Regex::new(r"^results\s+(?P<poll>\d+)$").unwrap();
    static ref HISTORY_RE: Regex = Regex::new(r"^history\s+(?P<account>\S+)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { caller: AccountId, poll: NewPoll },
    Vote { caller: AccountId, poll_id: PollId, option_index: usize },
    Close { caller: AccountId, poll_id: PollId },
    Poll { poll_id: PollId },
    Results { poll_id: PollId },
    History { account: AccountId },
    List,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("create expects `<title> | <description> | <options>`")]
    MalformedCreate,
    #[error("number out of range: {0}")]
    NumberOutOfRange(String),
}

fn number<T: std::str::FromStr>(text: &str) -> Result<T, ParseError> {
    text.parse()
        .map_err(|_| ParseError::NumberOutOfRange(text.to_string()))
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    if line == "list" {
        return Ok(Command::List);
    }

    if let Some(caps) = CREATE_RE.captures(line) {
        let parts: Vec<&str> = caps["rest"].split('|').map(str::trim).collect();
        let &[title, description, options] = parts.as_slice() else {
            return Err(ParseError::MalformedCreate);
        };
        // Comma-separated list of options
        let options = options
            .split(',')
            .map(str::trim)
            .filter(|option| !option.is_empty())
            .map(str::to_string)
            .collect();
        return Ok(Command::Create {
            caller: AccountId::from(&caps["account"]),
            poll: NewPoll::new(title, description, options, number(&caps["duration"])?),
        });
    }

    if let Some(caps) = VOTE_RE.captures(line) {
        return Ok(Command::Vote {
            caller: AccountId::from(&caps["account"]),
            poll_id: number(&caps["poll"])?,
            option_index: number(&caps["option"])?,
        });
    }

    if let Some(caps) = CLOSE_RE.captures(line) {
        return Ok(Command::Close {
            caller: AccountId::from(&caps["account"]),
            poll_id: number(&caps["poll"])?,
        });
    }

    if let Some(caps) = POLL_RE.captures(line) {
        return Ok(Command::Poll {
            poll_id: number(&caps["poll"])?,
        });
    }

    if let Some(caps) = RESULTS_RE.captures(line) {
        return Ok(Command::Results {
            poll_id: number(&caps["poll"])?,
        });
    }

    if let Some(caps) = HISTORY_RE.captures(line) {
        return Ok(Command::History {
            account: AccountId::from(&caps["account"]),
        });
    }

    Err(ParseError::Unknown(line.to_string()))
}
