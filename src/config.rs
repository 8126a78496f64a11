use crate::models::AccountId;
use std::collections::HashSet;
use std::env;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Who may create polls. Voting is never restricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CreatePolicy {
    #[default]
    Open,
    Restricted(HashSet<AccountId>),
}

impl CreatePolicy {
    pub fn allows(&self, account: &AccountId) -> bool {
        match self {
            CreatePolicy::Open => true,
            CreatePolicy::Restricted(admins) => admins.contains(account),
        }
    }

    /// Parses a comma-separated admin list; an empty list means creation is open.
    pub fn from_admin_list(list: &str) -> Self {
        let admins: HashSet<AccountId> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(AccountId::from)
            .collect();

        if admins.is_empty() {
            CreatePolicy::Open
        } else {
            CreatePolicy::Restricted(admins)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// When unset the ledger keeps its state in memory only.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub create_policy: CreatePolicy,
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            create_policy: CreatePolicy::Open,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => parse_positive("DATABASE_MAX_CONNECTIONS", value)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let event_capacity = match lookup("EVENT_CHANNEL_CAPACITY") {
            Some(value) => parse_positive("EVENT_CHANNEL_CAPACITY", value)?,
            None => DEFAULT_EVENT_CAPACITY,
        };

        let create_policy = lookup("POLL_ADMINS")
            .map(|list| CreatePolicy::from_admin_list(&list))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            max_connections,
            create_policy,
            event_capacity,
        })
    }
}

fn parse_positive<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}
