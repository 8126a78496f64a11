use crate::error::{LedgerError, LedgerResult};
use crate::models::{AccountId, Poll, PollId, VoteRecord};
use async_trait::async_trait;
use chrono::DateTime;
use log::{info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;

/// Everything needed to rebuild a `PollRegistry`.
#[derive(Debug, Default)]
pub struct StoredLedger {
    /// Ordered by poll id.
    pub polls: Vec<Poll>,
    /// Ordered by the time they were cast.
    pub votes: Vec<VoteRecord>,
}

/// Durable backing for the ledger. Polls are append-only and votes are unique per
/// `(voter, poll_id)`; the next poll id is implied by the number of stored polls.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load(&self) -> LedgerResult<StoredLedger>;
    async fn insert_poll(&self, poll: &Poll) -> LedgerResult<()>;
    async fn insert_vote(&self, vote: &VoteRecord) -> LedgerResult<()>;
    async fn close_poll(&self, poll_id: PollId) -> LedgerResult<()>;
}

/// Store for ledgers that live only as long as the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStore;

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load(&self) -> LedgerResult<StoredLedger> {
        Ok(StoredLedger::default())
    }

    async fn insert_poll(&self, _poll: &Poll) -> LedgerResult<()> {
        Ok(())
    }

    async fn insert_vote(&self, _vote: &VoteRecord) -> LedgerResult<()> {
        Ok(())
    }

    async fn close_poll(&self, _poll_id: PollId) -> LedgerResult<()> {
        Ok(())
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

/// Every connection to an in-memory sqlite URL opens its own private database.
fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn effective_max_connections(database_url: &str, requested: u32) -> u32 {
    if is_in_memory(database_url) { 1 } else { requested }
}

impl SqliteStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> LedgerResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool_size = effective_max_connections(database_url, max_connections);
        if pool_size != max_connections {
            warn!(
                "In-memory database {} limited to a single connection (requested {})",
                database_url, max_connections
            );
        }

        let mut pool_options = SqlitePoolOptions::new().max_connections(pool_size);
        if is_in_memory(database_url) {
            // The database disappears with its last connection.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        Self::init_schema(&pool).await?;
        info!("Connected to ledger database {}", database_url);

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id INTEGER PRIMARY KEY,
                creator TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                duration INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                ends_at TEXT,
                is_closed BOOLEAN NOT NULL DEFAULT FALSE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_options (
                poll_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                text TEXT NOT NULL,
                PRIMARY KEY (poll_id, position),
                FOREIGN KEY (poll_id) REFERENCES polls(id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                voter TEXT NOT NULL,
                poll_id INTEGER NOT NULL,
                option_index INTEGER NOT NULL,
                cast_at INTEGER NOT NULL,
                UNIQUE (voter, poll_id),
                FOREIGN KEY (poll_id) REFERENCES polls(id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn load_options(&self) -> Result<HashMap<i64, Vec<String>>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT poll_id, text
            FROM poll_options
            ORDER BY poll_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut options: HashMap<i64, Vec<String>> = HashMap::new();
        for row in rows {
            options
                .entry(row.try_get("poll_id")?)
                .or_default()
                .push(row.try_get("text")?);
        }
        Ok(options)
    }
}

fn to_db_id(poll_id: PollId) -> LedgerResult<i64> {
    i64::try_from(poll_id)
        .map_err(|_| LedgerError::CorruptState(format!("poll id {} out of range", poll_id)))
}

fn from_db_id(id: i64) -> LedgerResult<PollId> {
    PollId::try_from(id).map_err(|_| LedgerError::CorruptState(format!("negative poll id {}", id)))
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn load(&self) -> LedgerResult<StoredLedger> {
        let mut options = self.load_options().await?;

        let poll_rows = sqlx::query(
            r#"
            SELECT id, creator, title, description, duration, created_at, end_time, is_closed
            FROM polls
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut polls = Vec::with_capacity(poll_rows.len());
        for row in poll_rows {
            let id: i64 = row.try_get("id")?;
            let poll_options = options.remove(&id).unwrap_or_default();
            polls.push(Poll {
                id: from_db_id(id)?,
                creator: AccountId::new(row.try_get::<String, _>("creator")?),
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                vote_counts: vec![0; poll_options.len()],
                options: poll_options,
                duration: row.try_get("duration")?,
                created_at: row.try_get("created_at")?,
                end_time: row.try_get("end_time")?,
                is_closed: row.try_get("is_closed")?,
            });
        }

        let vote_rows = sqlx::query(
            r#"
            SELECT voter, poll_id, option_index, cast_at
            FROM votes
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut votes = Vec::with_capacity(vote_rows.len());
        for row in vote_rows {
            let option_index: i64 = row.try_get("option_index")?;
            votes.push(VoteRecord {
                voter: AccountId::new(row.try_get::<String, _>("voter")?),
                poll_id: from_db_id(row.try_get("poll_id")?)?,
                option_index: usize::try_from(option_index).map_err(|_| {
                    LedgerError::CorruptState(format!("negative option index {}", option_index))
                })?,
                cast_at: row.try_get("cast_at")?,
            });
        }

        info!("Loaded {} poll(s) and {} vote(s)", polls.len(), votes.len());
        Ok(StoredLedger { polls, votes })
    }

    async fn insert_poll(&self, poll: &Poll) -> LedgerResult<()> {
        let poll_id = to_db_id(poll.id)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO polls (id, creator, title, description, duration, created_at, end_time, ends_at, is_closed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(poll_id)
        .bind(poll.creator.as_str())
        .bind(&poll.title)
        .bind(&poll.description)
        .bind(poll.duration)
        .bind(poll.created_at)
        .bind(poll.end_time)
        .bind(DateTime::from_timestamp(poll.end_time, 0).map(|dt| dt.to_rfc3339()))
        .bind(poll.is_closed)
        .execute(&mut *tx)
        .await?;

        for (i, text) in poll.options.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO poll_options (poll_id, position, text)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(poll_id)
            .bind(i as i64)
            .bind(text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_vote(&self, vote: &VoteRecord) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO votes (voter, poll_id, option_index, cast_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(vote.voter.as_str())
        .bind(to_db_id(vote.poll_id)?)
        .bind(vote.option_index as i64)
        .bind(vote.cast_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn close_poll(&self, poll_id: PollId) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE polls
            SET is_closed = TRUE
            WHERE id = ?
            "#,
        )
        .bind(to_db_id(poll_id)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PollRegistry;

    async fn test_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    fn sample_poll(id: PollId, options: &[&str]) -> Poll {
        Poll::new(
            id,
            AccountId::from("admin"),
            format!("Poll {}", id),
            "Description".to_string(),
            options.iter().map(|o| o.to_string()).collect(),
            3600,
            1_003_600,
            1_000_000,
        )
    }

    fn vote(voter: &str, poll_id: PollId, option_index: usize) -> VoteRecord {
        VoteRecord {
            voter: AccountId::from(voter),
            poll_id,
            option_index,
            cast_at: 1_000_010,
        }
    }

    #[tokio::test]
    async fn test_empty_database_loads_nothing() {
        let store = test_store().await;
        let stored = store.load().await.unwrap();
        assert!(stored.polls.is_empty());
        assert!(stored.votes.is_empty());
    }

    #[tokio::test]
    async fn test_poll_round_trips_with_option_order() {
        let store = test_store().await;
        store
            .insert_poll(&sample_poll(0, &["Zeta", "Alpha", "Mu"]))
            .await
            .unwrap();

        let stored = store.load().await.unwrap();
        assert_eq!(stored.polls.len(), 1);
        let poll = &stored.polls[0];
        assert_eq!(poll.options, vec!["Zeta", "Alpha", "Mu"]);
        assert_eq!(poll.vote_counts, vec![0, 0, 0]);
        assert_eq!(poll.end_time, 1_003_600);
        assert_eq!(poll.creator.as_str(), "admin");
        assert!(!poll.is_closed);
    }

    #[tokio::test]
    async fn test_votes_load_in_cast_order() {
        let store = test_store().await;
        store.insert_poll(&sample_poll(0, &["A", "B"])).await.unwrap();
        store.insert_poll(&sample_poll(1, &["C", "D"])).await.unwrap();
        store.insert_vote(&vote("alice", 1, 0)).await.unwrap();
        store.insert_vote(&vote("alice", 0, 1)).await.unwrap();
        store.insert_vote(&vote("bob", 1, 1)).await.unwrap();

        let stored = store.load().await.unwrap();
        let order: Vec<(String, PollId)> = stored
            .votes
            .iter()
            .map(|v| (v.voter.to_string(), v.poll_id))
            .collect();
        assert_eq!(
            order,
            vec![
                ("alice".to_string(), 1),
                ("alice".to_string(), 0),
                ("bob".to_string(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_vote_is_rejected_by_schema() {
        let store = test_store().await;
        store.insert_poll(&sample_poll(0, &["A", "B"])).await.unwrap();
        store.insert_vote(&vote("alice", 0, 0)).await.unwrap();
        let err = store.insert_vote(&vote("alice", 0, 1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(store.load().await.unwrap().votes.len(), 1);
    }

    #[tokio::test]
    async fn test_vote_for_missing_poll_is_rejected_by_schema() {
        let store = test_store().await;
        assert!(store.insert_vote(&vote("alice", 4, 0)).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_poll_id_is_rejected() {
        let store = test_store().await;
        store.insert_poll(&sample_poll(0, &["A", "B"])).await.unwrap();
        assert!(store.insert_poll(&sample_poll(0, &["A", "B"])).await.is_err());
        assert_eq!(store.load().await.unwrap().polls.len(), 1);
    }

    #[tokio::test]
    async fn test_close_poll_persists_flag() {
        let store = test_store().await;
        store.insert_poll(&sample_poll(0, &["A", "B"])).await.unwrap();
        store.close_poll(0).await.unwrap();
        assert!(store.load().await.unwrap().polls[0].is_closed);
    }

    #[tokio::test]
    async fn test_loaded_state_restores_registry() {
        let store = test_store().await;
        store.insert_poll(&sample_poll(0, &["A", "B"])).await.unwrap();
        store.insert_vote(&vote("alice", 0, 1)).await.unwrap();
        store.insert_vote(&vote("bob", 0, 1)).await.unwrap();

        let stored = store.load().await.unwrap();
        let registry = PollRegistry::restore(stored.polls, stored.votes).unwrap();
        assert_eq!(registry.poll_count(), 1);
        assert_eq!(
            registry.get_poll(0, 1_000_020).unwrap().vote_counts,
            vec![0, 2]
        );
    }

    #[test]
    fn test_in_memory_urls_use_a_single_connection() {
        assert_eq!(effective_max_connections("sqlite::memory:", 5), 1);
        assert_eq!(effective_max_connections("sqlite://ledger.db?mode=memory", 5), 1);
        assert_eq!(effective_max_connections("sqlite://ledger.db", 5), 5);
    }

    #[tokio::test]
    async fn test_in_memory_pool_shares_one_database() {
        let store = SqliteStore::connect("sqlite::memory:", 5).await.unwrap();
        for id in 0..4 {
            store.insert_poll(&sample_poll(id, &["A", "B"])).await.unwrap();
        }
        store.insert_vote(&vote("alice", 3, 1)).await.unwrap();

        let stored = store.load().await.unwrap();
        assert_eq!(stored.polls.len(), 4);
        assert_eq!(stored.votes.len(), 1);
    }
}
