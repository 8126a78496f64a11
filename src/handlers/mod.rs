use crate::commands::{Command, ParseError, parse_command};
use crate::error::LedgerError;
use crate::ledger::Ledger;
use log::{error, info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("failed to render response: {0}")]
    Render(#[from] serde_json::Error),
}

// Execute one parsed command and render its response
pub async fn handle_command(ledger: &Ledger, command: Command) -> Result<String, HandlerError> {
    let response = match command {
        Command::Create { caller, poll } => {
            let poll_id = ledger.create_poll(&caller, poll).await?;
            format!("created poll {}", poll_id)
        }
        Command::Vote {
            caller,
            poll_id,
            option_index,
        } => {
            ledger.vote(&caller, poll_id, option_index).await?;
            format!("{} voted for option {} on poll {}", caller, option_index, poll_id)
        }
        Command::Close { caller, poll_id } => {
            ledger.close_poll(&caller, poll_id).await?;
            format!("closed poll {}", poll_id)
        }
        Command::Poll { poll_id } => serde_json::to_string(&ledger.get_poll(poll_id).await?)?,
        Command::Results { poll_id } => ledger.results(poll_id).await?.summary,
        Command::History { account } => {
            serde_json::to_string(&ledger.get_user_voting_history(&account).await)?
        }
        Command::List => {
            let polls = ledger.list_polls().await;
            if polls.is_empty() {
                "no polls".to_string()
            } else {
                polls
                    .iter()
                    .map(|poll| {
                        let status = if poll.is_closed { "closed" } else { "open" };
                        format!("{}: {} [{}] {:?}", poll.id, poll.title, status, poll.vote_counts)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    };
    Ok(response)
}

// Parse and execute a single input line; errors are rendered, never propagated
pub async fn handle_line(ledger: &Ledger, line: &str) -> String {
    let result = match parse_command(line) {
        Ok(command) => {
            info!("Received command: {:?}", command);
            handle_command(ledger, command).await
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(response) => response,
        Err(HandlerError::Ledger(e)) if !e.is_rejection() => {
            error!("Ledger failure while handling {:?}: {}", line, e);
            format!("error: {}", e)
        }
        Err(e) => {
            warn!("Rejected {:?}: {}", line, e);
            format!("error: {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn ledger() -> Ledger {
        Ledger::in_memory(Arc::new(ManualClock::new(1_000)))
    }

    #[tokio::test]
    async fn create_vote_and_query() {
        let ledger = ledger();
        assert_eq!(
            handle_line(&ledger, "admin create 3600 Lunch | Where to eat | Pizza, Sushi").await,
            "created poll 0"
        );
        assert_eq!(
            handle_line(&ledger, "addr1 vote 0 1").await,
            "addr1 voted for option 1 on poll 0"
        );

        let poll: serde_json::Value =
            serde_json::from_str(&handle_line(&ledger, "poll 0").await).unwrap();
        assert_eq!(poll["title"], "Lunch");
        assert_eq!(poll["vote_counts"], serde_json::json!([0, 1]));
        assert_eq!(poll["is_closed"], false);

        let history: serde_json::Value =
            serde_json::from_str(&handle_line(&ledger, "history addr1").await).unwrap();
        assert_eq!(history["poll_ids"], serde_json::json!([0]));
        assert_eq!(history["options"], serde_json::json!(["Sushi"]));

        assert!(handle_line(&ledger, "results 0").await.contains("**Sushi**: 1 votes"));
        assert_eq!(handle_line(&ledger, "list").await, "0: Lunch [open] [0, 1]");
    }

    #[tokio::test]
    async fn errors_are_rendered() {
        let ledger = ledger();
        assert_eq!(handle_line(&ledger, "list").await, "no polls");
        assert_eq!(
            handle_line(&ledger, "admin create 60 T | D | Only").await,
            "error: a poll needs at least two options"
        );
        assert_eq!(
            handle_line(&ledger, "addr1 vote 0 0").await,
            "error: poll 0 not found"
        );
        assert!(handle_line(&ledger, "dance").await.starts_with("error: unknown command"));

        handle_line(&ledger, "admin create 60 T | D | A, B").await;
        handle_line(&ledger, "addr1 vote 0 0").await;
        assert_eq!(
            handle_line(&ledger, "addr1 vote 0 1").await,
            "error: addr1 has already voted on poll 0"
        );
        assert_eq!(
            handle_line(&ledger, "addr1 close 0").await,
            "error: only the creator of poll 0 can close it"
        );
        assert_eq!(handle_line(&ledger, "admin close 0").await, "closed poll 0");
    }
}
