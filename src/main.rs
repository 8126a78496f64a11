use log::{error, info};
use poll_ledger::config::Config;
use poll_ledger::events;
use poll_ledger::handlers;
use poll_ledger::ledger::Ledger;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let ledger = match Ledger::from_config(&config).await {
        Ok(ledger) => ledger,
        Err(e) => {
            error!("Failed to open ledger: {}", e);
            std::process::exit(1);
        }
    };

    // Log every notification for external observers
    tokio::spawn(events::log_events(ledger.subscribe()));

    info!("Ready, reading commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = handlers::handle_line(&ledger, &line).await;
        if let Err(e) = stdout.write_all(format!("{}\n", response).as_bytes()).await {
            error!("Failed to write response: {}", e);
            break;
        }
        if let Err(e) = stdout.flush().await {
            error!("Failed to flush response: {}", e);
            break;
        }
    }

    info!("Input closed, shutting down");
}
