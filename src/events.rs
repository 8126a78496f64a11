use crate::models::{AccountId, PollId};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    PollCreated {
        poll_id: PollId,
        title: String,
        duration: i64,
    },
    Voted {
        poll_id: PollId,
        voter: AccountId,
        option_index: usize,
    },
    PollClosed {
        poll_id: PollId,
    },
}

/// Fire-and-forget fan-out of ledger notifications.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        // Config rejects zero; tokio panics on it.
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: LedgerEvent) {
        match &event {
            LedgerEvent::PollCreated {
                poll_id,
                title,
                duration,
            } => debug!("PollCreated({}, {:?}, {})", poll_id, title, duration),
            LedgerEvent::Voted {
                poll_id,
                voter,
                option_index,
            } => debug!("Voted({}, {}, {})", poll_id, voter, option_index),
            LedgerEvent::PollClosed { poll_id } => debug!("PollClosed({})", poll_id),
        }
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Logs every event as JSON until the bus is dropped. A receiver that falls behind
/// skips what it missed and keeps going. Returns how many events were logged.
pub async fn log_events(mut events: broadcast::Receiver<LedgerEvent>) -> usize {
    let mut logged = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                match serde_json::to_string(&event) {
                    Ok(json) => info!(target: "poll_ledger::events", "{}", json),
                    Err(e) => error!("Failed to encode event: {}", e),
                }
                logged += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event logger skipped {} event(s)", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    logged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(LedgerEvent::PollCreated {
            poll_id: 0,
            title: "Poll".to_string(),
            duration: 10,
        });
        bus.emit(LedgerEvent::PollClosed { poll_id: 0 });

        assert!(matches!(
            rx.recv().await.unwrap(),
            LedgerEvent::PollCreated { poll_id: 0, .. }
        ));
        assert_eq!(rx.recv().await.unwrap(), LedgerEvent::PollClosed { poll_id: 0 });
    }

    #[test]
    fn emit_without_subscribers_does_not_fail() {
        let bus = EventBus::default();
        bus.emit(LedgerEvent::PollClosed { poll_id: 3 });
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(LedgerEvent::Voted {
            poll_id: 1,
            voter: AccountId::from("alice"),
            option_index: 0,
        })
        .unwrap();
        assert_eq!(json["event"], "voted");
        assert_eq!(json["voter"], "alice");
    }

    #[tokio::test]
    async fn configured_capacity_is_not_raised() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        for poll_id in 0..6 {
            bus.emit(LedgerEvent::PollClosed { poll_id });
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(rx.recv().await.unwrap(), LedgerEvent::PollClosed { poll_id: 2 });
    }

    #[tokio::test]
    async fn logger_keeps_running_after_lagging() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        for poll_id in 0..40 {
            bus.emit(LedgerEvent::PollClosed { poll_id });
        }
        drop(bus);

        // The 24 oldest events were overwritten; the newest 16 are still logged.
        assert_eq!(log_events(rx).await, 16);
    }

    #[tokio::test]
    async fn logger_stops_when_bus_is_dropped() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        let logger = tokio::spawn(log_events(rx));

        bus.emit(LedgerEvent::PollClosed { poll_id: 0 });
        drop(bus);

        assert_eq!(logger.await.unwrap(), 1);
    }
}
