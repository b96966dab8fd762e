//! A simple, in-process message bus.
//!
//! All domain events flow through a single unbounded queue drained by one
//! consumer task. Handlers registered for an [`EventKind`] are awaited
//! sequentially in registration order, so handlers never race with each
//! other on shared state and every message published by a handler before it
//! returns is processed strictly before anything published after it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};

/// An async handler for bus events.
///
/// A single component may register the same handler object for several
/// kinds and dispatch internally on the variant.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one event. Errors are logged by the bus and do not stop
    /// the consumer loop.
    async fn handle(&self, event: Event) -> anyhow::Result<()>;

    /// Handler name used in dispatch logs.
    fn name(&self) -> &'static str {
        "handler"
    }
}

/// Single-consumer FIFO dispatch of typed messages to registered handlers.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    tx: mpsc::UnboundedSender<Event>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            subscribers: RwLock::new(HashMap::new()),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Registers a handler for a specific event kind.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        info!(kind = ?kind, handler = handler.name(), "Handler subscribed to bus");
        self.subscribers.write().entry(kind).or_default().push(handler);
    }

    /// Unsubscribes all handlers from the bus.
    pub fn unsubscribe_all(&self) {
        self.subscribers.write().clear();
        info!("All message handlers unsubscribed from the bus");
    }

    /// Enqueues a message to be processed by the consumer loop.
    pub fn publish(&self, event: Event) {
        if self.tx.send(event).is_err() {
            warn!("Event bus queue is closed; dropping event");
        }
    }

    /// The main event-processing loop.
    ///
    /// Runs until cancelled by the orchestrator. Calling `run` twice is a
    /// no-op for the second caller.
    pub async fn run(&self) {
        let Some(mut rx) = self.rx.lock().take() else {
            warn!("Event bus consumer already running");
            return;
        };
        info!("Message bus started");

        while let Some(event) = rx.recv().await {
            let kind = event.kind();
            let handlers: Vec<Arc<dyn EventHandler>> = self
                .subscribers
                .read()
                .get(&kind)
                .map(|hs| hs.to_vec())
                .unwrap_or_default();

            if handlers.is_empty() {
                debug!(kind = ?kind, "No handlers registered for event");
                continue;
            }

            for handler in handlers {
                if let Err(e) = handler.handle(event.clone()).await {
                    error!(
                        kind = ?kind,
                        handler = handler.name(),
                        error = %e,
                        "Handler failed while processing event"
                    );
                }
            }
        }
        info!("Message bus stopped");
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BookUpdate;
    use crate::types::Platform;
    use anyhow::anyhow;
    use std::time::Duration;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: Event) -> anyhow::Result<()> {
            self.log
                .lock()
                .push(format!("{}:{:?}", self.label, event.kind()));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _event: Event) -> anyhow::Result<()> {
            Err(anyhow!("boom"))
        }
    }

    fn book_updated(market_id: &str) -> Event {
        Event::BookUpdated(BookUpdate {
            market_id: market_id.to_string(),
            platform: Platform::Kalshi,
        })
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_fifo_dispatch_in_registration_order() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(
            EventKind::BookUpdated,
            Arc::new(Recorder {
                label: "first",
                log: Arc::clone(&log),
            }),
        );
        bus.subscribe(
            EventKind::BookUpdated,
            Arc::new(Recorder {
                label: "second",
                log: Arc::clone(&log),
            }),
        );

        bus.publish(book_updated("M1"));
        bus.publish(book_updated("M2"));

        let bus_clone = Arc::clone(&bus);
        tokio::spawn(async move { bus_clone.run().await });

        let log_clone = Arc::clone(&log);
        wait_for(move || log_clone.lock().len() == 4).await;

        let entries = log.lock().clone();
        assert_eq!(
            entries,
            vec![
                "first:BookUpdated",
                "second:BookUpdated",
                "first:BookUpdated",
                "second:BookUpdated",
            ]
        );
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_loop() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(EventKind::BookUpdated, Arc::new(Failing));
        bus.subscribe(
            EventKind::BookUpdated,
            Arc::new(Recorder {
                label: "after",
                log: Arc::clone(&log),
            }),
        );

        bus.publish(book_updated("M1"));
        bus.publish(book_updated("M1"));

        let bus_clone = Arc::clone(&bus);
        tokio::spawn(async move { bus_clone.run().await });

        let log_clone = Arc::clone(&log);
        wait_for(move || log_clone.lock().len() == 2).await;
    }

    #[tokio::test]
    async fn test_unsubscribe_all_clears_registry() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            EventKind::BookUpdated,
            Arc::new(Recorder {
                label: "r",
                log: Arc::clone(&log),
            }),
        );
        bus.unsubscribe_all();
        assert!(bus.subscribers.read().is_empty());
    }

    #[tokio::test]
    async fn test_events_without_subscribers_are_dropped() {
        let bus = Arc::new(EventBus::new());
        bus.publish(Event::TradeAttemptCompleted);
        bus.publish(book_updated("M1"));

        let bus_clone = Arc::clone(&bus);
        let task = tokio::spawn(async move { bus_clone.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        task.abort();
    }
}
