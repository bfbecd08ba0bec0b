//! Concurrent, fire-and-forget event delivery.
//!
//! Each dispatched event gets its own task running
//! [`DeliveryClient::deliver`]. Tasks are independent: one event's retries
//! never delay another's, and no ordering is kept between events. On
//! shutdown the remaining tasks are aborted rather than drained.

use std::sync::Arc;

use cardgate_core::ScanEvent;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};

use crate::client::{DeliveryClient, DeliveryOutcome};

/// Owns the in-flight delivery tasks.
#[derive(Debug)]
pub struct DeliveryPipeline {
    client: Arc<DeliveryClient>,
    tasks: JoinSet<DeliveryOutcome>,
}

impl DeliveryPipeline {
    pub fn new(client: DeliveryClient) -> Self {
        Self {
            client: Arc::new(client),
            tasks: JoinSet::new(),
        }
    }

    /// Start delivering `event` in the background.
    pub fn dispatch(&mut self, event: ScanEvent) {
        let client = Arc::clone(&self.client);
        debug!(event_id = %event.id(), in_flight = self.tasks.len() + 1, "Dispatching scan");
        self.tasks.spawn(async move { client.deliver(event).await });
    }

    /// Number of deliveries not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the next delivery to finish.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_finished(&mut self) -> Option<DeliveryOutcome> {
        while let Some(joined) = self.tasks.join_next().await {
            match classify(joined) {
                TaskTermination::Finished(outcome) => return Some(outcome),
                TaskTermination::Cancelled => {}
                TaskTermination::Panic => error!("Delivery task panicked"),
            }
        }
        None
    }

    /// Abort every in-flight delivery and wait for the tasks to unwind.
    ///
    /// Returns how many deliveries were cut short.
    pub async fn abandon(&mut self) -> usize {
        self.tasks.abort_all();

        let mut abandoned = 0;
        while let Some(joined) = self.tasks.join_next().await {
            match classify(joined) {
                // Finished before the abort landed.
                TaskTermination::Finished(_) => {}
                TaskTermination::Cancelled => abandoned += 1,
                TaskTermination::Panic => error!("Delivery task panicked"),
            }
        }

        if abandoned > 0 {
            warn!(abandoned, "Shutdown abandoned in-flight deliveries");
        }
        abandoned
    }
}

/// How a delivery task ended.
enum TaskTermination {
    Finished(DeliveryOutcome),
    Cancelled,
    Panic,
}

fn classify(joined: Result<DeliveryOutcome, JoinError>) -> TaskTermination {
    match joined {
        Ok(outcome) => TaskTermination::Finished(outcome),
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}
