//! Fan-out of [`WorkflowEvent`]s to progress displays and notifiers.
//!
//! Delivery is best effort: the orchestrator publishes and moves on. A slow
//! subscriber lags (and is told how many events it missed) rather than
//! holding up step execution.

use tokio::sync::broadcast;
use weave_types::event::WorkflowEvent;

/// Shared handle to one broadcast channel. Clones publish into the same
/// channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// `capacity` is the per-subscriber backlog; zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: WorkflowEvent) {
        if let Err(broadcast::error::SendError(unheard)) = self.tx.send(event) {
            tracing::trace!(event = ?unheard, "no event subscribers");
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn started(workflow_id: &str) -> WorkflowEvent {
        WorkflowEvent::WorkflowStarted {
            workflow_id: workflow_id.to_string(),
            execution_id: Uuid::now_v7(),
        }
    }

    fn workflow_of(event: &WorkflowEvent) -> &str {
        match event {
            WorkflowEvent::WorkflowStarted { workflow_id, .. } => workflow_id,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(started("first"));
        bus.publish(started("second"));

        assert_eq!(workflow_of(&rx.recv().await.unwrap()), "first");
        assert_eq!(workflow_of(&rx.recv().await.unwrap()), "second");
    }

    #[test]
    fn every_subscriber_sees_each_event() {
        let bus = EventBus::new(8);
        let mut progress = bus.subscribe();
        let mut notifier = bus.subscribe();

        bus.clone().publish(started("wf"));

        assert!(progress.try_recv().is_ok());
        assert!(notifier.try_recv().is_ok());
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(8);
        bus.publish(started("unheard"));

        let mut rx = bus.subscribe();
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[test]
    fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.publish(started(&format!("wf-{i}")));
        }

        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Lagged(3))));
        assert_eq!(workflow_of(&rx.try_recv().unwrap()), "wf-3");
    }

    #[test]
    fn zero_capacity_is_usable() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(started("wf"));
        assert!(rx.try_recv().is_ok());
        assert!(format!("{bus:?}").contains("subscribers: 1"));
    }
}
